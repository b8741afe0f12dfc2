//! Checkpoint persistence for model weights.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{BinFileRecorder, FullPrecisionSettings, PrettyJsonFileRecorder, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ModelError, Result};

/// Supported checkpoint file formats.
///
/// # Example
///
/// ```
/// use retina_models::CheckpointFormat;
///
/// assert_eq!(CheckpointFormat::from_extension("pth"), Some(CheckpointFormat::PyTorch));
/// assert_eq!(CheckpointFormat::from_extension("bin"), Some(CheckpointFormat::Binary));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckpointFormat {
    /// `PyTorch` state dict (`.pth` / `.pt`), as written by `torch.save`.
    ///
    /// Load-only. Keys are remapped onto the burn module tree and linear
    /// weights are transposed by the importer.
    #[default]
    PyTorch,

    /// Burn binary record with full precision.
    Binary,

    /// Burn pretty-printed JSON record, for inspection.
    Json,
}

impl CheckpointFormat {
    /// Determines format from file extension.
    ///
    /// - `.pth`, `.pt` -> `PyTorch`
    /// - `.bin` -> Binary
    /// - `.json` -> Json
    /// - Other -> None
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pth" | "pt" => Some(Self::PyTorch),
            "bin" => Some(Self::Binary),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Determines format from file path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Returns the default file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::PyTorch => "pth",
            Self::Binary => "bin",
            Self::Json => "json",
        }
    }

    /// Returns the format name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PyTorch => "pytorch",
            Self::Binary => "binary",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Saves a model checkpoint in a burn-native format.
///
/// The format extension replaces any extension on `path`.
///
/// # Returns
///
/// The path that was written.
///
/// # Errors
///
/// - `ModelError::UnsupportedFormat` for [`CheckpointFormat::PyTorch`]
/// - `ModelError::SaveCheckpoint` if the recorder fails
pub fn save_checkpoint<B, M>(
    model: &M,
    path: impl AsRef<Path>,
    format: CheckpointFormat,
) -> Result<PathBuf>
where
    B: Backend,
    M: Module<B>,
{
    let full_path = path.as_ref().with_extension(format.extension());
    let shown = full_path.display().to_string();
    let record = model.clone().into_record();

    match format {
        CheckpointFormat::PyTorch => {
            return Err(ModelError::unsupported_format(format!(
                "{shown} (pytorch checkpoints are load-only)"
            )));
        }
        CheckpointFormat::Binary => BinFileRecorder::<FullPrecisionSettings>::new()
            .record(record, full_path.clone())
            .map_err(|e| ModelError::save_checkpoint(&shown, e.to_string()))?,
        CheckpointFormat::Json => PrettyJsonFileRecorder::<FullPrecisionSettings>::new()
            .record(record, full_path.clone())
            .map_err(|e| ModelError::save_checkpoint(&shown, e.to_string()))?,
    }

    Ok(full_path)
}

/// Loads weights from `path` into `model`.
///
/// The format is chosen from the extension. `remaps` are `(regex, replacement)`
/// pairs applied in order to `PyTorch` state-dict keys and ignored for
/// burn-native formats.
///
/// # Errors
///
/// - `ModelError::CheckpointNotFound` if the file doesn't exist
/// - `ModelError::UnsupportedFormat` if the format can't be determined
/// - `ModelError::LoadCheckpoint` if the file doesn't match the model
pub fn load_checkpoint<B, M>(
    model: M,
    path: impl AsRef<Path>,
    remaps: &[(String, String)],
    device: &B::Device,
) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let shown = path.display().to_string();

    if !path.exists() {
        return Err(ModelError::checkpoint_not_found(shown));
    }

    let format =
        CheckpointFormat::from_path(path).ok_or_else(|| ModelError::unsupported_format(&shown))?;

    let loaded = match format {
        CheckpointFormat::PyTorch => {
            let args = remaps
                .iter()
                .fold(LoadArgs::new(path.to_path_buf()), |args, (from, to)| {
                    args.with_key_remap(from, to)
                });
            let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
            let record: M::Record = Recorder::<B>::load(&recorder, args, device)
                .map_err(|e| ModelError::load_checkpoint(&shown, e.to_string()))?;
            model.load_record(record)
        }
        CheckpointFormat::Binary => {
            let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
            model
                .load_file(path, &recorder, device)
                .map_err(|e| ModelError::load_checkpoint(&shown, e.to_string()))?
        }
        CheckpointFormat::Json => {
            let recorder = PrettyJsonFileRecorder::<FullPrecisionSettings>::new();
            model
                .load_file(path, &recorder, device)
                .map_err(|e| ModelError::load_checkpoint(&shown, e.to_string()))?
        }
    };

    info!(path = %shown, %format, "loaded checkpoint");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            CheckpointFormat::from_extension("pth"),
            Some(CheckpointFormat::PyTorch)
        );
        assert_eq!(
            CheckpointFormat::from_extension("PT"),
            Some(CheckpointFormat::PyTorch)
        );
        assert_eq!(
            CheckpointFormat::from_extension("bin"),
            Some(CheckpointFormat::Binary)
        );
        assert_eq!(
            CheckpointFormat::from_extension("json"),
            Some(CheckpointFormat::Json)
        );
        assert_eq!(CheckpointFormat::from_extension("onnx"), None);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("best_model.pth")),
            Some(CheckpointFormat::PyTorch)
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("/weights/model.bin")),
            Some(CheckpointFormat::Binary)
        );
        assert_eq!(CheckpointFormat::from_path(Path::new("model")), None);
    }

    #[test]
    fn format_extension_and_name() {
        assert_eq!(CheckpointFormat::PyTorch.extension(), "pth");
        assert_eq!(CheckpointFormat::Binary.extension(), "bin");
        assert_eq!(CheckpointFormat::Json.name(), "json");
        assert_eq!(format!("{}", CheckpointFormat::PyTorch), "pytorch");
    }

    #[test]
    fn format_default_is_pytorch() {
        assert_eq!(CheckpointFormat::default(), CheckpointFormat::PyTorch);
    }
}
