//! Backend selection.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// CPU backend used for serving and tests.
pub type CpuBackend = burn_ndarray::NdArray<f32>;

/// GPU backend, available with the `wgpu` feature.
#[cfg(feature = "wgpu")]
pub type GpuBackend = burn_wgpu::Wgpu;

/// Supported burn backends for inference.
///
/// # Example
///
/// ```
/// use retina_models::BackendType;
///
/// let backend: BackendType = "ndarray".parse()?;
/// assert!(backend.is_cpu());
/// assert!(backend.is_available());
/// # Ok::<(), retina_models::ModelError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// CPU backend using ndarray. Always compiled in.
    #[default]
    NdArray,

    /// GPU backend using WGPU.
    ///
    /// Requires the `wgpu` feature and compatible GPU hardware.
    Wgpu,
}

impl BackendType {
    /// Returns `true` if this is a CPU backend.
    #[must_use]
    pub const fn is_cpu(&self) -> bool {
        matches!(self, Self::NdArray)
    }

    /// Returns the backend name as a string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NdArray => "ndarray",
            Self::Wgpu => "wgpu",
        }
    }

    /// Returns `true` if this backend was compiled into the binary.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        match self {
            Self::NdArray => true,
            Self::Wgpu => cfg!(feature = "wgpu"),
        }
    }

    /// Fails unless this backend was compiled in.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::BackendUnavailable` naming the missing feature.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(ModelError::backend_unavailable(format!(
                "{} (rebuild with `--features {}`)",
                self.name(),
                self.name()
            )))
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for BackendType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ndarray" | "cpu" => Ok(Self::NdArray),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            other => Err(ModelError::backend_unavailable(other)),
        }
    }
}
