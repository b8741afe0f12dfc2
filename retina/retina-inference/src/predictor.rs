//! Grade prediction from encoded images.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::softmax;
use retina_models::{
    BackendType, CpuBackend, EfficientNetGat, EfficientNetGatConfig, ModelError, load_checkpoint,
};
use retina_types::Prediction;
use tracing::{debug, info};

use crate::error::{InferenceError, Result};
use crate::preprocess::FundusPreprocessor;

/// Anything that can grade an encoded fundus image.
///
/// Object safe, so servers can hold an `Arc<dyn Classify>` without
/// knowing which backend runs the model.
pub trait Classify: Send + Sync {
    /// Grades one encoded image.
    ///
    /// # Errors
    ///
    /// Returns an [`InferenceError`] if the bytes are not a decodable image
    /// or the model output is unusable.
    fn classify(&self, image: &[u8]) -> Result<Prediction>;
}

/// Runs an [`EfficientNetGat`] on one backend.
///
/// The model is built on a non-autodiff backend, so batch norm uses its
/// running statistics and dropout is the identity.
#[derive(Debug)]
pub struct Predictor<B: Backend> {
    // Param is Send but not Sync; requests clone the module under the lock
    // and run the forward pass unlocked.
    model: Mutex<EfficientNetGat<B>>,
    device: B::Device,
    preprocessor: FundusPreprocessor,
}

impl<B: Backend> Predictor<B> {
    /// Wraps an already built model.
    pub fn new(model: EfficientNetGat<B>, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            device,
            preprocessor: FundusPreprocessor::new(),
        }
    }

    /// Builds the model from `config` and loads weights from `weights`.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError::Model` if the config is invalid or the
    /// weights are missing, in an unknown format, or don't fit the model.
    pub fn load(
        config: &EfficientNetGatConfig,
        weights: impl AsRef<Path>,
        device: B::Device,
    ) -> Result<Self> {
        let model = EfficientNetGat::new(config, &device)?;
        let model = load_checkpoint(model, weights, &config.pytorch_key_remaps(), &device)?;
        Ok(Self::new(model, device))
    }

    /// Replaces the preprocessor.
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: FundusPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// The preprocessor used by [`Predictor::predict`].
    pub const fn preprocessor(&self) -> &FundusPreprocessor {
        &self.preprocessor
    }

    /// Device the model lives on.
    pub const fn device(&self) -> &B::Device {
        &self.device
    }

    /// Raw logits `[batch, num_classes]` for preprocessed images.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError::Unavailable` if a previous request panicked
    /// while holding the model.
    pub fn logits(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let model = self
            .model
            .lock()
            .map_err(|e| InferenceError::unavailable(e.to_string()))?
            .clone();
        Ok(model.forward(images))
    }

    /// Class probabilities `[batch, num_classes]` for preprocessed images.
    ///
    /// # Errors
    ///
    /// See [`Predictor::logits`].
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        Ok(softmax(self.logits(images)?, 1))
    }

    /// Decodes, preprocesses and grades one image.
    ///
    /// # Errors
    ///
    /// - `InferenceError::EmptyInput` / `InvalidImage` for bad uploads
    /// - `InferenceError::Output` if the distribution is not valid
    pub fn predict(&self, image: &[u8]) -> Result<Prediction> {
        let start = Instant::now();
        let input = self.preprocessor.to_tensor::<B>(image, &self.device)?;
        debug!(dims = ?input.dims(), "preprocessed upload");

        let probabilities = self
            .probabilities(input)?
            .slice([0..1])
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::readback(format!("{e:?}")))?;

        let prediction = Prediction::from_probabilities(&probabilities)?;
        debug!(
            class = prediction.class_index,
            elapsed_ms = start.elapsed().as_millis(),
            "forward pass complete"
        );
        Ok(prediction)
    }
}

impl<B: Backend> Classify for Predictor<B> {
    fn classify(&self, image: &[u8]) -> Result<Prediction> {
        self.predict(image)
    }
}

/// Builds a shared classifier on the requested backend.
///
/// # Errors
///
/// - `ModelError::BackendUnavailable` if the backend wasn't compiled in
/// - Any error from [`Predictor::load`]
pub fn load_classifier(
    backend: BackendType,
    config: &EfficientNetGatConfig,
    weights: impl AsRef<Path>,
) -> Result<Arc<dyn Classify>> {
    backend.ensure_available()?;
    let weights = weights.as_ref();

    let classifier: Arc<dyn Classify> = match backend {
        BackendType::NdArray => Arc::new(Predictor::<CpuBackend>::load(
            config,
            weights,
            Default::default(),
        )?),
        #[cfg(feature = "wgpu")]
        BackendType::Wgpu => Arc::new(Predictor::<retina_models::GpuBackend>::load(
            config,
            weights,
            Default::default(),
        )?),
        #[cfg(not(feature = "wgpu"))]
        BackendType::Wgpu => return Err(ModelError::backend_unavailable(backend.name()).into()),
    };

    info!(%backend, weights = %weights.display(), "classifier ready");
    Ok(classifier)
}
