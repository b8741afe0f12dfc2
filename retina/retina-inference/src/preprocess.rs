//! Fundus image preprocessing.
//!
//! Turns uploaded bytes into the normalized `[1, 3, S, S]` tensor the grading
//! model expects:
//! 1. Decode any format the `image` crate recognizes
//! 2. Convert to RGB8 (grayscale, alpha and 16-bit inputs included)
//! 3. Resize to `S × S` with bilinear (triangle) filtering, ignoring aspect ratio
//! 4. Scale to `[0, 1]` and normalize each channel

use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use image::RgbImage;
use image::imageops::{self, FilterType};
use retina_types::ImageStats;

use crate::error::{InferenceError, Result};

/// Side length the grading model was trained on.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Converts encoded images into model input.
///
/// # Example
///
/// ```
/// use retina_inference::FundusPreprocessor;
///
/// let preprocessor = FundusPreprocessor::new().with_target_size(32);
/// assert_eq!(preprocessor.target_size(), 32);
/// assert!(preprocessor.preprocess(&[]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FundusPreprocessor {
    target_size: u32,
    stats: ImageStats,
}

impl Default for FundusPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FundusPreprocessor {
    /// 224×224 input with ImageNet statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            target_size: DEFAULT_IMAGE_SIZE,
            stats: ImageStats::IMAGENET,
        }
    }

    /// Sets the output side length.
    #[must_use]
    pub const fn with_target_size(mut self, target_size: u32) -> Self {
        self.target_size = target_size;
        self
    }

    /// Sets the normalization statistics.
    #[must_use]
    pub const fn with_stats(mut self, stats: ImageStats) -> Self {
        self.stats = stats;
        self
    }

    /// Output side length.
    #[must_use]
    pub const fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Normalization statistics.
    #[must_use]
    pub const fn stats(&self) -> &ImageStats {
        &self.stats
    }

    /// Number of values in one preprocessed image.
    #[must_use]
    pub const fn output_len(&self) -> usize {
        let side = self.target_size as usize;
        3 * side * side
    }

    /// Decodes `bytes` into an RGB image.
    ///
    /// # Errors
    ///
    /// - `InferenceError::EmptyInput` if `bytes` is empty
    /// - `InferenceError::InvalidImage` if decoding fails or the image has no pixels
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(InferenceError::EmptyInput);
        }

        let image = image::load_from_memory(bytes)
            .map_err(|e| InferenceError::invalid_image(e.to_string()))?
            .to_rgb8();

        if image.width() == 0 || image.height() == 0 {
            return Err(InferenceError::invalid_image("image has zero dimensions"));
        }
        Ok(image)
    }

    /// Resizes and normalizes an RGB image into a CHW buffer.
    #[must_use]
    pub fn normalize(&self, image: &RgbImage) -> Vec<f32> {
        let side = self.target_size;
        let resized = imageops::resize(image, side, side, FilterType::Triangle);
        let plane = (self.target_size * self.target_size) as usize;

        let mut chw = vec![0.0; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            let [r, g, b] = self.stats.normalize_rgb8(pixel.0);
            chw[i] = r;
            chw[plane + i] = g;
            chw[2 * plane + i] = b;
        }
        chw
    }

    /// Decodes, resizes and normalizes `bytes` into a CHW buffer.
    ///
    /// # Errors
    ///
    /// See [`FundusPreprocessor::decode`].
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let image = self.decode(bytes)?;
        Ok(self.normalize(&image))
    }

    /// Preprocesses `bytes` into a `[1, 3, S, S]` tensor on `device`.
    ///
    /// # Errors
    ///
    /// See [`FundusPreprocessor::decode`].
    pub fn to_tensor<B: Backend>(&self, bytes: &[u8], device: &B::Device) -> Result<Tensor<B, 4>> {
        let side = self.target_size as usize;
        let data = TensorData::new(self.preprocess(bytes)?, [1, 3, side, side]);
        Ok(Tensor::from_data(data, device))
    }
}
