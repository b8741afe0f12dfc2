//! Channel normalization statistics for fundus preprocessing.

use serde::{Deserialize, Serialize};

/// Per-channel mean and standard deviation applied after scaling to `[0, 1]`.
///
/// The pretrained backbone expects `ImageNet` statistics, which is the default.
///
/// # Example
///
/// ```
/// use retina_types::ImageStats;
///
/// let stats = ImageStats::IMAGENET;
/// let [r, _, _] = stats.normalize_rgb8([124, 116, 104]);
/// assert!(r.abs() < 0.01);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    /// Per-channel mean (RGB order).
    pub mean: [f32; 3],

    /// Per-channel standard deviation (RGB order).
    pub std: [f32; 3],
}

impl ImageStats {
    /// Creates new statistics.
    #[must_use]
    pub const fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }

    /// `ImageNet` statistics used by torchvision pretrained backbones.
    pub const IMAGENET: Self = Self {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    /// Identity statistics; values pass through unchanged.
    pub const UNITY: Self = Self {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
    };

    /// Normalizes one channel value already scaled to `[0, 1]`.
    ///
    /// Channels beyond the third are returned unchanged.
    #[must_use]
    pub fn normalize(&self, value: f32, channel: usize) -> f32 {
        if channel >= 3 {
            return value;
        }
        (value - self.mean[channel]) / self.std[channel]
    }

    /// Scales an 8-bit RGB pixel to `[0, 1]` and normalizes it.
    #[must_use]
    pub fn normalize_rgb8(&self, rgb: [u8; 3]) -> [f32; 3] {
        [
            self.normalize(f32::from(rgb[0]) / 255.0, 0),
            self.normalize(f32::from(rgb[1]) / 255.0, 1),
            self.normalize(f32::from(rgb[2]) / 255.0, 2),
        ]
    }

    /// Returns `false` if any std is zero or any value is not finite.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.std.iter().all(|&s| s.is_finite() && s.abs() > 1e-10)
            && self.mean.iter().all(|m| m.is_finite())
    }
}

impl Default for ImageStats {
    fn default() -> Self {
        Self::IMAGENET
    }
}
