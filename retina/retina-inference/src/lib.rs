//! Fundus image preprocessing and grade prediction.
//!
//! # Pipeline
//!
//! 1. [`FundusPreprocessor`] - bytes -> RGB -> 224×224 -> normalized `[1, 3, 224, 224]`
//! 2. [`Predictor`] - forward pass -> softmax -> [`Prediction`](retina_types::Prediction)
//!
//! Servers depend on the object-safe [`Classify`] trait and build it with
//! [`load_classifier`], which picks the backend at runtime.
//!
//! # Example
//!
//! ```no_run
//! use retina_inference::load_classifier;
//! use retina_models::{BackendType, EfficientNetGatConfig};
//!
//! let classifier = load_classifier(
//!     BackendType::NdArray,
//!     &EfficientNetGatConfig::default(),
//!     "best_model.pth",
//! )?;
//! let prediction = classifier.classify(&std::fs::read("fundus.png").unwrap_or_default())?;
//! println!("{} ({:.2})", prediction.class_name, prediction.confidence);
//! # Ok::<(), retina_inference::InferenceError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod predictor;
mod preprocess;

pub use predictor::{Classify, Predictor, load_classifier};
pub use preprocess::{DEFAULT_IMAGE_SIZE, FundusPreprocessor};

pub use error::{InferenceError, Result};
