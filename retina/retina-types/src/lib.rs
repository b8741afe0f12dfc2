//! Domain types for retinal diabetic-retinopathy grading.
//!
//! This crate holds the plain data shared by the model, inference and
//! server crates:
//!
//! # Grading Types
//!
//! - [`DrGrade`] - The five ordinal severity grades
//! - [`Prediction`] - Predicted grade, confidence and full distribution
//!
//! # Preprocessing Types
//!
//! - [`ImageStats`] - Per-channel normalization statistics
//!
//! # Layer 0 Crate
//!
//! This crate has no ML framework dependency. It can be used by:
//! - Inference servers
//! - Client tooling that parses `/predict` responses
//! - Evaluation scripts
//!
//! # Example
//!
//! ```
//! use retina_types::{DrGrade, Prediction};
//!
//! let prediction = Prediction::from_probabilities(&[0.1, 0.6, 0.2, 0.05, 0.05])?;
//! assert_eq!(prediction.grade(), DrGrade::Mild);
//! assert_eq!(prediction.class_name, "Mild");
//! # Ok::<(), retina_types::TypesError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod grade;
mod prediction;
mod stats;

pub use grade::{CLASS_NAMES, DrGrade, NUM_GRADES};
pub use prediction::Prediction;
pub use stats::ImageStats;

pub use error::{Result, TypesError};
