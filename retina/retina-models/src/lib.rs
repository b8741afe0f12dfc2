//! Burn model architectures and checkpoint loading for fundus grading.
//!
//! # Model Architecture
//!
//! - [`EfficientNet`] - EfficientNetV2 feature extractor, classifier removed
//! - [`GatV2Conv`] - GATv2 attention layer over a fixed graph
//! - [`EfficientNetGat`] - Backbone, node projection, two attention layers and
//!   a pooled linear head producing five grade logits
//!
//! # Graph Topology
//!
//! [`GridGraph`] connects every cell of the node grid to its eight
//! neighbours. It is built once with the model and never changes.
//!
//! # Checkpoint Persistence
//!
//! - `PyTorch` state dicts (`.pth`), imported with key remapping
//! - Burn binary records (`.bin`)
//! - Burn JSON records (`.json`)
//!
//! # Backend Support
//!
//! Models are generic over burn backends:
//! - `burn-ndarray` - CPU inference (default, [`CpuBackend`])
//! - `burn-wgpu` - GPU inference (optional `wgpu` feature)
//!
//! # Example
//!
//! ```
//! use burn::tensor::Tensor;
//! use retina_models::{BackboneConfig, CpuBackend, EfficientNetGat, EfficientNetGatConfig};
//!
//! let device = Default::default();
//! let config = EfficientNetGatConfig::default().with_backbone(BackboneConfig::compact());
//! let model = EfficientNetGat::<CpuBackend>::new(&config, &device)?;
//!
//! let logits = model.forward(Tensor::zeros([1, 3, 64, 64], &device));
//! assert_eq!(logits.dims(), [1, 5]);
//! # Ok::<(), retina_models::ModelError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod backbone;
mod backend;
mod checkpoint;
mod classifier;
mod error;
mod gat;
mod graph;

// Re-export model types
pub use backbone::{
    BackboneConfig, BlockKind, ConvNormAct, EfficientNet, FusedMbConv, MbConv, SqueezeExcitation,
    StageConfig,
};
pub use classifier::{EfficientNetGat, EfficientNetGatConfig};
pub use gat::{GatV2Config, GatV2Conv};
pub use graph::GridGraph;

// Re-export checkpoint utilities
pub use checkpoint::{CheckpointFormat, load_checkpoint, save_checkpoint};

// Re-export backend utilities
#[cfg(feature = "wgpu")]
pub use backend::GpuBackend;
pub use backend::{BackendType, CpuBackend};

// Re-export error types
pub use error::{ModelError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        BackboneConfig, BackendType, CheckpointFormat, CpuBackend, EfficientNetGat,
        EfficientNetGatConfig, GridGraph, ModelError, load_checkpoint, save_checkpoint,
    };
}
