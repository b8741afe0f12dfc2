//! Hybrid CNN + graph-attention grading model.

use burn::module::{Ignored, Module};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backbone::{BackboneConfig, EfficientNet};
use crate::error::{ModelError, Result};
use crate::gat::{GatV2Config, GatV2Conv};
use crate::graph::GridGraph;

/// Attribute name of the backbone inside the model.
const BACKBONE_PREFIX: &str = "efficientnet";

/// Configuration for [`EfficientNetGat`].
///
/// # Example
///
/// ```
/// use retina_models::EfficientNetGatConfig;
///
/// let config = EfficientNetGatConfig::default();
/// assert_eq!(config.num_nodes(), 49);
/// assert_eq!(config.node_feat_dim(), 26);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficientNetGatConfig {
    /// Number of output grades.
    pub num_classes: usize,

    /// Width of the graph embedding.
    pub gat_hidden_dim: usize,

    /// Heads in the first attention layer.
    pub num_heads: usize,

    /// Dropout between and inside attention layers (training only).
    pub dropout: f64,

    /// Grid rows.
    pub grid_height: usize,

    /// Grid columns.
    pub grid_width: usize,

    /// Feature extractor layout.
    pub backbone: BackboneConfig,
}

impl Default for EfficientNetGatConfig {
    fn default() -> Self {
        Self {
            num_classes: retina_types::NUM_GRADES,
            gat_hidden_dim: 256,
            num_heads: 4,
            dropout: 0.2,
            grid_height: 7,
            grid_width: 7,
            backbone: BackboneConfig::efficientnet_v2_s(),
        }
    }
}

impl EfficientNetGatConfig {
    /// Sets the backbone layout.
    #[must_use]
    pub fn with_backbone(mut self, backbone: BackboneConfig) -> Self {
        self.backbone = backbone;
        self
    }

    /// Sets the graph embedding width.
    #[must_use]
    pub fn with_gat_hidden_dim(mut self, gat_hidden_dim: usize) -> Self {
        self.gat_hidden_dim = gat_hidden_dim;
        self
    }

    /// Sets the number of first-layer heads.
    #[must_use]
    pub fn with_num_heads(mut self, num_heads: usize) -> Self {
        self.num_heads = num_heads;
        self
    }

    /// Number of graph nodes.
    #[must_use]
    pub const fn num_nodes(&self) -> usize {
        self.grid_height * self.grid_width
    }

    /// Per-node feature width.
    ///
    /// Integer division: when the embedding size is not a multiple of the
    /// node count the remainder is dropped (1280 / 49 = 26, 1274 used).
    #[must_use]
    pub const fn node_feat_dim(&self) -> usize {
        match self.num_nodes() {
            0 => 0,
            nodes => self.backbone.feature_dim() / nodes,
        }
    }

    /// Input width of the final linear layer.
    #[must_use]
    pub const fn head_input_dim(&self) -> usize {
        self.node_feat_dim() + self.gat_hidden_dim
    }

    /// First attention layer: concatenated heads.
    #[must_use]
    pub fn gat1(&self) -> GatV2Config {
        GatV2Config::new(self.node_feat_dim(), self.gat_hidden_dim / self.num_heads.max(1))
            .with_heads(self.num_heads)
            .with_concat(true)
            .with_dropout(self.dropout)
    }

    /// Second attention layer: one averaged head.
    #[must_use]
    pub fn gat2(&self) -> GatV2Config {
        GatV2Config::new(self.gat_hidden_dim, self.gat_hidden_dim)
            .with_heads(1)
            .with_concat(false)
            .with_dropout(self.dropout)
    }

    /// Checks that every derived dimension is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(ModelError::invalid_config("num_classes must be > 0"));
        }
        if self.num_nodes() == 0 {
            return Err(ModelError::invalid_config("grid must have at least one cell"));
        }
        if !self.backbone.is_valid() {
            return Err(ModelError::invalid_config("backbone layout is inconsistent"));
        }
        if self.node_feat_dim() == 0 {
            return Err(ModelError::invalid_config(format!(
                "backbone feature_dim {} is smaller than node count {}",
                self.backbone.feature_dim(),
                self.num_nodes()
            )));
        }
        if self.num_heads == 0 || self.gat_hidden_dim % self.num_heads != 0 {
            return Err(ModelError::invalid_config(format!(
                "gat_hidden_dim {} must be divisible by num_heads {}",
                self.gat_hidden_dim, self.num_heads
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::invalid_config("dropout must be in [0, 1)"));
        }
        Ok(())
    }

    /// State-dict key remaps for importing a `PyTorch` checkpoint of this model.
    #[must_use]
    pub fn pytorch_key_remaps(&self) -> Vec<(String, String)> {
        self.backbone.pytorch_key_remaps(BACKBONE_PREFIX)
    }
}

/// EfficientNetV2 backbone feeding a two-layer GATv2 stack over a grid graph.
///
/// Architecture:
/// 1. Backbone -> `[batch, feature_dim]`
/// 2. Linear projection -> `[batch, nodes, node_feat_dim]`
/// 3. GATv2 (multi-head, concat) -> ELU -> dropout -> GATv2 (single head)
/// 4. Concatenate projected and graph features per node, mean over nodes
/// 5. Linear -> `[batch, num_classes]` logits
///
/// # Example
///
/// ```ignore
/// use retina_models::{BackboneConfig, EfficientNetGat, EfficientNetGatConfig};
///
/// let config = EfficientNetGatConfig::default().with_backbone(BackboneConfig::compact());
/// let model = EfficientNetGat::<MyBackend>::new(&config, &device)?;
/// let logits = model.forward(Tensor::zeros([1, 3, 224, 224], &device));
/// assert_eq!(logits.dims(), [1, 5]);
/// ```
#[derive(Debug, Module)]
pub struct EfficientNetGat<B: Backend> {
    efficientnet: EfficientNet<B>,
    transform: Linear<B>,
    gat1: GatV2Conv<B>,
    gat2: GatV2Conv<B>,
    fc: Linear<B>,
    dropout: Dropout,
    graph: Ignored<GridGraph>,
    num_nodes: usize,
    node_feat_dim: usize,
}

impl<B: Backend> EfficientNetGat<B> {
    /// Builds the model with freshly initialized weights.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if the configuration fails validation.
    pub fn new(config: &EfficientNetGatConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let num_nodes = config.num_nodes();
        let node_feat_dim = config.node_feat_dim();
        let graph = GridGraph::new(config.grid_height, config.grid_width);

        debug!(
            feature_dim = config.backbone.feature_dim(),
            num_nodes,
            node_feat_dim,
            edges = graph.edge_count(),
            "building grading model"
        );

        Ok(Self {
            efficientnet: config.backbone.init(device),
            transform: LinearConfig::new(config.backbone.feature_dim(), num_nodes * node_feat_dim)
                .init(device),
            gat1: config.gat1().init(device),
            gat2: config.gat2().init(device),
            fc: LinearConfig::new(config.head_input_dim(), config.num_classes).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            graph: Ignored(graph),
            num_nodes,
            node_feat_dim,
        })
    }

    /// Runs the forward pass.
    ///
    /// # Arguments
    ///
    /// - `images`: Normalized images `[batch, 3, H, W]`
    ///
    /// # Returns
    ///
    /// Logits `[batch, num_classes]` (no softmax).
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let node_features = self.node_features(images);
        let [batch, _, _] = node_features.dims();

        let graph_embeddings = self.graph_embeddings(node_features.clone());
        let [_, _, hidden] = graph_embeddings.dims();

        let combined = Tensor::cat(vec![node_features, graph_embeddings], 2);
        let pooled = combined
            .mean_dim(1)
            .reshape([batch, self.node_feat_dim + hidden]);

        self.fc.forward(pooled)
    }

    /// Backbone embedding projected onto the node grid: `[batch, nodes, node_feat_dim]`.
    pub fn node_features(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let features = self.efficientnet.forward(images);
        let [batch, _] = features.dims();

        self.transform
            .forward(features)
            .reshape([batch, self.num_nodes, self.node_feat_dim])
    }

    /// Two-layer attention over the grid: `[batch, nodes, gat_hidden_dim]`.
    pub fn graph_embeddings(&self, node_features: Tensor<B, 3>) -> Tensor<B, 3> {
        let graph = &self.graph.0;
        let x = self.gat1.forward(node_features, graph);
        let x = self.dropout.forward(elu(x));
        self.gat2.forward(x, graph)
    }

    /// The fixed grid topology.
    #[must_use]
    pub fn graph(&self) -> &GridGraph {
        &self.graph.0
    }
}

/// `x` for positive inputs, `exp(x) - 1` otherwise.
fn elu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_min(0.0) + x.clamp_max(0.0).exp().sub_scalar(1.0)
}
