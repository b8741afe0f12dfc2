//! GATv2 graph-attention layer over a fixed grid graph.

use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig};
use burn::prelude::Backend;
use burn::tensor::activation::{leaky_relu, softmax};
use burn::tensor::{Bool, Tensor};
use serde::{Deserialize, Serialize};

use crate::graph::GridGraph;

/// Score given to non-edges before the softmax.
const MASKED_SCORE: f32 = -1.0e9;

/// Configuration for a [`GatV2Conv`] layer.
///
/// # Example
///
/// ```
/// use retina_models::GatV2Config;
///
/// let config = GatV2Config::new(26, 64).with_heads(4);
/// assert_eq!(config.output_dim(), 256);
///
/// let averaged = GatV2Config::new(256, 256).with_concat(false);
/// assert_eq!(averaged.output_dim(), 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatV2Config {
    /// Input feature width per node.
    pub in_channels: usize,

    /// Output width per head.
    pub out_channels: usize,

    /// Number of attention heads.
    pub heads: usize,

    /// Concatenate heads (`true`) or average them (`false`).
    pub concat: bool,

    /// Slope of the leaky ReLU applied to edge features.
    pub negative_slope: f64,

    /// Dropout on attention coefficients (training backends only).
    pub dropout: f64,

    /// Let each node attend to itself.
    pub add_self_loops: bool,
}

impl GatV2Config {
    /// Creates a single-head, concatenating configuration.
    #[must_use]
    pub const fn new(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            heads: 1,
            concat: true,
            negative_slope: 0.2,
            dropout: 0.0,
            add_self_loops: true,
        }
    }

    /// Sets the number of heads.
    #[must_use]
    pub const fn with_heads(mut self, heads: usize) -> Self {
        self.heads = heads;
        self
    }

    /// Chooses between concatenating and averaging heads.
    #[must_use]
    pub const fn with_concat(mut self, concat: bool) -> Self {
        self.concat = concat;
        self
    }

    /// Sets attention dropout.
    #[must_use]
    pub const fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Enables or disables implicit self-loops.
    #[must_use]
    pub const fn with_self_loops(mut self, add_self_loops: bool) -> Self {
        self.add_self_loops = add_self_loops;
        self
    }

    /// Width of the layer output per node.
    #[must_use]
    pub const fn output_dim(&self) -> usize {
        if self.concat {
            self.heads * self.out_channels
        } else {
            self.out_channels
        }
    }

    /// Returns `true` if all widths are positive and dropout is a probability.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.in_channels > 0
            && self.out_channels > 0
            && self.heads > 0
            && (0.0..1.0).contains(&self.dropout)
    }

    /// Initializes the layer.
    #[must_use]
    pub fn init<B: Backend>(&self, device: &B::Device) -> GatV2Conv<B> {
        let width = self.heads * self.out_channels;

        GatV2Conv {
            lin_l: LinearConfig::new(self.in_channels, width).init(device),
            lin_r: LinearConfig::new(self.in_channels, width).init(device),
            att: Initializer::Normal {
                mean: 0.0,
                std: 0.1,
            }
            .init([1, self.heads, self.out_channels], device),
            bias: Initializer::Zeros.init([self.output_dim()], device),
            dropout: DropoutConfig::new(self.dropout).init(),
            heads: self.heads,
            out_channels: self.out_channels,
            concat: self.concat,
            negative_slope: self.negative_slope,
            add_self_loops: self.add_self_loops,
        }
    }
}

/// GATv2 attention layer.
///
/// For an edge `j -> i` the score is
/// `att · leaky_relu(W_l x_j + W_r x_i)`, normalized by a softmax over all
/// sources of `i`. The output of node `i` is `Σ_j α_ij W_l x_j` per head.
///
/// Attention is evaluated densely over `[batch, N, N, heads]` and masked by
/// the adjacency, so every sample in a batch is processed independently.
/// Parameter names (`lin_l`, `lin_r`, `att`, `bias`) follow the `PyTorch`
/// Geometric layout so trained state dicts load without remapping.
#[derive(Debug, Module)]
pub struct GatV2Conv<B: Backend> {
    lin_l: Linear<B>,
    lin_r: Linear<B>,
    att: Param<Tensor<B, 3>>,
    bias: Param<Tensor<B, 1>>,
    dropout: Dropout,
    heads: usize,
    out_channels: usize,
    concat: bool,
    negative_slope: f64,
    add_self_loops: bool,
}

impl<B: Backend> GatV2Conv<B> {
    /// Runs attention over `graph`.
    ///
    /// # Arguments
    ///
    /// - `x`: Node features `[batch, num_nodes, in_channels]`
    /// - `graph`: Topology shared by every sample
    ///
    /// # Returns
    ///
    /// `[batch, num_nodes, output_dim]`
    pub fn forward(&self, x: Tensor<B, 3>, graph: &GridGraph) -> Tensor<B, 3> {
        let mask = graph.adjacency_mask::<B>(self.add_self_loops, &x.device());
        self.forward_masked(x, mask)
    }

    /// Runs attention with an explicit `[target, source]` adjacency mask.
    pub fn forward_masked(
        &self,
        x: Tensor<B, 3>,
        adjacency: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch, nodes, _] = x.dims();
        let (heads, channels) = (self.heads, self.out_channels);
        let pairwise = [batch, nodes, nodes, heads, channels];

        let source = self
            .lin_l
            .forward(x.clone())
            .reshape([batch, nodes, heads, channels]);
        let target = self.lin_r.forward(x).reshape([batch, nodes, heads, channels]);

        // e[b, i, j] = x_r[b, i] + x_l[b, j]
        let edge_features = target
            .reshape([batch, nodes, 1, heads, channels])
            .expand(pairwise)
            + source
                .clone()
                .reshape([batch, 1, nodes, heads, channels])
                .expand(pairwise);
        let edge_features = leaky_relu(edge_features, self.negative_slope);

        let att = self.att.val().reshape([1, 1, 1, heads, channels]).expand(pairwise);
        let scores = (edge_features * att)
            .sum_dim(4)
            .reshape([batch, nodes, nodes, heads]);

        let blocked = adjacency
            .bool_not()
            .reshape([1, nodes, nodes, 1])
            .expand([batch, nodes, nodes, heads]);
        let alpha = softmax(scores.mask_fill(blocked, MASKED_SCORE), 2);
        let alpha = self.dropout.forward(alpha);

        // [B, H, N_target, N_source] x [B, H, N_source, C]
        let messages = alpha
            .permute([0, 3, 1, 2])
            .matmul(source.swap_dims(1, 2))
            .swap_dims(1, 2);

        let out = if self.concat {
            messages.reshape([batch, nodes, heads * channels])
        } else {
            messages.mean_dim(2).reshape([batch, nodes, channels])
        };

        out + self.bias.val().unsqueeze::<3>()
    }

    /// Width of the layer output per node.
    #[must_use]
    pub const fn output_dim(&self) -> usize {
        if self.concat {
            self.heads * self.out_channels
        } else {
            self.out_channels
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::tensor::{Distribution, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn values(t: Tensor<TestBackend, 3>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn config_output_dim() {
        assert_eq!(GatV2Config::new(26, 64).with_heads(4).output_dim(), 256);
        assert_eq!(
            GatV2Config::new(256, 256).with_concat(false).output_dim(),
            256
        );
        assert!(GatV2Config::new(26, 64).is_valid());
        assert!(!GatV2Config::new(0, 64).is_valid());
        assert!(!GatV2Config::new(26, 64).with_dropout(1.0).is_valid());
    }

    #[test]
    fn forward_shapes() {
        let device = Default::default();
        let graph = GridGraph::new(3, 3);
        let x = Tensor::<TestBackend, 3>::random([2, 9, 6], Distribution::Default, &device);

        let concat = GatV2Config::new(6, 4).with_heads(3).init::<TestBackend>(&device);
        assert_eq!(concat.forward(x.clone(), &graph).dims(), [2, 9, 12]);

        let mean = GatV2Config::new(6, 5)
            .with_heads(2)
            .with_concat(false)
            .init::<TestBackend>(&device);
        assert_eq!(mean.forward(x, &graph).dims(), [2, 9, 5]);
    }

    #[test]
    fn non_neighbours_do_not_contribute() {
        let device = Default::default();
        let graph = GridGraph::new(3, 3);
        let layer = GatV2Config::new(4, 3).with_heads(2).init::<TestBackend>(&device);

        let base = Tensor::<TestBackend, 3>::random([1, 9, 4], Distribution::Default, &device);
        let mut perturbed = base.clone().into_data().to_vec::<f32>().unwrap();
        // Node 8 (bottom-right) is not adjacent to node 0 (top-left).
        for v in &mut perturbed[8 * 4..9 * 4] {
            *v += 10.0;
        }
        let perturbed =
            Tensor::<TestBackend, 3>::from_data(TensorData::new(perturbed, [1, 9, 4]), &device);

        let a = values(layer.forward(base, &graph));
        let b = values(layer.forward(perturbed, &graph));

        for k in 0..6 {
            assert_relative_eq!(a[k], b[k], epsilon = 1e-5);
        }
        // Node 8 itself must change.
        assert!((a[8 * 6] - b[8 * 6]).abs() > 1e-6);
    }

    #[test]
    fn zero_attention_averages_closed_neighbourhood() {
        let device = Default::default();
        let graph = GridGraph::new(1, 3);
        let layer = GatV2Config::new(2, 3).init::<TestBackend>(&device);
        let layer = GatV2Conv {
            att: Param::from_tensor(Tensor::zeros([1, 1, 3], &device)),
            ..layer
        };

        let x = Tensor::<TestBackend, 3>::random([1, 3, 2], Distribution::Default, &device);
        let projected = values(layer.lin_l.forward(x.clone()));
        let out = values(layer.forward(x, &graph));

        // Node 0 sees itself and node 1; node 1 sees all three.
        for c in 0..3 {
            let expected0 = (projected[c] + projected[3 + c]) / 2.0;
            let expected1 = (projected[c] + projected[3 + c] + projected[6 + c]) / 3.0;
            assert_relative_eq!(out[c], expected0, epsilon = 1e-5);
            assert_relative_eq!(out[3 + c], expected1, epsilon = 1e-5);
        }
    }

    #[test]
    fn batch_matches_individual_samples() {
        let device = Default::default();
        let graph = GridGraph::new(3, 3);
        let layer = GatV2Config::new(5, 4).with_heads(2).init::<TestBackend>(&device);

        let batch = Tensor::<TestBackend, 3>::random([3, 9, 5], Distribution::Default, &device);
        let joint = values(layer.forward(batch.clone(), &graph));

        for b in 0..3 {
            let single = batch.clone().slice([b..b + 1, 0..9, 0..5]);
            let alone = values(layer.forward(single, &graph));
            let offset = b * 9 * 8;
            for (k, v) in alone.iter().enumerate() {
                assert_relative_eq!(joint[offset + k], *v, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn fully_masked_row_stays_finite() {
        let device = Default::default();
        let graph = GridGraph::new(1, 1);
        let layer = GatV2Config::new(3, 2)
            .with_self_loops(false)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 3>::random([1, 1, 3], Distribution::Default, &device);
        let out = values(layer.forward(x, &graph));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
