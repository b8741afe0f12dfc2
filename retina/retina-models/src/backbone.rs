//! EfficientNetV2 feature extractor with the classification head removed.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::{sigmoid, silu};
use serde::{Deserialize, Serialize};

/// Kind of inverted-residual block used by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Fused-MBConv: a single full convolution replaces expansion + depthwise.
    Fused,
    /// MBConv: 1×1 expansion, depthwise convolution, squeeze-excitation.
    MbConv,
}

/// One stage of repeated blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Block type.
    pub kind: BlockKind,
    /// Channel expansion ratio.
    pub expand_ratio: usize,
    /// Spatial kernel size.
    pub kernel: usize,
    /// Stride of the first block.
    pub stride: usize,
    /// Input channels of the first block.
    pub in_channels: usize,
    /// Output channels of every block.
    pub out_channels: usize,
    /// Number of blocks.
    pub layers: usize,
}

impl StageConfig {
    /// Creates a Fused-MBConv stage.
    #[must_use]
    pub const fn fused(
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        in_channels: usize,
        out_channels: usize,
        layers: usize,
    ) -> Self {
        Self {
            kind: BlockKind::Fused,
            expand_ratio,
            kernel,
            stride,
            in_channels,
            out_channels,
            layers,
        }
    }

    /// Creates an MBConv stage.
    #[must_use]
    pub const fn mb_conv(
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        in_channels: usize,
        out_channels: usize,
        layers: usize,
    ) -> Self {
        Self {
            kind: BlockKind::MbConv,
            expand_ratio,
            kernel,
            stride,
            in_channels,
            out_channels,
            layers,
        }
    }

    /// Input channels and stride of block `index` within the stage.
    const fn block_io(&self, index: usize) -> (usize, usize) {
        if index == 0 {
            (self.in_channels, self.stride)
        } else {
            (self.out_channels, 1)
        }
    }
}

/// Backbone layout.
///
/// # Example
///
/// ```
/// use retina_models::BackboneConfig;
///
/// let config = BackboneConfig::efficientnet_v2_s();
/// assert_eq!(config.feature_dim(), 1280);
/// assert!(config.is_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// Output channels of the stride-2 stem.
    pub stem_channels: usize,

    /// Stages in execution order; all fused stages come first.
    pub stages: Vec<StageConfig>,

    /// Width of the final 1×1 convolution (the embedding size).
    pub head_channels: usize,

    /// Batch-norm epsilon.
    pub norm_eps: f64,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self::efficientnet_v2_s()
    }
}

impl BackboneConfig {
    /// torchvision `efficientnet_v2_s` layout.
    #[must_use]
    pub fn efficientnet_v2_s() -> Self {
        Self {
            stem_channels: 24,
            stages: vec![
                StageConfig::fused(1, 3, 1, 24, 24, 2),
                StageConfig::fused(4, 3, 2, 24, 48, 4),
                StageConfig::fused(4, 3, 2, 48, 64, 4),
                StageConfig::mb_conv(4, 3, 2, 64, 128, 6),
                StageConfig::mb_conv(6, 3, 1, 128, 160, 9),
                StageConfig::mb_conv(6, 3, 2, 160, 256, 15),
            ],
            head_channels: 1280,
            norm_eps: 1e-3,
        }
    }

    /// A narrow, shallow layout with every block type, for tests and smoke runs.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            stem_channels: 8,
            stages: vec![
                StageConfig::fused(1, 3, 1, 8, 8, 1),
                StageConfig::fused(2, 3, 2, 8, 16, 1),
                StageConfig::mb_conv(2, 3, 2, 16, 24, 2),
            ],
            head_channels: 98,
            norm_eps: 1e-3,
        }
    }

    /// Size of the pooled embedding.
    #[must_use]
    pub const fn feature_dim(&self) -> usize {
        self.head_channels
    }

    /// Total number of blocks across stages.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.stages.iter().map(|s| s.layers).sum()
    }

    /// Validates channel chaining and stage ordering.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let mut channels = self.stem_channels;
        let mut seen_mb = false;

        for stage in &self.stages {
            if stage.in_channels != channels
                || stage.layers == 0
                || stage.expand_ratio == 0
                || stage.kernel == 0
                || stage.stride == 0
            {
                return false;
            }
            match stage.kind {
                BlockKind::Fused if seen_mb => return false,
                BlockKind::Fused => {}
                BlockKind::MbConv => seen_mb = true,
            }
            channels = stage.out_channels;
        }

        self.stem_channels > 0 && self.head_channels > 0 && self.norm_eps > 0.0
    }

    /// Regex remaps from torchvision state-dict keys to this module tree.
    ///
    /// `prefix` is the attribute name of the backbone in the parent model
    /// (`efficientnet` for the grading model).
    #[must_use]
    pub fn pytorch_key_remaps(&self, prefix: &str) -> Vec<(String, String)> {
        let features = format!(r"^{prefix}\.features");
        let mut remaps = conv_norm_remaps(&format!(r"{features}\.0"), &format!("{prefix}.stem"));

        let mut fused = 0;
        let mut mb = 0;
        for (i, stage) in self.stages.iter().enumerate() {
            let stage_key = format!(r"{features}\.{}\.(\d+)\.block", i + 1);
            let expands = stage.expand_ratio != 1;

            match stage.kind {
                BlockKind::Fused => {
                    let target = format!("{prefix}.fused_stages.{fused}.${{1}}");
                    remaps.extend(conv_norm_remaps(
                        &format!(r"{stage_key}\.0"),
                        &format!("{target}.conv"),
                    ));
                    if expands {
                        remaps.extend(conv_norm_remaps(
                            &format!(r"{stage_key}\.1"),
                            &format!("{target}.project"),
                        ));
                    }
                    fused += 1;
                }
                BlockKind::MbConv => {
                    let target = format!("{prefix}.mb_stages.{mb}.${{1}}");
                    let mut slot = 0;
                    if expands {
                        remaps.extend(conv_norm_remaps(
                            &format!(r"{stage_key}\.{slot}"),
                            &format!("{target}.expand"),
                        ));
                        slot += 1;
                    }
                    remaps.extend(conv_norm_remaps(
                        &format!(r"{stage_key}\.{slot}"),
                        &format!("{target}.depthwise"),
                    ));
                    remaps.push((
                        format!(r"{stage_key}\.{}\.", slot + 1),
                        format!("{target}.se."),
                    ));
                    remaps.extend(conv_norm_remaps(
                        &format!(r"{stage_key}\.{}", slot + 2),
                        &format!("{target}.project"),
                    ));
                    mb += 1;
                }
            }
        }

        remaps.extend(conv_norm_remaps(
            &format!(r"{features}\.{}", self.stages.len() + 1),
            &format!("{prefix}.head"),
        ));
        remaps
    }

    /// Initializes the backbone.
    #[must_use]
    pub fn init<B: Backend>(&self, device: &B::Device) -> EfficientNet<B> {
        let eps = self.norm_eps;
        let stem = ConvNormAct::new(3, self.stem_channels, 3, 2, 1, true, eps, device);

        let mut fused_stages = Vec::new();
        let mut mb_stages = Vec::new();
        let mut last = self.stem_channels;

        for stage in &self.stages {
            match stage.kind {
                BlockKind::Fused => fused_stages.push(
                    (0..stage.layers)
                        .map(|i| FusedMbConv::new(stage, i, eps, device))
                        .collect(),
                ),
                BlockKind::MbConv => mb_stages.push(
                    (0..stage.layers)
                        .map(|i| MbConv::new(stage, i, eps, device))
                        .collect(),
                ),
            }
            last = stage.out_channels;
        }

        let head = ConvNormAct::new(last, self.head_channels, 1, 1, 1, true, eps, device);

        EfficientNet {
            stem,
            fused_stages,
            mb_stages,
            head,
        }
    }
}

/// Remaps a torchvision `Conv2dNormActivation` (`.0` conv, `.1` norm).
fn conv_norm_remaps(source: &str, target: &str) -> Vec<(String, String)> {
    vec![
        (format!(r"{source}\.0\."), format!("{target}.conv.")),
        (format!(r"{source}\.1\."), format!("{target}.norm.")),
    ]
}

/// Convolution, batch norm and optional SiLU.
#[derive(Debug, Module)]
pub struct ConvNormAct<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activate: bool,
}

impl<B: Backend> ConvNormAct<B> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        activate: bool,
        eps: f64,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel - 1) / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let norm = BatchNormConfig::new(out_channels)
            .with_epsilon(eps)
            .init(device);

        Self {
            conv,
            norm,
            activate,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(self.conv.forward(x));
        if self.activate { silu(x) } else { x }
    }
}

/// Channel attention: global pool, bottleneck, sigmoid gate.
#[derive(Debug, Module)]
pub struct SqueezeExcitation<B: Backend> {
    fc1: Conv2d<B>,
    fc2: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    fn new(channels: usize, squeeze: usize, device: &B::Device) -> Self {
        Self {
            fc1: Conv2dConfig::new([channels, squeeze], [1, 1]).init(device),
            fc2: Conv2dConfig::new([squeeze, channels], [1, 1]).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let dims = x.dims();
        let scale = x.clone().mean_dim(3).mean_dim(2);
        let scale = sigmoid(self.fc2.forward(silu(self.fc1.forward(scale))));
        x * scale.expand(dims)
    }
}

/// Fused-MBConv block.
#[derive(Debug, Module)]
pub struct FusedMbConv<B: Backend> {
    conv: ConvNormAct<B>,
    project: Option<ConvNormAct<B>>,
    residual: bool,
}

impl<B: Backend> FusedMbConv<B> {
    fn new(stage: &StageConfig, index: usize, eps: f64, device: &B::Device) -> Self {
        let (input, stride) = stage.block_io(index);
        let output = stage.out_channels;
        let expanded = input * stage.expand_ratio;

        let (conv, project) = if stage.expand_ratio == 1 {
            (
                ConvNormAct::new(input, output, stage.kernel, stride, 1, true, eps, device),
                None,
            )
        } else {
            (
                ConvNormAct::new(input, expanded, stage.kernel, stride, 1, true, eps, device),
                Some(ConvNormAct::new(expanded, output, 1, 1, 1, false, eps, device)),
            )
        };

        Self {
            conv,
            project,
            residual: stride == 1 && input == output,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.conv.forward(input.clone());
        if let Some(project) = &self.project {
            x = project.forward(x);
        }
        if self.residual { x + input } else { x }
    }
}

/// MBConv block with squeeze-excitation.
#[derive(Debug, Module)]
pub struct MbConv<B: Backend> {
    expand: Option<ConvNormAct<B>>,
    depthwise: ConvNormAct<B>,
    se: SqueezeExcitation<B>,
    project: ConvNormAct<B>,
    residual: bool,
}

impl<B: Backend> MbConv<B> {
    fn new(stage: &StageConfig, index: usize, eps: f64, device: &B::Device) -> Self {
        let (input, stride) = stage.block_io(index);
        let output = stage.out_channels;
        let expanded = input * stage.expand_ratio;

        let expand = (stage.expand_ratio != 1)
            .then(|| ConvNormAct::new(input, expanded, 1, 1, 1, true, eps, device));
        let depthwise = ConvNormAct::new(
            expanded,
            expanded,
            stage.kernel,
            stride,
            expanded,
            true,
            eps,
            device,
        );

        Self {
            expand,
            depthwise,
            se: SqueezeExcitation::new(expanded, (input / 4).max(1), device),
            project: ConvNormAct::new(expanded, output, 1, 1, 1, false, eps, device),
            residual: stride == 1 && input == output,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        if let Some(expand) = &self.expand {
            x = expand.forward(x);
        }
        let x = self.project.forward(self.se.forward(self.depthwise.forward(x)));
        if self.residual { x + input } else { x }
    }
}

/// EfficientNetV2 feature extractor.
///
/// Maps `[batch, 3, H, W]` images to `[batch, feature_dim]` embeddings by
/// global average pooling the head activations. There is no classifier.
///
/// Batch norm uses running statistics and stochastic depth is skipped, so
/// the output is deterministic on inference backends.
#[derive(Debug, Module)]
pub struct EfficientNet<B: Backend> {
    stem: ConvNormAct<B>,
    fused_stages: Vec<Vec<FusedMbConv<B>>>,
    mb_stages: Vec<Vec<MbConv<B>>>,
    head: ConvNormAct<B>,
}

impl<B: Backend> EfficientNet<B> {
    /// Extracts pooled features.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(images);

        for block in self.fused_stages.iter().flatten() {
            x = block.forward(x);
        }
        for block in self.mb_stages.iter().flatten() {
            x = block.forward(x);
        }

        let x = self.head.forward(x);
        let [batch, channels, _, _] = x.dims();
        x.mean_dim(3).mean_dim(2).reshape([batch, channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn v2_s_layout() {
        let config = BackboneConfig::efficientnet_v2_s();
        assert!(config.is_valid());
        assert_eq!(config.feature_dim(), 1280);
        assert_eq!(config.block_count(), 40);
    }

    #[test]
    fn compact_layout_is_valid() {
        let config = BackboneConfig::compact();
        assert!(config.is_valid());
        assert_eq!(config.feature_dim() / 49, 2);
    }

    #[test]
    fn invalid_layouts() {
        let mut broken_chain = BackboneConfig::compact();
        broken_chain.stages[1].in_channels = 12;
        assert!(!broken_chain.is_valid());

        let mut reordered = BackboneConfig::compact();
        reordered.stages.push(StageConfig::fused(1, 3, 1, 24, 24, 1));
        assert!(!reordered.is_valid());
    }

    #[test]
    fn forward_produces_embedding() {
        let device = Default::default();
        let config = BackboneConfig::compact();
        let model = config.init::<TestBackend>(&device);

        let images =
            Tensor::<TestBackend, 4>::random([2, 3, 64, 64], Distribution::Default, &device);
        let features = model.forward(images);

        assert_eq!(features.dims(), [2, 98]);
        let values = features.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn forward_is_deterministic() {
        let device = Default::default();
        let model = BackboneConfig::compact().init::<TestBackend>(&device);
        let images =
            Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Default, &device);

        let a = model.forward(images.clone()).into_data().to_vec::<f32>().unwrap();
        let b = model.forward(images).into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn residual_only_when_shape_preserved() {
        let stage = StageConfig::mb_conv(2, 3, 2, 16, 24, 2);
        let device = Default::default();
        let first = MbConv::<TestBackend>::new(&stage, 0, 1e-3, &device);
        let second = MbConv::<TestBackend>::new(&stage, 1, 1e-3, &device);
        assert!(!first.residual);
        assert!(second.residual);
    }

    #[test]
    fn remaps_cover_every_block() {
        let config = BackboneConfig::efficientnet_v2_s();
        let remaps = config.pytorch_key_remaps("efficientnet");

        // stem + head: 2 each; fused stage 1 (no expansion): 2; fused expanding: 4;
        // mb: expand 2 + depthwise 2 + se 1 + project 2.
        assert_eq!(remaps.len(), 2 + 2 + 2 + 4 * 2 + 7 * 3);
        assert!(remaps.iter().any(|(from, to)| from
            == r"^efficientnet\.features\.4\.(\d+)\.block\.2\."
            && to == "efficientnet.mb_stages.0.${1}.se."));
        assert!(remaps.iter().any(|(from, to)| from == r"^efficientnet\.features\.7\.0\."
            && to == "efficientnet.head.conv."));
    }
}
