//! ResNet-18 feature extractor
//!
//! The convolutional trunk of ResNet-18 without its ImageNet classifier.
//! Input is a `[batch, 3, H, W]` tensor with values in [0, 1]; ImageNet
//! mean/std normalisation happens inside [`ResNetBackbone::forward`]. Output
//! is a `[batch, 512, H/32, W/32]` feature map.
//!
//! Field names mirror torchvision's state dict (after key remapping) so the
//! published weights load straight into this module.

use std::f64::consts::SQRT_2;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

use crate::model::weights::{self, PretrainedWeights};
use crate::utils::error::{PlantError, Result};

/// Channels of the final feature map
pub const FEATURE_CHANNELS: usize = 512;

const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

fn kaiming() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

fn conv(in_ch: usize, out_ch: usize, kernel: usize, stride: usize, pad: usize) -> Conv2dConfig {
    Conv2dConfig::new([in_ch, out_ch], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_bias(false)
        .with_initializer(kaiming())
}

/// 1x1 projection on the skip path when the shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv(in_channels, out_channels, 1, stride, 0).init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }
}

/// Two 3x3 convolutions with a residual connection
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub relu: Relu,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (in_channels != out_channels || stride != 1)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv(in_channels, out_channels, 3, stride, 1).init(device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv(out_channels, out_channels, 3, 1, 1).init(device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            downsample,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);

        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.relu.forward(x + identity)
    }
}

/// A stage of residual blocks; only the first block changes resolution
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    pub blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|i| {
                if i == 0 {
                    BasicBlock::new(in_channels, out_channels, stride, device)
                } else {
                    BasicBlock::new(out_channels, out_channels, 1, device)
                }
            })
            .collect();

        Self { blocks }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |x, block| block.forward(x))
    }
}

/// ResNet-18 trunk: stem + four residual stages
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub relu: Relu,
    pub maxpool: MaxPool2d,
    pub layer1: LayerBlock<B>,
    pub layer2: LayerBlock<B>,
    pub layer3: LayerBlock<B>,
    pub layer4: LayerBlock<B>,
}

impl<B: Backend> ResNetBackbone<B> {
    /// Randomly initialised (Kaiming normal) trunk
    pub fn new(device: &B::Device) -> Self {
        let [b1, b2, b3, b4] = RESNET18_BLOCKS;

        Self {
            conv1: conv(3, 64, 7, 2, 3).init(device),
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1: LayerBlock::new(b1, 64, 64, 1, device),
            layer2: LayerBlock::new(b2, 64, 128, 2, device),
            layer3: LayerBlock::new(b3, 128, 256, 2, device),
            layer4: LayerBlock::new(b4, 256, FEATURE_CHANNELS, 2, device),
        }
    }

    /// Trunk initialised from torchvision's ImageNet weights
    ///
    /// The weight file is downloaded once and cached on disk.
    pub fn pretrained(weights: &PretrainedWeights, device: &B::Device) -> Result<Self> {
        let path = weights::fetch(weights)?;
        info!("Loading pretrained backbone weights from {}", path.display());

        let load_args = LoadArgs::new(path)
            // *.downsample.0.* -> *.downsample.conv.*
            .with_key_remap("(.+)\\.downsample\\.0\\.(.+)", "$1.downsample.conv.$2")
            // *.downsample.1.* -> *.downsample.bn.*
            .with_key_remap("(.+)\\.downsample\\.1\\.(.+)", "$1.downsample.bn.$2")
            // layer[i].[j].* -> layer[i].blocks.[j].*
            .with_key_remap("(layer[1-4])\\.([0-9]+)\\.(.+)", "$1.blocks.$2.$3");

        let record: ResNetBackboneRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::new()
            .load(load_args, device)
            .map_err(|e| PlantError::Model(format!("Failed to import backbone weights: {e}")))?;

        Ok(Self::new(device).load_record(record))
    }

    /// Feature map for a `[batch, 3, H, W]` input in [0, 1]
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = normalize_imagenet(input);

        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.maxpool.forward(x);

        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        self.layer4.forward(x)
    }
}

/// (x - mean) / std per channel
fn normalize_imagenet<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);

    (images - mean) / std
}
