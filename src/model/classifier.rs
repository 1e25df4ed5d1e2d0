//! Transfer-learning classifier
//!
//! A frozen ResNet-18 trunk followed by a small trainable head:
//!
//! ```text
//! image [B,3,H,W] -> backbone (frozen) -> [B,512,h,w]
//!   -> global average pool -> [B,512]
//!   -> Linear(512, 64) -> ReLU -> Dropout(0.3)
//!   -> Linear(64, num_classes) -> logits (softmax for probabilities)
//! ```

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{
        activation::softmax,
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};

use crate::model::backbone::{ResNetBackbone, FEATURE_CHANNELS};
use crate::model::weights::RESNET18_IMAGENET1K_V1;
use crate::utils::error::Result as PlantResult;

/// Configuration for the [`PlantClassifier`]
#[derive(Config, Debug, PartialEq)]
pub struct PlantClassifierConfig {
    /// Width of the output layer; must equal the class catalog length
    pub num_classes: usize,

    /// Units in the hidden dense layer
    #[config(default = "64")]
    pub hidden_units: usize,

    /// Dropout rate, active during training only
    #[config(default = "0.3")]
    pub dropout: f64,

    /// Square input resolution the model was trained at
    #[config(default = "224")]
    pub image_size: usize,
}

impl PlantClassifierConfig {
    /// Classifier with a randomly initialised trunk
    pub fn init<B: Backend>(&self, device: &B::Device) -> PlantClassifier<B> {
        PlantClassifier {
            backbone: ResNetBackbone::new(device).no_grad(),
            head: ClassificationHead::new(self, device),
        }
    }

    /// Classifier whose trunk carries the ImageNet weights
    pub fn init_pretrained<B: Backend>(&self, device: &B::Device) -> PlantResult<PlantClassifier<B>> {
        let backbone = ResNetBackbone::pretrained(&RESNET18_IMAGENET1K_V1, device)?;

        Ok(PlantClassifier {
            backbone: backbone.no_grad(),
            head: ClassificationHead::new(self, device),
        })
    }
}

/// Trainable part of the network
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub hidden: Linear<B>,
    pub relu: Relu,
    pub dropout: Dropout,
    pub output: Linear<B>,
}

impl<B: Backend> ClassificationHead<B> {
    pub fn new(config: &PlantClassifierConfig, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(FEATURE_CHANNELS, config.hidden_units).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(config.dropout).init(),
            output: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
        }
    }

    /// Logits from a backbone feature map
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(features);

        // [B, C, 1, 1] -> [B, C]
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.hidden.forward(x);
        let x = self.relu.forward(x);
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Number of output units, read from the loaded weights
    pub fn output_width(&self) -> usize {
        self.output.weight.dims()[1]
    }
}

/// Frozen backbone + trainable head
#[derive(Module, Debug)]
pub struct PlantClassifier<B: Backend> {
    pub backbone: ResNetBackbone<B>,
    pub head: ClassificationHead<B>,
}

impl<B: Backend> PlantClassifier<B> {
    /// Logits of shape `[batch, num_classes]`
    ///
    /// For evaluation and inference. On an autodiff backend the trunk's batch
    /// norm layers would switch to training mode here; training goes through
    /// [`PlantClassifier::forward_frozen`] instead.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    /// Class probabilities; every row sums to 1
    pub fn forward_probs(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn output_width(&self) -> usize {
        self.head.output_width()
    }
}

impl<B: AutodiffBackend> PlantClassifier<B> {
    /// Inference copy of the trunk, used as a fixed feature extractor
    pub fn frozen_backbone(&self) -> ResNetBackbone<B::InnerBackend> {
        self.backbone.valid()
    }

    /// Training forward pass: the trunk runs outside the autodiff graph
    /// (inference-mode batch norm, no gradients), only the head is tracked.
    pub fn forward_frozen(
        &self,
        extractor: &ResNetBackbone<B::InnerBackend>,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let features = extractor.forward(images.inner());
        self.head.forward(Tensor::from_inner(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::optim::GradientsParams;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn test_output_shape_and_width() {
        let device = Default::default();
        let model = PlantClassifierConfig::new(5)
            .with_image_size(32)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [2, 5]);
        assert_eq!(model.output_width(), 5);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let model = PlantClassifierConfig::new(4).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::random(
            [3, 3, 32, 32],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let probs: Vec<f32> = model.forward_probs(input).into_data().to_vec().unwrap();

        for row in probs.chunks(4) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = PlantClassifierConfig::new(38);
        assert_eq!(config.hidden_units, 64);
        assert_eq!(config.dropout, 0.3);
        assert_eq!(config.image_size, 224);
    }

    #[test]
    fn test_only_head_receives_gradients() {
        let device = Default::default();
        let model = PlantClassifierConfig::new(3).init::<TestAutodiffBackend>(&device);
        let extractor = model.frozen_backbone();

        let input = Tensor::<TestAutodiffBackend, 4>::ones([2, 3, 32, 32], &device);
        let loss = model.forward_frozen(&extractor, input).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        assert!(grads
            .get::<NdArray, 2>(model.head.output.weight.id)
            .is_some());
        assert!(grads
            .get::<NdArray, 4>(model.backbone.conv1.weight.id)
            .is_none());
    }
}
