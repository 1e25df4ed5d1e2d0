//! Head-only training loop with validation and callbacks
//!
//! Every epoch draws `max(1, n_train / batch_size)` augmented batches from an
//! endless shuffled stream, updates the classification head with Adam, then
//! runs an un-augmented validation pass on the inner backend. The callbacks
//! in [`super::callbacks`] and the plateau scheduler consume the validation
//! metrics.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use tracing::{debug, info};

use crate::dataset::burn_dataset::{AugmentingBatcher, PlantBatch, PlantBatcher, SampleDataset};
use crate::dataset::stream::BatchStream;
use crate::model::backbone::ResNetBackbone;
use crate::model::classifier::PlantClassifier;
use crate::training::callbacks::{BestCheckpoint, EarlyStopping, StopDecision};
use crate::training::config::TrainingConfig;
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::training::scheduler::{PlateauMode, ReduceOnPlateauState};
use crate::utils::error::{PlantError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::RunningAverage;

/// Result of [`Trainer::fit`]
pub struct TrainOutcome<B: AutodiffBackend> {
    /// Weights at the end of the run (best val-loss weights after an early stop)
    pub model: PlantClassifier<B>,
    pub history: TrainingHistory,
    /// Accuracy stored in the best-model file
    pub best_val_accuracy: Option<f64>,
}

/// Number of optimizer steps in one epoch
pub fn steps_per_epoch(train_len: usize, batch_size: usize) -> usize {
    (train_len / batch_size.max(1)).max(1)
}

/// Number of correct arg-max predictions in a batch
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let correct: i64 = logits
        .argmax(1)
        .squeeze::<1>(1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// Mean loss and accuracy of `model` over `dataset`, without augmentation
pub fn validate<B: Backend>(
    model: &PlantClassifier<B>,
    dataset: &SampleDataset,
    batch_size: usize,
    image_size: usize,
    device: &B::Device,
) -> (f64, f64) {
    let batcher = PlantBatcher::new(image_size);
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut loss = RunningAverage::new();
    let mut correct = 0usize;

    let indices: Vec<usize> = (0..dataset.len()).collect();
    for chunk in indices.chunks(batch_size.max(1)) {
        let batch: PlantBatch<B> = batcher.batch(dataset.gather(chunk), device);
        let output = model.forward(batch.images);

        let batch_loss: f64 = loss_fn
            .forward(output.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        loss.add_batch(batch_loss, chunk.len());
        correct += count_correct(output, batch.targets);
    }

    let accuracy = if dataset.is_empty() {
        0.0
    } else {
        correct as f64 / dataset.len() as f64
    };

    (loss.average(), accuracy)
}

/// Fits the classification head of a [`PlantClassifier`]
pub struct Trainer<B: AutodiffBackend> {
    model: PlantClassifier<B>,
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: PlantClassifier<B>, config: TrainingConfig, device: B::Device) -> Self {
        Self {
            model,
            config,
            device,
        }
    }

    pub fn model(&self) -> &PlantClassifier<B> {
        &self.model
    }

    /// Run the epoch loop until the epoch budget is spent or early stopping fires.
    ///
    /// The best-accuracy weights are written to `config.model_dir` as they
    /// appear.
    pub fn fit(mut self, train: &SampleDataset, valid: &SampleDataset) -> Result<TrainOutcome<B>> {
        if train.is_empty() {
            return Err(PlantError::Training("training set is empty".into()));
        }
        if valid.is_empty() {
            return Err(PlantError::Training("validation set is empty".into()));
        }

        std::fs::create_dir_all(&self.config.model_dir)?;

        let config = self.config.clone();
        let steps = steps_per_epoch(train.len(), config.batch_size);

        info!(
            "Training on {} samples, validating on {} ({} steps/epoch, batch size {})",
            train.len(),
            valid.len(),
            steps,
            config.batch_size
        );

        let mut stream = BatchStream::new(train.len(), config.batch_size, config.seed);
        let batcher =
            AugmentingBatcher::new(config.image_size, config.augmentation.clone(), config.seed);
        let extractor = self.model.frozen_backbone();
        let mut optimizer = AdamConfig::new().init::<B, PlantClassifier<B>>();

        let mut checkpoint = BestCheckpoint::new(&config.model_dir);
        let mut early_stopping = EarlyStopping::new(config.early_stopping_patience);
        let mut plateau = ReduceOnPlateauState::new(
            config.learning_rate,
            config.lr_factor,
            config.lr_patience,
            config.min_lr,
            PlateauMode::Min,
        );
        let mut logger = TrainingLogger::new(config.epochs);
        let mut history = TrainingHistory::new();

        for epoch in 0..config.epochs {
            logger.start_epoch(epoch);
            let lr = plateau.get_lr();

            let (train_loss, train_accuracy) =
                self.train_epoch(&mut optimizer, &extractor, &mut stream, &batcher, train, steps, lr);

            let (val_loss, val_accuracy) = validate(
                &self.model.valid(),
                valid,
                config.batch_size,
                config.image_size,
                &self.device,
            );

            logger.end_epoch(train_loss, train_accuracy, val_loss, val_accuracy, lr);
            history.push(EpochRecord {
                epoch: epoch + 1,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
                learning_rate: lr,
            });

            if checkpoint.update(epoch, val_accuracy, &self.model)? {
                logger.log_new_best(val_accuracy);
            }

            let decision = early_stopping.update(epoch, val_loss, &self.model);

            let next_lr = plateau.step(val_loss);
            if next_lr < lr {
                logger.log_lr_reduced(lr, next_lr);
            }

            if decision == StopDecision::Stop {
                logger.log_early_stop(early_stopping.patience(), early_stopping.best_epoch());
                if let Some(best) = early_stopping.take_best() {
                    self.model = best;
                }
                history.stopped_early = true;
                break;
            }
        }

        history.best_epoch = checkpoint.best_epoch().map(|e| e + 1);
        let best_val_accuracy = checkpoint.best();
        logger.log_complete(history.len(), best_val_accuracy.unwrap_or(0.0));

        Ok(TrainOutcome {
            model: self.model,
            history,
            best_val_accuracy,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn train_epoch<O>(
        &mut self,
        optimizer: &mut O,
        extractor: &ResNetBackbone<B::InnerBackend>,
        stream: &mut BatchStream,
        batcher: &AugmentingBatcher,
        train: &SampleDataset,
        steps: usize,
        lr: f64,
    ) -> (f64, f64)
    where
        O: Optimizer<PlantClassifier<B>, B>,
    {
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut loss_avg = RunningAverage::new();
        let mut correct = 0usize;
        let mut total = 0usize;

        for (step, indices) in stream.by_ref().take(steps).enumerate() {
            let batch: PlantBatch<B> = batcher.batch(train.gather(&indices), &self.device);
            let batch_size = indices.len();

            let output = self.model.forward_frozen(extractor, batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            loss_avg.add_batch(loss_value, batch_size);
            correct += count_correct(output, batch.targets);
            total += batch_size;

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = optimizer.step(lr, self.model.clone(), grads);

            if (step + 1) % 10 == 0 || step + 1 == steps {
                debug!(
                    "  Batch {}/{}: loss = {:.4}, acc = {:.2}%",
                    step + 1,
                    steps,
                    loss_value,
                    100.0 * correct as f64 / total.max(1) as f64
                );
            }
        }

        let accuracy = correct as f64 / total.max(1) as f64;
        (loss_avg.average(), accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use crate::dataset::loader::ImageSample;
    use crate::model::artifact::{model_file, BEST_MODEL};
    use crate::model::classifier::PlantClassifierConfig;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};

    type TestBackend = Autodiff<NdArray>;

    fn samples(n_per_class: usize, size: u32) -> SampleDataset {
        let mut samples = Vec::new();
        for label in 0..2 {
            let value = if label == 0 { 30 } else { 220 };
            for i in 0..n_per_class {
                samples.push(ImageSample {
                    path: PathBuf::from(format!("{}_{}.png", label, i)),
                    label,
                    image: RgbImage::from_pixel(size, size, Rgb([value, value / 2, value])),
                });
            }
        }
        SampleDataset::new(samples)
    }

    fn small_config(dir: &Path) -> TrainingConfig {
        TrainingConfig {
            model_dir: dir.to_path_buf(),
            image_size: 32,
            batch_size: 4,
            epochs: 2,
            pretrained: false,
            augmentation: AugmentationConfig::none(),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_steps_per_epoch() {
        assert_eq!(steps_per_epoch(80, 16), 5);
        assert_eq!(steps_per_epoch(81, 16), 5);
        assert_eq!(steps_per_epoch(3, 16), 1);
    }

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<NdArray, 2>::from_floats([[2.0, 1.0], [0.0, 3.0], [5.0, 0.0]], &device);
        let targets = Tensor::<NdArray, 1, Int>::from_ints([0, 1, 1], &device);
        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_validate_range() {
        let device = Default::default();
        let model = PlantClassifierConfig::new(2).init::<NdArray>(&device);
        let (loss, accuracy) = validate(&model, &samples(3, 32), 4, 32, &device);
        assert!(loss.is_finite() && loss > 0.0);
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_fit_records_history_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = small_config(dir.path());
        let model = config.model_config(2).init::<TestBackend>(&device);

        let outcome = Trainer::new(model, config, device)
            .fit(&samples(6, 32), &samples(2, 32))
            .unwrap();

        assert!(!outcome.history.is_empty());
        assert!(outcome.history.len() <= 2);
        assert!(outcome.best_val_accuracy.is_some());
        assert!(model_file(dir.path(), BEST_MODEL).exists());
        assert_eq!(outcome.model.output_width(), 2);
    }

    #[test]
    fn test_fit_rejects_empty_sets() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = small_config(dir.path());
        let model = config.model_config(2).init::<TestBackend>(&device);

        let result = Trainer::new(model, config, device).fit(&SampleDataset::default(), &samples(1, 32));
        assert!(matches!(result, Err(PlantError::Training(_))));
    }

    #[test]
    fn test_plateau_stops_early_and_halves_lr() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        // Below f32 precision: Adam steps leave the weights untouched, so the
        // validation loss is identical every epoch
        let config = TrainingConfig {
            epochs: 10,
            learning_rate: 1e-200,
            min_lr: 0.0,
            early_stopping_patience: 3,
            lr_patience: 2,
            lr_factor: 0.5,
            ..small_config(dir.path())
        };
        let model = config.model_config(2).init::<TestBackend>(&device);
        let input = Tensor::<NdArray, 4>::ones([1, 3, 32, 32], &device);
        let before = model.valid().forward_probs(input.clone()).into_data();

        let outcome = Trainer::new(model, config, device)
            .fit(&samples(6, 32), &samples(2, 32))
            .unwrap();
        let history = &outcome.history;

        assert!(history.stopped_early);
        assert_eq!(history.len(), 4);
        assert_eq!(history.best_epoch, Some(1));

        let lrs: Vec<f64> = history.epochs.iter().map(|e| e.learning_rate).collect();
        assert_eq!(&lrs[..3], &[1e-200; 3]);
        assert_eq!(lrs[3], 1e-200 * 0.5);

        let losses: Vec<f64> = history.epochs.iter().map(|e| e.val_loss).collect();
        assert!(losses.iter().all(|&l| l == losses[0]));

        let after = outcome.model.valid().forward_probs(input).into_data();
        after.assert_eq(&before, true);
    }
}
