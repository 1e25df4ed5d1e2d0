//! PlantVillage Transfer Learning CLI
//!
//! Train, evaluate and query the plant disease classifier from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use plantvillage_tl::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use plantvillage_tl::dataset::{ClassCatalog, DatasetStats};
use plantvillage_tl::evaluation::Evaluator;
use plantvillage_tl::inference::{remedy_for, GeminiRemedyClient, Predictor, RemedyConfig};
use plantvillage_tl::model::artifact::{load_descriptors, load_model, BEST_MODEL};
use plantvillage_tl::training::{run_training, TrainingConfig};
use plantvillage_tl::utils::format_duration;
use plantvillage_tl::utils::logging::{init_logging, LogConfig};

/// Plant disease classification with a frozen ResNet-18 and a trainable head
#[derive(Parser, Debug)]
#[command(name = "plantvillage")]
#[command(version)]
#[command(about = "Transfer-learning plant disease classifier built on Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the classification head, save the best model and evaluate it
    Train {
        /// JSON training configuration; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Per-class training folders
        #[arg(long)]
        train_dir: Option<PathBuf>,

        /// Per-class test folders (evaluation is skipped if missing)
        #[arg(long)]
        test_dir: Option<PathBuf>,

        /// Output directory for weights, catalog and reports
        #[arg(short, long)]
        model_dir: Option<PathBuf>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Square input resolution
        #[arg(long)]
        image_size: Option<usize>,

        /// Maximum training images per class
        #[arg(long)]
        max_per_class: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Start from a random trunk instead of the ImageNet weights
        #[arg(long, default_value = "false")]
        no_pretrained: bool,

        /// Disable data augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Write the effective configuration to this file and exit
        #[arg(long)]
        dump_config: Option<PathBuf>,
    },

    /// Evaluate a saved model on a test folder
    Evaluate {
        #[arg(short, long, default_value = "model")]
        model_dir: PathBuf,

        #[arg(short, long, default_value = "data_split/test")]
        test_dir: PathBuf,

        /// Maximum test images per class
        #[arg(long, default_value = "100")]
        max_per_class: usize,

        #[arg(short, long, default_value = "16")]
        batch_size: usize,
    },

    /// Classify one image and look up a remedy
    Predict {
        /// Path to the image
        image: PathBuf,

        #[arg(short, long, default_value = "model")]
        model_dir: PathBuf,

        /// Skip the remedy lookup
        #[arg(long, default_value = "false")]
        no_remedy: bool,
    },

    /// Show per-class image counts of a dataset folder
    Stats {
        #[arg(short, long, default_value = "data_split/train")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            config,
            train_dir,
            test_dir,
            model_dir,
            epochs,
            batch_size,
            learning_rate,
            image_size,
            max_per_class,
            seed,
            no_pretrained,
            no_augmentation,
            dump_config,
        } => {
            let mut training = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => TrainingConfig::default(),
            };

            if let Some(v) = train_dir {
                training.train_dir = v;
            }
            if let Some(v) = test_dir {
                training.test_dir = v;
            }
            if let Some(v) = model_dir {
                training.model_dir = v;
            }
            if let Some(v) = epochs {
                training.epochs = v;
            }
            if let Some(v) = batch_size {
                training.batch_size = v;
            }
            if let Some(v) = learning_rate {
                training.learning_rate = v;
            }
            if let Some(v) = image_size {
                training.image_size = v;
            }
            if let Some(v) = max_per_class {
                training.max_per_class_train = v;
            }
            if let Some(v) = seed {
                training.seed = v;
            }
            if no_pretrained {
                training.pretrained = false;
            }
            if no_augmentation {
                training.augmentation = plantvillage_tl::dataset::AugmentationConfig::none();
            }

            match dump_config {
                Some(path) => {
                    training.save(&path)?;
                    println!("{} {}", "Configuration written to".green(), path.display());
                }
                None => cmd_train(&training)?,
            }
        }

        Commands::Evaluate {
            model_dir,
            test_dir,
            max_per_class,
            batch_size,
        } => cmd_evaluate(&model_dir, &test_dir, max_per_class, batch_size)?,

        Commands::Predict {
            image,
            model_dir,
            no_remedy,
        } => cmd_predict(&image, &model_dir, no_remedy)?,

        Commands::Stats { data_dir } => cmd_stats(&data_dir)?,
    }

    Ok(())
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    let device = default_device();

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Train dir:      {}", config.train_dir.display());
    println!("  Test dir:       {}", config.test_dir.display());
    println!("  Model dir:      {}", config.model_dir.display());
    println!("  Image size:     {}x{}", config.image_size, config.image_size);
    println!("  Epochs:         {}", config.epochs);
    println!("  Batch size:     {}", config.batch_size);
    println!("  Learning rate:  {}", config.learning_rate);
    println!("  Max per class:  {}", config.max_per_class_train);
    println!("  Pretrained:     {}", config.pretrained);
    println!("  Backend:        {}", backend_name());
    println!();

    println!("{}", "Starting Training...".green().bold());
    let start = std::time::Instant::now();

    let report = run_training::<TrainingBackend>(config, &device, true)
        .context("Training did not start or failed")?;

    println!();
    println!("{}", "Training Summary:".cyan().bold());
    println!("  Classes:            {}", report.catalog.len());
    println!("  Training samples:   {}", report.train_samples);
    println!("  Validation samples: {}", report.validation_samples);
    if report.skipped_files > 0 {
        println!(
            "  {} {} unreadable files were skipped",
            "Note:".yellow(),
            report.skipped_files
        );
    }
    println!("  Epochs run:         {}", report.history.len());
    if report.history.stopped_early {
        println!("  {}", "Stopped early on validation loss".yellow());
    }
    if let Some(acc) = report.best_val_accuracy {
        println!("  Best val accuracy:  {:.2}%", acc * 100.0);
    }
    println!("  Best model:         {}", report.best_model.display());
    println!("  Final model:        {}", report.final_model.display());
    println!("  Duration:           {}", format_duration(start.elapsed().as_secs_f64()));

    match &report.test_report {
        Some(test) => {
            println!();
            println!("{}", "Test Set Evaluation:".cyan().bold());
            println!("{}", test.metrics.report());
        }
        None => println!("  {}", "Test evaluation skipped".yellow()),
    }

    Ok(())
}

fn cmd_evaluate(model_dir: &Path, test_dir: &Path, max_per_class: usize, batch_size: usize) -> Result<()> {
    let device = default_device();

    let (metadata, catalog) = load_descriptors(model_dir)?;
    let model = load_model::<DefaultBackend>(&metadata.config, model_dir, BEST_MODEL, &device)?;
    info!("Evaluating {} on {}", BEST_MODEL, test_dir.display());

    let report = Evaluator::new(metadata.config.image_size, batch_size, max_per_class)
        .evaluate_dir(&model, test_dir, &catalog, model_dir, &device)?;

    match report {
        Some(report) => {
            println!("{}", "Test Set Evaluation:".cyan().bold());
            println!("{}", report.metrics.report());
            println!("  Loss: {:.4}", report.loss);
        }
        None => println!("{}", "Nothing to evaluate".yellow()),
    }

    Ok(())
}

fn cmd_predict(image: &Path, model_dir: &Path, no_remedy: bool) -> Result<()> {
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::load(model_dir, &device)?;
    let prediction = predictor.predict_file(image)?;

    println!("{}", "Prediction:".cyan().bold());
    println!(
        "  Class:      {} (of {})",
        prediction.label.green().bold(),
        predictor.catalog().len()
    );
    println!("  Confidence: {:.2}%", prediction.confidence);
    println!("  Time:       {:.1} ms", prediction.inference_time_ms);
    println!();
    println!("{}", "Top classes:".cyan());
    for (i, (label, confidence)) in prediction.top_k.iter().enumerate() {
        println!("  {}. {:<50} {:>6.2}%", i + 1, label, confidence);
    }

    if !no_remedy {
        let client = GeminiRemedyClient::new(RemedyConfig::from_env())?;
        let remedy = remedy_for(&prediction.label, &client);
        println!();
        println!("{}", "Remedy:".cyan().bold());
        println!("{}", remedy);
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        anyhow::bail!("Dataset directory not found: {}", data_dir.display());
    }

    let catalog = ClassCatalog::discover(data_dir)?;
    DatasetStats::scan(data_dir, &catalog).print();

    Ok(())
}
