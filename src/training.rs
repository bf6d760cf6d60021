use crate::data::{LanguageModelBatcher, TextBlockDataset};
use crate::error::{self, Error};
use crate::model::CausalLm;
use crate::perplexity::PerplexityMetric;
use crate::renderer::StepLogRenderer;
use burn::{
    config::Config,
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    grad_clipping::GradientClippingConfig,
    lr_scheduler::linear::LinearLrSchedulerConfig,
    module::Module,
    optim::AdamWConfig,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{checkpoint::KeepLastNCheckpoints, metric::LossMetric, LearnerBuilder},
};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SaveStrategy {
    /// No intermediate checkpoints.
    No,
    /// A checkpoint at the end of every epoch.
    Epoch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum LrSchedule {
    /// Decay linearly from the initial rate to zero over the whole run.
    Linear,
    Constant,
}

#[derive(Config)]
pub struct TrainingArgs {
    /// Where the learner keeps checkpoints.
    pub output_dir: String,
    #[config(default = 4)]
    pub batch_size: usize,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 1e-5)]
    pub learning_rate: f64,
    #[config(default = "LrSchedule::Linear")]
    pub lr_schedule: LrSchedule,
    #[config(default = 0.0)]
    pub weight_decay: f32,
    #[config(default = 1.0)]
    pub max_grad_norm: f32,
    /// Log metrics every this many optimizer steps; 0 disables step logs.
    #[config(default = 10)]
    pub logging_steps: usize,
    #[config(default = "SaveStrategy::Epoch")]
    pub save_strategy: SaveStrategy,
    /// Keep only this many epoch checkpoints; all of them when unset.
    pub save_total_limit: Option<usize>,
    /// Fraction of examples held out for validation.
    #[config(default = 0.0)]
    pub validation_split: f64,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1)]
    pub num_workers: usize,
}

impl TrainingArgs {
    pub fn validate(&self) -> error::Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".into()));
        }
        if self.num_epochs == 0 {
            return Err(Error::Config("epoch count must be positive".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(Error::Config(format!(
                "learning rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if self.save_total_limit == Some(0) {
            return Err(Error::Config("save total limit must be positive".into()));
        }
        Ok(())
    }

    /// Optimizer steps over the whole run.
    pub fn total_steps(&self, train_len: usize) -> usize {
        (train_len.div_ceil(self.batch_size) * self.num_epochs).max(1)
    }
}

/// Runs the learner over `dataset` and returns the trained model.
pub fn fine_tune<B: AutodiffBackend>(
    model: CausalLm<B>,
    dataset: TextBlockDataset,
    args: &TrainingArgs,
    device: B::Device,
) -> error::Result<CausalLm<B>> {
    args.validate()?;
    fs::create_dir_all(&args.output_dir)?;
    args.save(format!("{}/training_args.json", args.output_dir))?;

    let (dataset_train, dataset_valid) = dataset.split(args.validation_split)?;
    if dataset_train.is_empty() {
        return Err(Error::EmptyDataset(
            "the training split; the input may be shorter than one buffer threshold".into(),
        ));
    }

    let total_steps = args.total_steps(dataset_train.len());
    tracing::info!(
        train_examples = dataset_train.len(),
        valid_examples = dataset_valid.len(),
        epochs = args.num_epochs,
        batch_size = args.batch_size,
        total_steps,
        parameters = model.num_params(),
        "starting fine-tuning"
    );

    let batcher_train = LanguageModelBatcher::<B>::new(device.clone());
    let batcher_valid = LanguageModelBatcher::<B::InnerBackend>::new(device.clone());

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(args.batch_size)
        .shuffle(args.seed)
        .num_workers(args.num_workers)
        .build(dataset_train);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(args.batch_size)
        .num_workers(args.num_workers)
        .build(dataset_valid);

    let optimizer = AdamWConfig::new()
        .with_weight_decay(args.weight_decay)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(args.max_grad_norm)))
        .init();

    let final_lr = match args.lr_schedule {
        LrSchedule::Linear => 0.0,
        LrSchedule::Constant => args.learning_rate,
    };
    let lr_scheduler =
        LinearLrSchedulerConfig::new(args.learning_rate, final_lr, total_steps).init();

    let mut builder = LearnerBuilder::new(&args.output_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(PerplexityMetric::default())
        .metric_valid_numeric(PerplexityMetric::default())
        .with_application_logger(None)
        .renderer(StepLogRenderer::new(args.logging_steps))
        .devices(vec![device])
        .num_epochs(args.num_epochs)
        .summary();

    if args.save_strategy == SaveStrategy::Epoch {
        builder = builder
            .with_file_checkpointer(CompactRecorder::new())
            .with_checkpointing_strategy(KeepLastNCheckpoints::new(
                args.save_total_limit.unwrap_or(usize::MAX),
            ));
    }

    let learner = builder.build(model, optimizer, lr_scheduler);
    let trained = learner.fit(dataloader_train, dataloader_valid);

    tracing::info!("fine-tuning finished");
    Ok(trained)
}
