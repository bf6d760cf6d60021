#[macro_use]
extern crate derive_new;

use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu};
use burn::data::dataset::Dataset;
use burn::nn::transformer::TransformerEncoderConfig;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod perplexity;
pub mod renderer;
pub mod session;
pub mod training;

use cli::*;
use data::{load_tokenizer, BlockDatasetConfig, TextBlockDataset};
use error::{Error, Result};
use model::{CausalLm, CausalLmConfig};
use session::RunRecord;
use training::TrainingArgs;

type Elem = f32;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("slmtune=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(command) => {
            let record = match command.device {
                DeviceKind::Cpu => train::<Autodiff<NdArray<Elem>>>(&command, NdArrayDevice::Cpu)?,
                DeviceKind::Wgpu => {
                    train::<Autodiff<Wgpu<Elem>>>(&command, WgpuDevice::default())?
                }
            };

            println!("\nTraining completed!");
            println!("{}", "-".repeat(60));
            println!("  Run:          {}", record.get_timestamp());
            println!("  Examples:     {}", record.get_examples());
            println!("  Model saved:  {}", command.model_dir);
            println!("  Checkpoints:  {}", command.output_dir);
            println!("{}", "-".repeat(60));
        }

        Commands::Generate(command) => {
            let generated = match command.device {
                DeviceKind::Cpu => generate::<NdArray<Elem>>(&command, NdArrayDevice::Cpu)?,
                DeviceKind::Wgpu => generate::<Wgpu<Elem>>(&command, WgpuDevice::default())?,
            };
            println!("Generated text:\n{}", generated);
        }
    }
    Ok(())
}

fn train<B: AutodiffBackend>(command: &TrainCommand, device: B::Device) -> Result<RunRecord> {
    let start_time = Instant::now();

    let (model, model_config, tokenizer) = match &command.base_model {
        Some(dir) => {
            let ignore_padding = command.ignore_padding_in_loss;
            let saved = session::load_pretrained::<B>(dir, &device, |config| {
                config.with_ignore_padding_in_loss(ignore_padding)
            })?;
            if saved.config.max_seq_length + 1 < command.block_size {
                return Err(Error::Config(format!(
                    "block size {} exceeds the base model context of {}",
                    command.block_size, saved.config.max_seq_length
                )));
            }
            (saved.model, saved.config, saved.tokenizer)
        }
        None => {
            let tokenizer = load_tokenizer(&command.tokenizer)?;
            let transformer = TransformerEncoderConfig::new(
                command.d_model,
                command.d_ff,
                command.n_head,
                command.n_layer,
            )
            .with_norm_first(true)
            .with_dropout(command.dropout);

            let config = CausalLmConfig::new(
                transformer,
                tokenizer.vocab_size(),
                tokenizer.pad_token(),
                command.block_size,
            )
            .with_ignore_padding_in_loss(command.ignore_padding_in_loss);
            let model: CausalLm<B> = config.init(&device);
            (model, config, tokenizer)
        }
    };

    let dataset_config = BlockDatasetConfig::new()
        .with_block_size(command.block_size)
        .with_buffer_factor(command.buffer_factor)
        .with_trailing(command.trailing);
    let dataset = TextBlockDataset::from_file(&command.input, tokenizer.as_ref(), &dataset_config)?;
    let examples = dataset.len();

    let args = TrainingArgs::new(command.output_dir.clone())
        .with_batch_size(command.batch_size)
        .with_num_epochs(command.epochs)
        .with_learning_rate(command.learning_rate)
        .with_lr_schedule(command.lr_schedule)
        .with_weight_decay(command.weight_decay)
        .with_max_grad_norm(command.max_grad_norm)
        .with_logging_steps(command.logging_steps)
        .with_save_strategy(command.save_strategy)
        .with_save_total_limit(command.save_total_limit)
        .with_validation_split(command.validation_split)
        .with_seed(command.seed)
        .with_num_workers(command.num_workers);

    let trained = training::fine_tune(model, dataset, &args, device)?;

    let mut record = RunRecord::new(&command.input, examples, command.base_model.as_deref(), args);
    record.set_duration(format!("{:.2?}", start_time.elapsed()));
    session::save_pretrained(
        &command.model_dir,
        trained,
        &model_config,
        tokenizer.as_ref(),
        &record,
    )?;

    Ok(record)
}

fn generate<B: Backend>(command: &GenerateCommand, device: B::Device) -> Result<String> {
    let saved = session::load_pretrained::<B>(&command.model_dir, &device, |config| config)?;

    let tokens: Vec<i64> = saved
        .tokenizer
        .encode(&command.prompt, false)?
        .into_iter()
        .map(|x| x as i64)
        .collect();
    if tokens.is_empty() {
        return Err(Error::Config("prompt encodes to no tokens".into()));
    }
    let len = tokens.len();

    let input = Tensor::<B, 2, Int>::from_data(TensorData::new(tokens, [1, len]), &device);
    let output = saved
        .model
        .infer(input, command.num_tokens, command.temperature)?;

    let generated_tokens: Vec<usize> = output
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| Error::Tensor(format!("{err:?}")))?
        .into_iter()
        .map(|x| x as usize)
        .collect();

    saved.tokenizer.decode(&generated_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_train_then_generate_from_saved_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.txt");
        std::fs::write(&input, "the quick brown fox jumps over the lazy dog\n".repeat(40)).unwrap();
        let output_dir = dir.path().join("checkpoints");
        let model_dir = dir.path().join("model");

        let Commands::Train(command) = parse(&[
            "slmtune",
            "train",
            "--input",
            input.to_str().unwrap(),
            "--tokenizer",
            "char",
            "--block-size",
            "8",
            "--epochs",
            "1",
            "--d-model",
            "16",
            "--d-ff",
            "32",
            "--n-layer",
            "1",
            "--n-head",
            "2",
            "--output-dir",
            output_dir.to_str().unwrap(),
            "--model-dir",
            model_dir.to_str().unwrap(),
        ]) else {
            panic!("expected train");
        };

        let record = train::<Autodiff<NdArray<Elem>>>(&command, NdArrayDevice::Cpu).unwrap();
        assert!(record.get_examples() > 0);
        assert!(model_dir.join("run.json").exists());

        let Commands::Generate(command) = parse(&[
            "slmtune",
            "generate",
            "-p",
            "the",
            "-n",
            "5",
            "-t",
            "0",
            "-m",
            model_dir.to_str().unwrap(),
        ]) else {
            panic!("expected generate");
        };

        let text = generate::<NdArray<Elem>>(&command, NdArrayDevice::Cpu).unwrap();
        assert!(text.starts_with("the"));
    }
}
