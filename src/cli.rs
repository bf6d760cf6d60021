use crate::data::TrailingText;
use crate::training::{LrSchedule, SaveStrategy};
pub use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeviceKind {
    /// ndarray backend on the host CPU
    Cpu,
    /// wgpu backend on the default adapter
    Wgpu,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fine-tune a causal language model on a text file
    Train(TrainCommand),

    /// Generate text using a trained model
    Generate(GenerateCommand),
}

#[derive(Args)]
pub struct TrainCommand {
    /// Text file to train on
    #[arg(short, long, default_value = "estate.txt")]
    pub input: String,

    /// Tokenizer: a hub name, a tokenizer.json, a saved model directory, or "char"
    #[arg(short, long, default_value = "distilgpt2")]
    pub tokenizer: String,

    /// Saved model directory to continue training from; overrides the
    /// tokenizer and architecture flags
    #[arg(long)]
    pub base_model: Option<String>,

    /// Tokens per training example
    #[arg(long, default_value_t = 128)]
    pub block_size: usize,

    /// Characters buffered per example, as a multiple of the block size
    #[arg(long, default_value_t = 10)]
    pub buffer_factor: usize,

    /// What to do with text left in the buffer at end of file
    #[arg(long, value_enum, default_value_t = TrailingText::Drop)]
    pub trailing: TrailingText,

    /// Batch size for training
    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    /// Number of passes over the dataset
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Learning rate
    #[arg(long, default_value_t = 1e-5)]
    pub learning_rate: f64,

    #[arg(long, value_enum, default_value_t = LrSchedule::Linear)]
    pub lr_schedule: LrSchedule,

    /// AdamW weight decay
    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f32,

    /// Gradient norm clipping threshold
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f32,

    /// Log metrics every N steps
    #[arg(long, default_value_t = 10)]
    pub logging_steps: usize,

    #[arg(long, value_enum, default_value_t = SaveStrategy::Epoch)]
    pub save_strategy: SaveStrategy,

    /// Keep at most N checkpoints
    #[arg(long)]
    pub save_total_limit: Option<usize>,

    /// Fraction of examples held out for validation
    #[arg(long, default_value_t = 0.0)]
    pub validation_split: f64,

    /// Shuffle seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Data loader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Exclude padding positions from the loss
    #[arg(long, default_value_t = false)]
    pub ignore_padding_in_loss: bool,

    /// Model embedding dimension
    #[arg(long, default_value_t = 768)]
    pub d_model: usize,

    /// Model feed-forward dimension
    #[arg(long, default_value_t = 3072)]
    pub d_ff: usize,

    /// Number of transformer layers
    #[arg(long, default_value_t = 6)]
    pub n_layer: usize,

    /// Number of attention heads
    #[arg(long, default_value_t = 12)]
    pub n_head: usize,

    /// Dropout rate
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Directory for per-epoch checkpoints
    #[arg(long, default_value = "./slm_cpu_model")]
    pub output_dir: String,

    /// Directory the trained model and tokenizer are saved to
    #[arg(long, default_value = "./my_trained_model")]
    pub model_dir: String,

    #[arg(long, value_enum, default_value_t = DeviceKind::Cpu)]
    pub device: DeviceKind,
}

#[derive(Args)]
pub struct GenerateCommand {
    /// Prompt to start generation with
    #[arg(short, long, default_value = "Once upon a time")]
    pub prompt: String,

    /// Number of tokens to generate
    #[arg(short, long, default_value_t = 100)]
    pub num_tokens: usize,

    /// Temperature for sampling; 0 picks the most likely token
    #[arg(short, long, default_value_t = 0.8)]
    pub temperature: f64,

    /// Directory written by `train`
    #[arg(short, long, default_value = "./my_trained_model")]
    pub model_dir: String,

    #[arg(long, value_enum, default_value_t = DeviceKind::Cpu)]
    pub device: DeviceKind,
}
