mod batcher;
mod dataset;
pub mod tokenizer;

pub use batcher::{LanguageModelBatcher, TrainingBatch};
pub use dataset::{BlockDatasetConfig, LanguageModelItem, TextBlockDataset, TrailingText};
pub use tokenizer::{load_tokenizer, Tokenizer};
