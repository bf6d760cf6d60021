use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record error: {0}")]
    Record(String),

    #[error("Tensor data error: {0}")]
    Tensor(String),

    #[error("Vocabulary mismatch: model expects {model} tokens, tokenizer provides {tokenizer}")]
    VocabMismatch { model: usize, tokenizer: usize },

    #[error("No training examples were produced from {0}")]
    EmptyDataset(String),
}

pub type Result<T> = std::result::Result<T, Error>;
