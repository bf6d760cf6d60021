mod character;
mod pretrained;

pub use character::CharTokenizer;
pub use pretrained::PretrainedTokenizer;
#[cfg(test)]
pub(crate) use pretrained::tests::word_level_tokenizer;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// Token ids and attention mask of one block, both `block_size` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    pub input_ids: Vec<usize>,
    pub attention_mask: Vec<usize>,
}

pub trait Tokenizer: Send + Sync {
    fn encode(&self, value: &str, special_tokens: bool) -> Result<Vec<usize>>;
    fn decode(&self, tokens: &[usize]) -> Result<String>;
    fn vocab_size(&self) -> usize;
    fn pad_token(&self) -> usize;

    /// Writes whatever is needed to rebuild this tokenizer with [`load_tokenizer`].
    fn save(&self, dir: &Path) -> Result<()>;

    /// Encodes `value` truncated and right-padded to exactly `block_size` tokens.
    fn encode_block(&self, value: &str, block_size: usize) -> Result<EncodedBlock> {
        let mut input_ids = self.encode(value, false)?;
        input_ids.truncate(block_size);

        let mut attention_mask = vec![1; input_ids.len()];
        attention_mask.resize(block_size, 0);
        input_ids.resize(block_size, self.pad_token());

        Ok(EncodedBlock {
            input_ids,
            attention_mask,
        })
    }
}

/// Contents of `tokenizer_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerMeta {
    pub tokenizer_class: String,
    pub pad_token: Option<String>,
    pub eos_token: Option<String>,
}

impl TokenizerMeta {
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(TOKENIZER_CONFIG_FILE), content)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(dir.join(TOKENIZER_CONFIG_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Resolves a tokenizer source.
///
/// `char` selects the built-in character vocabulary, a directory is read as
/// the output of [`Tokenizer::save`], a file as a `tokenizer.json`, and
/// anything else is fetched from the Hugging Face hub by name.
pub fn load_tokenizer(source: &str) -> Result<Arc<dyn Tokenizer>> {
    if source == CharTokenizer::CLASS {
        return Ok(Arc::new(CharTokenizer::default()));
    }

    let path = Path::new(source);
    if path.is_dir() {
        let meta = TokenizerMeta::load(path)?;
        if meta.tokenizer_class == CharTokenizer::CLASS {
            return Ok(Arc::new(CharTokenizer::default()));
        }
        let tokenizer = PretrainedTokenizer::from_file(path.join(TOKENIZER_FILE))?;
        return Ok(Arc::new(tokenizer));
    }
    if path.is_file() {
        return Ok(Arc::new(PretrainedTokenizer::from_file(path)?));
    }

    tracing::info!(name = source, "fetching tokenizer from the hub");
    Ok(Arc::new(PretrainedTokenizer::from_pretrained(source)?))
}

pub(crate) fn tokenizer_error(err: impl std::fmt::Display) -> Error {
    Error::Tokenizer(err.to_string())
}
