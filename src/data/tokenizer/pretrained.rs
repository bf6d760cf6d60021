use super::{tokenizer_error, Tokenizer, TokenizerMeta, TOKENIZER_FILE};
use crate::error::{Error, Result};
use std::path::Path;

const END_OF_TEXT: &str = "<|endoftext|>";

/// A Hugging Face `tokenizer.json` vocabulary (GPT-2 style byte-level BPE).
///
/// GPT-2 ships without a pad token, so the end-of-text token is reused for
/// padding.
pub struct PretrainedTokenizer {
    tokenizer: tokenizers::Tokenizer,
    pad_token: usize,
}

impl PretrainedTokenizer {
    pub const CLASS: &'static str = "pretrained";

    pub fn from_pretrained(name: &str) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_pretrained(name, None).map_err(tokenizer_error)?;
        Self::new(tokenizer)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = tokenizers::Tokenizer::from_file(path)
            .map_err(|err| Error::Tokenizer(format!("{}: {err}", path.display())))?;
        Self::new(tokenizer)
    }

    pub fn new(tokenizer: tokenizers::Tokenizer) -> Result<Self> {
        let pad_token = tokenizer
            .token_to_id(END_OF_TEXT)
            .ok_or_else(|| Error::Tokenizer(format!("vocabulary has no {END_OF_TEXT} token")))?;

        Ok(Self {
            tokenizer,
            pad_token: pad_token as usize,
        })
    }
}

impl Tokenizer for PretrainedTokenizer {
    fn encode(&self, value: &str, special_tokens: bool) -> Result<Vec<usize>> {
        let encoding = self
            .tokenizer
            .encode(value, special_tokens)
            .map_err(tokenizer_error)?;

        Ok(encoding.get_ids().iter().map(|&id| id as usize).collect())
    }

    fn decode(&self, tokens: &[usize]) -> Result<String> {
        let ids: Vec<u32> = tokens.iter().map(|&id| id as u32).collect();
        self.tokenizer.decode(&ids, true).map_err(tokenizer_error)
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    fn pad_token(&self) -> usize {
        self.pad_token
    }

    fn save(&self, dir: &Path) -> Result<()> {
        TokenizerMeta {
            tokenizer_class: Self::CLASS.to_string(),
            pad_token: Some(END_OF_TEXT.to_string()),
            eos_token: Some(END_OF_TEXT.to_string()),
        }
        .save(dir)?;

        self.tokenizer
            .save(dir.join(TOKENIZER_FILE), true)
            .map_err(tokenizer_error)
    }
}
