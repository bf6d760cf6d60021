use super::{Tokenizer, TokenizerMeta};
use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;

/// Printable ASCII plus newline, with start, end and pad tokens appended.
///
/// Needs no download, which makes it handy for smoke runs and tests.
pub struct CharTokenizer {
    char_to_id: HashMap<char, usize>,
    id_to_char: HashMap<usize, char>,
    vocab_size: usize,
}

impl CharTokenizer {
    pub const CLASS: &'static str = "char";

    pub fn start_token(&self) -> usize {
        self.vocab_size - 3
    }

    pub fn end_token(&self) -> usize {
        self.vocab_size - 2
    }
}

impl Default for CharTokenizer {
    fn default() -> Self {
        let mut chars: Vec<char> = (32..127).map(|i| i as u8 as char).collect();
        chars.push('\n');

        let char_to_id: HashMap<char, usize> =
            chars.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        let id_to_char: HashMap<usize, char> =
            chars.iter().enumerate().map(|(i, &c)| (i, c)).collect();

        // [START], [END], [PAD]
        let vocab_size = chars.len() + 3;

        Self {
            char_to_id,
            id_to_char,
            vocab_size,
        }
    }
}

impl Tokenizer for CharTokenizer {
    fn encode(&self, value: &str, special_tokens: bool) -> Result<Vec<usize>> {
        let mut tokens = Vec::with_capacity(value.len() + 2);

        if special_tokens {
            tokens.push(self.start_token());
        }

        // Characters outside the vocabulary collapse onto the pad token.
        tokens.extend(
            value
                .chars()
                .map(|c| *self.char_to_id.get(&c).unwrap_or(&self.pad_token())),
        );

        if special_tokens {
            tokens.push(self.end_token());
        }

        Ok(tokens)
    }

    fn decode(&self, tokens: &[usize]) -> Result<String> {
        Ok(tokens
            .iter()
            .filter_map(|&id| {
                if id >= self.vocab_size - 3 {
                    None
                } else {
                    self.id_to_char.get(&id).copied()
                }
            })
            .collect())
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn pad_token(&self) -> usize {
        self.vocab_size - 1
    }

    fn save(&self, dir: &Path) -> Result<()> {
        TokenizerMeta {
            tokenizer_class: Self::CLASS.to_string(),
            pad_token: Some("[PAD]".to_string()),
            eos_token: Some("[END]".to_string()),
        }
        .save(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_tokenizer() {
        let tokenizer = CharTokenizer::default();

        let text = "Hello, World!";
        let tokens = tokenizer.encode(text, false).unwrap();
        assert_eq!(tokens.len(), text.len());
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);

        let tokens = tokenizer.encode(text, true).unwrap();
        assert_eq!(tokens[0], tokenizer.start_token());
        assert_eq!(tokens[tokens.len() - 1], tokenizer.end_token());
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);

        assert_eq!(tokenizer.vocab_size(), 99);
    }

    #[test]
    fn test_unknown_chars_map_to_pad() {
        let tokenizer = CharTokenizer::default();
        let tokens = tokenizer.encode("é", false).unwrap();
        assert_eq!(tokens, vec![tokenizer.pad_token()]);
    }
}
