use super::tokenizer::Tokenizer;
use crate::error::{self, Error};
use burn::config::Config;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One fixed-length causal language modelling example.
///
/// `labels` is a copy of `input_ids`; the shift to next-token targets
/// happens in the batcher.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct LanguageModelItem {
    pub input_ids: Vec<usize>,
    pub attention_mask: Vec<usize>,
    pub labels: Vec<usize>,
}

/// What to do with buffered text left over when the input is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum TrailingText {
    /// Discard it. Text after the last flush never reaches the model.
    Drop,
    /// Emit one final, usually padded, example from it.
    Flush,
}

#[derive(Config)]
pub struct BlockDatasetConfig {
    /// Length in tokens of every example.
    #[config(default = 128)]
    pub block_size: usize,
    /// The buffer is tokenized once it holds more than `block_size * buffer_factor` characters.
    #[config(default = 10)]
    pub buffer_factor: usize,
    #[config(default = "TrailingText::Drop")]
    pub trailing: TrailingText,
}

impl BlockDatasetConfig {
    pub fn threshold(&self) -> usize {
        self.block_size * self.buffer_factor
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.block_size < 2 {
            return Err(Error::Config(format!(
                "block size must be at least 2, got {}",
                self.block_size
            )));
        }
        if self.buffer_factor == 0 {
            return Err(Error::Config("buffer factor must be positive".into()));
        }
        Ok(())
    }
}

/// Blocks of tokenized text read from a plain text file, held in memory.
#[derive(Debug, Default)]
pub struct TextBlockDataset {
    items: Vec<LanguageModelItem>,
}

impl TextBlockDataset {
    pub fn from_file(
        path: impl AsRef<Path>,
        tokenizer: &dyn Tokenizer,
        config: &BlockDatasetConfig,
    ) -> error::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dataset = Self::from_reader(BufReader::new(file), tokenizer, config)?;

        tracing::info!(
            path = %path.display(),
            examples = dataset.len(),
            block_size = config.block_size,
            "built text block dataset"
        );
        Ok(dataset)
    }

    /// Lines end at `\n`, `\r\n` or a lone `\r`.
    pub fn from_reader<R: BufRead>(
        mut reader: R,
        tokenizer: &dyn Tokenizer,
        config: &BlockDatasetConfig,
    ) -> error::Result<Self> {
        config.validate()?;

        let threshold = config.threshold();
        let mut items = Vec::new();
        let mut buffer = String::new();
        // Length of `buffer` in chars, kept alongside to avoid rescanning it.
        let mut buffered_chars = 0;
        let mut raw = String::new();

        loop {
            raw.clear();
            if reader.read_line(&mut raw)? == 0 {
                break;
            }
            let text = raw.strip_suffix('\n').unwrap_or(raw.as_str());
            let text = text.strip_suffix('\r').unwrap_or(text);

            for line in text.split('\r') {
                let line = line.trim();
                buffer.push_str(line);
                buffer.push(' ');
                buffered_chars += line.chars().count() + 1;

                if buffered_chars > threshold {
                    items.push(Self::encode_item(&buffer, tokenizer, config.block_size)?);
                    buffer.clear();
                    buffered_chars = 0;
                }
            }
        }

        match config.trailing {
            TrailingText::Flush if !buffer.is_empty() => {
                items.push(Self::encode_item(&buffer, tokenizer, config.block_size)?);
            }
            _ if !buffer.is_empty() => {
                tracing::debug!(chars = buffered_chars, "dropping trailing text");
            }
            _ => {}
        }

        Ok(Self { items })
    }

    fn encode_item(
        text: &str,
        tokenizer: &dyn Tokenizer,
        block_size: usize,
    ) -> error::Result<LanguageModelItem> {
        let block = tokenizer.encode_block(text, block_size)?;
        let labels = block.input_ids.clone();
        Ok(LanguageModelItem::new(
            block.input_ids,
            block.attention_mask,
            labels,
        ))
    }

    /// Splits off the last `floor(len * validation_ratio)` examples as a held-out set.
    pub fn split(mut self, validation_ratio: f64) -> error::Result<(Self, Self)> {
        if !(0.0..1.0).contains(&validation_ratio) {
            return Err(Error::Config(format!(
                "validation split must be in [0, 1), got {validation_ratio}"
            )));
        }
        let valid_len = (self.items.len() as f64 * validation_ratio).floor() as usize;
        let valid = self.items.split_off(self.items.len() - valid_len);
        Ok((self, Self { items: valid }))
    }
}

impl Dataset<LanguageModelItem> for TextBlockDataset {
    fn get(&self, index: usize) -> Option<LanguageModelItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tokenizer::CharTokenizer;
    use std::io::{Cursor, Write};

    fn lines(count: usize, width: usize) -> String {
        let line = "x".repeat(width);
        (0..count).map(|_| format!("{line}\n")).collect()
    }

    fn build(text: &str, config: &BlockDatasetConfig) -> TextBlockDataset {
        TextBlockDataset::from_reader(Cursor::new(text), &CharTokenizer::default(), config)
            .unwrap()
    }

    #[test]
    fn test_examples_have_block_size_length() {
        let config = BlockDatasetConfig::new().with_block_size(16);
        let dataset = build(&lines(100, 13), &config);

        assert!(!dataset.is_empty());
        for item in dataset.iter() {
            assert_eq!(item.input_ids.len(), 16);
            assert_eq!(item.attention_mask.len(), 16);
            assert_eq!(item.labels.len(), 16);
        }
    }

    #[test]
    fn test_labels_match_inputs() {
        let config = BlockDatasetConfig::new()
            .with_block_size(64)
            .with_trailing(TrailingText::Flush);
        let dataset = build(&lines(50, 40), &config);

        for item in dataset.iter() {
            assert_eq!(item.labels, item.input_ids);
        }
    }

    #[test]
    fn test_short_input_yields_nothing_unless_flushed() {
        // 10 lines of 9 chars + separator = 100 chars, threshold 128 * 10.
        let text = lines(10, 9);

        let dropped = build(&text, &BlockDatasetConfig::new());
        assert_eq!(dropped.len(), 0);

        let flushed = build(&text, &BlockDatasetConfig::new().with_trailing(TrailingText::Flush));
        assert_eq!(flushed.len(), 1);
        let item = flushed.get(0).unwrap();
        assert_eq!(item.attention_mask.iter().sum::<usize>(), 100);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let flushed = build("", &BlockDatasetConfig::new().with_trailing(TrailingText::Flush));
        assert_eq!(flushed.len(), 0);
    }

    #[test]
    fn test_two_hundred_lines_of_thirty_chars() {
        // 29 chars + separator: the 43rd line pushes the buffer to 1290 > 1280.
        let text = lines(200, 29);

        let dropped = build(&text, &BlockDatasetConfig::new());
        assert_eq!(dropped.len(), 4);

        let flushed = build(&text, &BlockDatasetConfig::new().with_trailing(TrailingText::Flush));
        assert_eq!(flushed.len(), 5);
        let last = flushed.get(4).unwrap();
        assert_eq!(last.attention_mask, vec![1; 128]);
    }

    #[test]
    fn test_concatenated_inputs_add_up() {
        // Threshold 40: five lines of 9 chars flush exactly on the last line.
        let config = BlockDatasetConfig::new().with_block_size(4);
        let first = lines(5, 9);
        let second = lines(10, 9);

        let a = build(&first, &config).len();
        let b = build(&second, &config).len();
        let both = build(&format!("{first}{second}"), &config).len();

        assert_eq!((a, b), (1, 2));
        assert_eq!(both, a + b);
    }

    #[test]
    fn test_lines_are_trimmed_and_space_separated() {
        let config = BlockDatasetConfig::new()
            .with_block_size(16)
            .with_trailing(TrailingText::Flush);
        let dataset = build("  ab  \r\n\tcd\nef\n", &config);

        let tokenizer = CharTokenizer::default();
        let item = dataset.get(0).unwrap();
        assert_eq!(tokenizer.decode(&item.input_ids).unwrap(), "ab cd ef ");
    }

    #[test]
    fn test_carriage_returns_end_lines() {
        let config = BlockDatasetConfig::new()
            .with_block_size(16)
            .with_trailing(TrailingText::Flush);
        let tokenizer = CharTokenizer::default();

        let item = build("ab\rcd\r\nef\r", &config).get(0).unwrap();
        assert_eq!(tokenizer.decode(&item.input_ids).unwrap(), "ab cd ef ");

        // Two separators in a row make an empty line, which still adds a space.
        let item = build("ab\r\rcd", &config).get(0).unwrap();
        assert_eq!(tokenizer.decode(&item.input_ids).unwrap(), "ab  cd ");
    }

    #[test]
    fn test_config_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        let config = BlockDatasetConfig::new()
            .with_block_size(64)
            .with_trailing(TrailingText::Flush);

        config.save(&path).unwrap();
        let loaded = BlockDatasetConfig::load(&path).unwrap();
        assert_eq!(loaded.block_size, 64);
        assert_eq!(loaded.buffer_factor, 10);
        assert_eq!(loaded.trailing, TrailingText::Flush);
    }

    #[test]
    fn test_rejects_tiny_block_size() {
        let result = TextBlockDataset::from_reader(
            Cursor::new("text"),
            &CharTokenizer::default(),
            &BlockDatasetConfig::new().with_block_size(1),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TextBlockDataset::from_file(
            dir.path().join("absent.txt"),
            &CharTokenizer::default(),
            &BlockDatasetConfig::new(),
        );
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'o', b'k', b'\n', 0xff, 0xfe, b'\n']).unwrap();

        let result = TextBlockDataset::from_file(
            file.path(),
            &CharTokenizer::default(),
            &BlockDatasetConfig::new(),
        );
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_split_takes_validation_from_the_tail() {
        let config = BlockDatasetConfig::new().with_block_size(4);
        let dataset = build(&lines(50, 9), &config);
        assert_eq!(dataset.len(), 10);
        let last = dataset.get(9).unwrap();

        let (train, valid) = dataset.split(0.25).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 2);
        assert_eq!(valid.get(1).unwrap(), last);

        let (train, valid) = build(&lines(50, 9), &config).split(0.0).unwrap();
        assert_eq!((train.len(), valid.len()), (10, 0));
    }
}
