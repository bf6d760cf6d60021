use crate::data::tokenizer::{load_tokenizer, Tokenizer};
use crate::error::{Error, Result};
use crate::model::{CausalLm, CausalLmConfig};
use crate::training::TrainingArgs;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::CompactRecorder;
use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MODEL_FILE: &str = "model";
const CONFIG_FILE: &str = "config.json";
const RUN_FILE: &str = "run.json";

/// What produced a saved model, written next to its weights.
#[derive(Serialize, Deserialize)]
pub struct RunRecord {
    timestamp: String,
    input: String,
    examples: usize,
    base_model: Option<String>,
    training_duration: Option<String>,
    args: TrainingArgs,
}

impl RunRecord {
    pub fn new(input: &str, examples: usize, base_model: Option<&str>, args: TrainingArgs) -> Self {
        Self {
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            input: input.to_string(),
            examples,
            base_model: base_model.map(str::to_string),
            training_duration: None,
            args,
        }
    }

    pub fn set_duration(&mut self, duration: String) {
        self.training_duration = Some(duration);
    }

    pub fn get_timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn get_examples(&self) -> usize {
        self.examples
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(dir.join(RUN_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Model, config and tokenizer read back from a directory.
pub struct SavedModel<B: Backend> {
    pub model: CausalLm<B>,
    pub config: CausalLmConfig,
    pub tokenizer: Arc<dyn Tokenizer>,
}

pub fn model_path(dir: &Path) -> PathBuf {
    dir.join(MODEL_FILE)
}

/// Writes weights, model config, tokenizer and run record into `dir`,
/// replacing files of the same name.
pub fn save_pretrained<B: Backend>(
    dir: impl AsRef<Path>,
    model: CausalLm<B>,
    config: &CausalLmConfig,
    tokenizer: &dyn Tokenizer,
    record: &RunRecord,
) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    model
        .save_file(model_path(dir), &CompactRecorder::new())
        .map_err(|err| Error::Record(format!("{err:?}")))?;
    config.save(dir.join(CONFIG_FILE))?;
    tokenizer.save(dir)?;
    fs::write(dir.join(RUN_FILE), serde_json::to_string_pretty(record)?)?;

    tracing::info!(dir = %dir.display(), "saved model and tokenizer");
    Ok(())
}

/// Reads what [`save_pretrained`] wrote. `configure` may adjust the config
/// before the model is built; weights are loaded afterwards.
pub fn load_pretrained<B: Backend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
    configure: impl FnOnce(CausalLmConfig) -> CausalLmConfig,
) -> Result<SavedModel<B>> {
    let dir = dir.as_ref();

    let config = CausalLmConfig::load(dir.join(CONFIG_FILE))
        .map_err(|err| Error::Config(format!("{}: {err:?}", dir.join(CONFIG_FILE).display())))?;
    let config = configure(config);

    let tokenizer = load_tokenizer(&dir.to_string_lossy())?;
    if tokenizer.vocab_size() != config.vocab_size {
        return Err(Error::VocabMismatch {
            model: config.vocab_size,
            tokenizer: tokenizer.vocab_size(),
        });
    }

    let model = config
        .init::<B>(device)
        .load_file(model_path(dir), &CompactRecorder::new(), device)
        .map_err(|err| Error::Record(format!("{err:?}")))?;

    tracing::info!(dir = %dir.display(), parameters = model.num_params(), "loaded model");
    Ok(SavedModel {
        model,
        config,
        tokenizer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tokenizer::{word_level_tokenizer, CharTokenizer};
    use crate::model::tests::tiny_config;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::{Int, Tensor, TensorData};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let tokenizer = CharTokenizer::default();
        let config = tiny_config(tokenizer.vocab_size(), tokenizer.pad_token());
        let model = config.init::<TestBackend>(&device);

        let args = TrainingArgs::new("checkpoints".into());
        let mut record = RunRecord::new("estate.txt", 3, None, args);
        record.set_duration("1.00s".into());

        let prompt = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![5i64, 6, 7], [1, 3]),
            &device,
        );
        let expected: Vec<i64> = model
            .infer(prompt.clone(), 5, 0.0)
            .unwrap()
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();

        save_pretrained(dir.path(), model, &config, &tokenizer, &record).unwrap();
        for file in ["model.mpk", "config.json", "tokenizer_config.json", "run.json"] {
            assert!(dir.path().join(file).exists(), "missing {file}");
        }

        let saved = load_pretrained::<TestBackend>(dir.path(), &device, |c| c).unwrap();
        assert_eq!(saved.config.vocab_size, tokenizer.vocab_size());
        let actual: Vec<i64> = saved
            .model
            .infer(prompt, 5, 0.0)
            .unwrap()
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(actual, expected);

        let record = RunRecord::load(dir.path()).unwrap();
        assert_eq!(record.get_examples(), 3);
        assert_eq!(record.args.batch_size, 4);
    }

    #[test]
    fn test_round_trip_with_pretrained_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let tokenizer = word_level_tokenizer();
        let config = tiny_config(tokenizer.vocab_size(), tokenizer.pad_token());
        let model = config.init::<TestBackend>(&device);
        let record = RunRecord::new("estate.txt", 1, None, TrainingArgs::new("out".into()));

        save_pretrained(dir.path(), model, &config, &tokenizer, &record).unwrap();
        assert!(dir.path().join("tokenizer.json").exists());

        let saved = load_pretrained::<TestBackend>(dir.path(), &device, |c| c).unwrap();
        assert_eq!(saved.config.pad_token, tokenizer.pad_token());
        assert_eq!(saved.tokenizer.vocab_size(), tokenizer.vocab_size());
        assert_eq!(
            saved.tokenizer.encode("the cat sat", false).unwrap(),
            tokenizer.encode("the cat sat", false).unwrap()
        );
    }

    #[test]
    fn test_vocab_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let tokenizer = CharTokenizer::default();
        let config = tiny_config(tokenizer.vocab_size() + 1, tokenizer.pad_token());
        let model = config.init::<TestBackend>(&device);
        let record = RunRecord::new("x.txt", 0, None, TrainingArgs::new("out".into()));

        save_pretrained(dir.path(), model, &config, &tokenizer, &record).unwrap();
        let result = load_pretrained::<TestBackend>(dir.path(), &device, |c| c);
        assert!(matches!(result, Err(Error::VocabMismatch { .. })));
    }
}
