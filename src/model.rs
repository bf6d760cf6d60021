use crate::data::TrainingBatch;
use crate::error::{self, Error};
use burn::{
    nn::{
        attention::generate_autoregressive_mask,
        loss::CrossEntropyLossConfig,
        transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput},
        Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::softmax,
    tensor::backend::AutodiffBackend,
    tensor::TensorData,
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};
use rand::Rng;

#[derive(Config)]
pub struct CausalLmConfig {
    pub transformer: TransformerEncoderConfig,
    pub vocab_size: usize,
    pub pad_token: usize,
    pub max_seq_length: usize,
    /// Leave pad-token targets out of the loss. Off by default: the labels
    /// are a verbatim copy of the inputs, padding included.
    #[config(default = false)]
    pub ignore_padding_in_loss: bool,
}

impl CausalLmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CausalLm<B> {
        let d_model = self.transformer.d_model;

        CausalLm {
            transformer: self.transformer.init(device),
            embedding_token: EmbeddingConfig::new(self.vocab_size, d_model).init(device),
            embedding_pos: EmbeddingConfig::new(self.max_seq_length, d_model).init(device),
            norm: LayerNormConfig::new(d_model).init(device),
            output: LinearConfig::new(d_model, self.vocab_size).init(device),
            vocab_size: self.vocab_size,
            pad_token: self.pad_token,
            max_seq_length: self.max_seq_length,
            ignore_padding_in_loss: self.ignore_padding_in_loss,
        }
    }
}

/// Decoder-only transformer: a pre-norm encoder stack under a causal mask.
#[derive(Module, Debug)]
pub struct CausalLm<B: Backend> {
    transformer: TransformerEncoder<B>,
    embedding_token: Embedding<B>,
    embedding_pos: Embedding<B>,
    norm: LayerNorm<B>,
    output: Linear<B>,
    vocab_size: usize,
    pad_token: usize,
    max_seq_length: usize,
    ignore_padding_in_loss: bool,
}

impl<B: Backend> CausalLm<B> {
    /// Next-token logits `[batch_size, seq_length, vocab_size]`.
    fn logits(
        &self,
        inputs: Tensor<B, 2, Int>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_length] = inputs.dims();
        let device = &inputs.device();

        let index_positions = Tensor::arange(0..seq_length as i64, device)
            .reshape([1, seq_length])
            .repeat_dim(0, batch_size);

        let embedding = self.embedding_pos.forward(index_positions)
            + self.embedding_token.forward(inputs);

        let mask_attn = generate_autoregressive_mask::<B>(batch_size, seq_length, device);
        let mut input = TransformerEncoderInput::new(embedding).mask_attn(mask_attn);
        if let Some(mask_pad) = mask_pad {
            input = input.mask_pad(mask_pad);
        }

        let encoded = self.norm.forward(self.transformer.forward(input));
        self.output.forward(encoded)
    }

    pub fn forward(&self, item: TrainingBatch<B>) -> ClassificationOutput<B> {
        let [batch_size, seq_length] = item.tokens_inputs.dims();
        let device = &self.devices()[0];

        let inputs = item.tokens_inputs.to_device(device);
        let targets = item.targets.to_device(device);
        let mask_pad = item.mask_pad.to_device(device);

        let output = self.logits(inputs, Some(mask_pad));
        let output_flatten = output.reshape([batch_size * seq_length, self.vocab_size]);
        let targets_flatten = targets.reshape([batch_size * seq_length]);

        let pad_tokens = self.ignore_padding_in_loss.then(|| vec![self.pad_token]);
        let loss = CrossEntropyLossConfig::new()
            .with_pad_tokens(pad_tokens)
            .init(&output_flatten.device());
        let loss = loss.forward(output_flatten.clone(), targets_flatten.clone());

        ClassificationOutput {
            loss,
            output: output_flatten,
            targets: targets_flatten,
        }
    }

    /// Appends `max_new_tokens` sampled tokens to `idx`.
    ///
    /// A non-positive temperature picks the most likely token every step.
    pub fn infer(
        &self,
        idx: Tensor<B, 2, Int>,
        max_new_tokens: usize,
        temperature: f64,
    ) -> error::Result<Tensor<B, 2, Int>> {
        let mut current_seq = idx;

        for _ in 0..max_new_tokens {
            let [batch_size, seq_len] = current_seq.dims();
            let idx_cond = if seq_len > self.max_seq_length {
                current_seq
                    .clone()
                    .slice([0..batch_size, (seq_len - self.max_seq_length)..seq_len])
            } else {
                current_seq.clone()
            };

            let [_, cond_len] = idx_cond.dims();
            let logits = self.logits(idx_cond, None);
            let last_logits = logits
                .slice([0..batch_size, (cond_len - 1)..cond_len, 0..self.vocab_size])
                .reshape([batch_size, self.vocab_size]);

            let next_token = if temperature <= 0.0 {
                last_logits.argmax(1)
            } else {
                self.sample_multinomial(softmax(last_logits / temperature, 1))?
            };

            current_seq = Tensor::cat(vec![current_seq, next_token], 1);
        }

        Ok(current_seq)
    }

    fn sample_multinomial(&self, probs: Tensor<B, 2>) -> error::Result<Tensor<B, 2, Int>> {
        let device = probs.device();
        let [batch_size, vocab_size] = probs.dims();

        let probs: Vec<f32> = probs
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|err| Error::Tensor(format!("{err:?}")))?;

        let mut rng = rand::thread_rng();
        let mut next_tokens = Vec::with_capacity(batch_size);

        for row in probs.chunks(vocab_size) {
            let rand_val: f32 = rng.gen();
            let mut cumsum = 0.0;
            let mut selected = (vocab_size - 1) as i64;
            for (token_idx, p) in row.iter().enumerate() {
                cumsum += p;
                if rand_val < cumsum {
                    selected = token_idx as i64;
                    break;
                }
            }
            next_tokens.push(selected);
        }

        Ok(Tensor::<B, 2, Int>::from_data(
            TensorData::new(next_tokens, [batch_size, 1]),
            &device,
        ))
    }

    pub fn max_seq_length(&self) -> usize {
        self.max_seq_length
    }
}

impl<B: AutodiffBackend> TrainStep<TrainingBatch<B>, ClassificationOutput<B>> for CausalLm<B> {
    fn step(&self, item: TrainingBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward(item);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

impl<B: Backend> ValidStep<TrainingBatch<B>, ClassificationOutput<B>> for CausalLm<B> {
    fn step(&self, item: TrainingBatch<B>) -> ClassificationOutput<B> {
        self.forward(item)
    }
}
