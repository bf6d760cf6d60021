use super::dataset::LanguageModelItem;
use burn::{data::dataloader::batcher::Batcher, prelude::*, tensor::TensorData};

#[derive(Clone, new)]
pub struct LanguageModelBatcher<B: Backend> {
    device: B::Device,
}

#[derive(Debug, Clone, new)]
pub struct TrainingBatch<B: Backend> {
    pub tokens_inputs: Tensor<B, 2, Int>, // Input token IDs [batch_size, block_size - 1]
    pub targets: Tensor<B, 2, Int>,       // Next-token labels [batch_size, block_size - 1]
    pub mask_pad: Tensor<B, 2, Bool>,     // True at padding positions [batch_size, block_size - 1]
}

impl<B: Backend> LanguageModelBatcher<B> {
    fn stack(&self, rows: Vec<&[usize]>) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let seq_length = rows.first().map_or(0, |row| row.len());
        let values: Vec<i64> = rows
            .into_iter()
            .flat_map(|row| row.iter().map(|&x| x as i64))
            .collect();

        Tensor::from_data(TensorData::new(values, [batch_size, seq_length]), &self.device)
    }
}

impl<B: Backend> Batcher<LanguageModelItem, TrainingBatch<B>> for LanguageModelBatcher<B> {
    fn batch(&self, items: Vec<LanguageModelItem>) -> TrainingBatch<B> {
        let input_ids = self.stack(items.iter().map(|item| item.input_ids.as_slice()).collect());
        let labels = self.stack(items.iter().map(|item| item.labels.as_slice()).collect());
        let attention = self.stack(
            items
                .iter()
                .map(|item| item.attention_mask.as_slice())
                .collect(),
        );

        let [batch_size, seq_length] = input_ids.dims();

        // Position t predicts label t + 1.
        let tokens_inputs = input_ids.slice([0..batch_size, 0..seq_length - 1]);
        let targets = labels.slice([0..batch_size, 1..seq_length]);
        let mask_pad = attention
            .slice([0..batch_size, 0..seq_length - 1])
            .equal_elem(0);

        TrainingBatch::new(tokens_inputs, targets, mask_pad)
    }
}
