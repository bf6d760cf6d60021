use burn::tensor::{backend::Backend, ElementConversion};
use burn::train::metric::{Adaptor, Metric, MetricEntry, MetricMetadata, Numeric};
use burn::train::ClassificationOutput;

/// `exp` of the running mean loss over the current epoch.
#[derive(Clone, Debug, Default)]
pub struct PerplexityMetric {
    total_loss: f64,
    count: usize,
}

#[derive(Debug, new)]
pub struct PerplexityInput {
    loss: f64,
}

impl PerplexityMetric {
    fn perplexity(&self) -> f64 {
        if self.count == 0 {
            f64::INFINITY
        } else {
            (self.total_loss / self.count as f64).exp()
        }
    }
}

impl Metric for PerplexityMetric {
    const NAME: &'static str = "Perplexity";
    type Input = PerplexityInput;

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.total_loss += item.loss;
        self.count += 1;

        let perplexity = self.perplexity();
        MetricEntry::new(
            Self::NAME.to_string(),
            format!("{perplexity:.4}"),
            perplexity.to_string(),
        )
    }

    fn clear(&mut self) {
        self.total_loss = 0.0;
        self.count = 0;
    }
}

impl<B: Backend> Adaptor<PerplexityInput> for ClassificationOutput<B> {
    fn adapt(&self) -> PerplexityInput {
        PerplexityInput::new(self.loss.clone().into_scalar().elem::<f64>())
    }
}

impl Numeric for PerplexityMetric {
    fn value(&self) -> f64 {
        self.perplexity()
    }
}
