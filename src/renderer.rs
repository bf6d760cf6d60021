use burn::train::renderer::{MetricState, MetricsRenderer, TrainingProgress};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};
use std::time::Instant;

/// Learner renderer that logs metrics every `logging_steps` optimizer steps
/// and, on a terminal, keeps a one-line progress display up to date.
pub struct StepLogRenderer {
    start_time: Instant,
    logging_steps: usize,
    step: usize,
    interactive: bool,
    train: BTreeMap<String, String>,
    valid: BTreeMap<String, String>,
}

impl StepLogRenderer {
    pub fn new(logging_steps: usize) -> Self {
        Self {
            start_time: Instant::now(),
            logging_steps,
            step: 0,
            interactive: io::stdout().is_terminal(),
            train: BTreeMap::new(),
            valid: BTreeMap::new(),
        }
    }

    fn should_log(&self, step: usize) -> bool {
        self.logging_steps > 0 && step % self.logging_steps == 0
    }

    fn record(metrics: &mut BTreeMap<String, String>, state: MetricState) {
        let entry = match state {
            MetricState::Generic(entry) => entry,
            MetricState::Numeric(entry, _) => entry,
        };
        metrics.insert(entry.name, entry.formatted);
    }

    fn summary(metrics: &BTreeMap<String, String>) -> String {
        metrics
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(" - ")
    }

    fn draw(&self, mode: &str, item: &TrainingProgress) -> io::Result<()> {
        execute!(
            io::stdout(),
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine)
        )?;

        let metrics = match mode {
            "Validating" => &self.valid,
            _ => &self.train,
        };

        print!(
            "{} | Epoch: {}/{} | Step: {} | Items: {}/{} | ({} mins) | {}",
            mode,
            item.epoch,
            item.epoch_total,
            self.step,
            item.progress.items_processed,
            item.progress.items_total,
            self.start_time.elapsed().as_secs() / 60,
            Self::summary(metrics),
        );

        io::stdout().flush()
    }

    fn clear_line(&mut self) {
        if !self.interactive {
            return;
        }
        if execute!(
            io::stdout(),
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine)
        )
        .is_err()
        {
            self.interactive = false;
        }
    }

    fn refresh(&mut self, mode: &str, item: &TrainingProgress) {
        if self.interactive && self.draw(mode, item).is_err() {
            self.interactive = false;
        }
    }
}

impl MetricsRenderer for StepLogRenderer {
    fn update_train(&mut self, state: MetricState) {
        Self::record(&mut self.train, state);
    }

    fn update_valid(&mut self, state: MetricState) {
        Self::record(&mut self.valid, state);
    }

    fn render_train(&mut self, item: TrainingProgress) {
        self.step += 1;

        if self.should_log(self.step) {
            self.clear_line();
            tracing::info!(
                epoch = item.epoch,
                step = self.step,
                metrics = %Self::summary(&self.train),
                "train"
            );
        }

        self.refresh("Training", &item);
    }

    fn render_valid(&mut self, item: TrainingProgress) {
        if item.progress.items_processed >= item.progress.items_total {
            self.clear_line();
            tracing::info!(
                epoch = item.epoch,
                metrics = %Self::summary(&self.valid),
                "validation"
            );
            return;
        }

        self.refresh("Validating", &item);
    }
}
