//! Training metrics collection and reporting.
//!
//! The training loop records one [`EpochMetrics`] per epoch into a
//! [`MetricsCollector`]. When training ends the collector is finalized into a
//! [`TrainingReport`] summarizing the run (best epoch, final RMSE, whether
//! early stopping fired).
//!
//! # Output Formats
//!
//! - JSON via [`MetricsCollector::to_json`] for programmatic analysis
//! - Console summary via [`MetricsCollector::summary`]
//!
//! The accuracy helpers [`rmse`] and [`mae`] score a set of predictions against
//! their true ratings.

use serde::{Deserialize, Serialize};

use crate::algorithm::Prediction;

/// Metrics for a single training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number, starting at 1.
    pub epoch: usize,

    /// Rating RMSE on the validation users.
    pub validation_rmse: f32,

    /// Mean squared error between the input and the negative-phase
    /// reconstruction probabilities over observed slots, averaged over batches.
    pub reconstruction_error: f32,

    /// Whether this epoch improved on the best validation RMSE so far.
    pub improved: bool,

    /// Wall-clock time in milliseconds.
    pub time_ms: f64,
}

/// Summary of a completed training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Number of epochs executed.
    pub epochs_run: usize,

    /// Epoch with the lowest validation RMSE.
    pub best_epoch: usize,

    /// Lowest validation RMSE seen.
    pub best_rmse: f32,

    /// Validation RMSE of the parameters the model ends up with.
    pub final_rmse: f32,

    /// Whether early stopping ended training before `max_epoch`.
    pub stopped_early: bool,

    /// Whether the best-epoch parameters were restored at the end.
    pub restored_best: bool,

    /// Total training time in milliseconds.
    pub total_time_ms: f64,

    /// Per-epoch history.
    pub history: Vec<EpochMetrics>,
}

/// Collector for per-epoch training metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    epochs: Vec<EpochMetrics>,
    best: Option<(usize, f32)>,
}

impl MetricsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records metrics for a finished epoch and tracks the best RMSE.
    pub fn record_epoch(&mut self, metrics: EpochMetrics) {
        if metrics.improved || self.best.is_none() {
            self.best = Some((metrics.epoch, metrics.validation_rmse));
        }
        self.epochs.push(metrics);
    }

    /// Recorded epochs, oldest first.
    pub fn epochs(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    /// `(epoch, rmse)` of the best epoch recorded so far.
    pub fn best(&self) -> Option<(usize, f32)> {
        self.best
    }

    /// Most recent validation RMSE.
    pub fn last_rmse(&self) -> Option<f32> {
        self.epochs.last().map(|m| m.validation_rmse)
    }

    /// Builds the final report.
    ///
    /// `restored_best` tells whether the model was rolled back to the best
    /// epoch, which decides the reported `final_rmse`.
    pub fn finalize(&self, stopped_early: bool, restored_best: bool) -> TrainingReport {
        let (best_epoch, best_rmse) = self.best.unwrap_or((0, f32::NAN));
        let final_rmse = if restored_best {
            best_rmse
        } else {
            self.last_rmse().unwrap_or(f32::NAN)
        };

        TrainingReport {
            epochs_run: self.epochs.len(),
            best_epoch,
            best_rmse,
            final_rmse,
            stopped_early,
            restored_best,
            total_time_ms: self.epochs.iter().map(|m| m.time_ms).sum(),
            history: self.epochs.clone(),
        }
    }

    /// Exports the recorded epochs to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.epochs)
    }

    /// Returns a console-friendly summary.
    pub fn summary(&self) -> String {
        let (best_epoch, best_rmse) = self.best.unwrap_or((0, f32::NAN));
        format!(
            "Training Summary:\n\
             ├─ Epochs: {}\n\
             ├─ Best Epoch: {}\n\
             ├─ Best RMSE: {:.4}\n\
             ├─ Last RMSE: {:.4}\n\
             └─ Total Time: {:.1} ms",
            self.epochs.len(),
            best_epoch,
            best_rmse,
            self.last_rmse().unwrap_or(f32::NAN),
            self.epochs.iter().map(|m| m.time_ms).sum::<f64>(),
        )
    }

    /// Clears all recorded metrics.
    pub fn reset(&mut self) {
        self.epochs.clear();
        self.best = None;
    }
}

impl TrainingReport {
    /// Exports the report to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Root mean squared error of predictions that carry a true rating.
///
/// Returns `None` when no prediction has one.
pub fn rmse(predictions: &[Prediction]) -> Option<f32> {
    let errors: Vec<f32> = predictions
        .iter()
        .filter_map(|p| p.r_ui.map(|r| p.est - r))
        .collect();
    if errors.is_empty() {
        return None;
    }
    Some((errors.iter().map(|e| e * e).sum::<f32>() / errors.len() as f32).sqrt())
}

/// Mean absolute error of predictions that carry a true rating.
pub fn mae(predictions: &[Prediction]) -> Option<f32> {
    let errors: Vec<f32> = predictions
        .iter()
        .filter_map(|p| p.r_ui.map(|r| (p.est - r).abs()))
        .collect();
    if errors.is_empty() {
        return None;
    }
    Some(errors.iter().sum::<f32>() / errors.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::PredictionDetails;

    fn epoch(epoch: usize, rmse: f32, improved: bool) -> EpochMetrics {
        EpochMetrics {
            epoch,
            validation_rmse: rmse,
            reconstruction_error: 0.1,
            improved,
            time_ms: 10.0,
        }
    }

    #[test]
    fn test_best_tracking() {
        let mut collector = MetricsCollector::new();
        collector.record_epoch(epoch(1, 1.2, true));
        collector.record_epoch(epoch(2, 1.0, true));
        collector.record_epoch(epoch(3, 1.1, false));

        assert_eq!(collector.best(), Some((2, 1.0)));
        assert_eq!(collector.last_rmse(), Some(1.1));
    }

    #[test]
    fn test_finalize() {
        let mut collector = MetricsCollector::new();
        collector.record_epoch(epoch(1, 1.2, true));
        collector.record_epoch(epoch(2, 1.3, false));

        let rolled_back = collector.finalize(true, true);
        assert_eq!(rolled_back.epochs_run, 2);
        assert_eq!(rolled_back.best_epoch, 1);
        assert_eq!(rolled_back.final_rmse, 1.2);
        assert!((rolled_back.total_time_ms - 20.0).abs() < 1e-9);

        let kept = collector.finalize(false, false);
        assert_eq!(kept.final_rmse, 1.3);
    }

    #[test]
    fn test_json_export_and_summary() {
        let mut collector = MetricsCollector::new();
        collector.record_epoch(epoch(1, 0.9, true));

        let json = collector.to_json().unwrap();
        assert!(json.contains("validation_rmse"));
        assert!(collector.summary().contains("Best Epoch: 1"));

        let report = collector.finalize(false, false).to_json().unwrap();
        assert!(report.contains("history"));

        collector.reset();
        assert!(collector.epochs().is_empty());
        assert_eq!(collector.best(), None);
    }

    #[test]
    fn test_accuracy_helpers() {
        let prediction = |est: f32, r_ui: Option<f32>| Prediction {
            uid: "u".into(),
            iid: "i".into(),
            r_ui,
            est,
            details: PredictionDetails::default(),
        };
        let predictions = vec![
            prediction(3.0, Some(4.0)),
            prediction(2.0, Some(5.0)),
            prediction(1.0, None),
        ];

        assert!((rmse(&predictions).unwrap() - 5.0f32.sqrt()).abs() < 1e-6);
        assert!((mae(&predictions).unwrap() - 2.0).abs() < 1e-6);
        assert_eq!(rmse(&predictions[2..]), None);
    }
}
