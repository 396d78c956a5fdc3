//! Training metrics and reports.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Scalars from a single optimization step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepMetrics {
    /// Global step index (1-based).
    pub step: usize,
    /// Total loss.
    pub loss: f32,
    /// Clamped L1 term.
    pub reconstruction: f32,
    /// Unweighted latent prior.
    pub regularization: f32,
    /// Decoder gradient norm before clipping.
    pub gradient_norm: f32,
    /// Decoder learning rate used.
    pub decoder_learning_rate: f64,
    /// Latent learning rate used.
    pub latent_learning_rate: f64,
}

/// Averages over one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochSummary {
    /// Epoch index (0-based).
    pub epoch: usize,
    /// Mean total loss.
    pub mean_loss: f32,
    /// Mean clamped L1 term.
    pub mean_reconstruction: f32,
    /// Steps taken.
    pub steps: usize,
    /// Wall-clock duration in seconds.
    pub seconds: f32,
}

impl EpochSummary {
    /// Average a set of step metrics.
    pub fn from_steps(epoch: usize, steps: &[StepMetrics], seconds: f32) -> Self {
        let n = steps.len().max(1) as f32;
        Self {
            epoch,
            mean_loss: steps.iter().map(|s| s.loss).sum::<f32>() / n,
            mean_reconstruction: steps.iter().map(|s| s.reconstruction).sum::<f32>() / n,
            steps: steps.len(),
            seconds,
        }
    }

    /// Log at info level.
    pub fn log(&self, total_epochs: usize) {
        log::info!(
            "epoch {}/{}: loss={:.6} l1={:.6} steps={} ({:.2}s)",
            self.epoch + 1,
            total_epochs,
            self.mean_loss,
            self.mean_reconstruction,
            self.steps,
            self.seconds,
        );
    }
}

/// Mean loss of every completed epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LossHistory(Vec<f32>);

impl LossHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an epoch mean.
    pub fn push(&mut self, loss: f32) {
        self.0.push(loss);
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Recorded values.
    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Most recent value.
    pub fn last(&self) -> Option<f32> {
        self.0.last().copied()
    }

    fn mean(values: &[f32]) -> f32 {
        values.iter().sum::<f32>() / values.len() as f32
    }

    /// Means of the first and last quarter of the history.
    ///
    /// `None` with fewer than four entries.
    pub fn quartile_means(&self) -> Option<(f32, f32)> {
        let q = self.0.len() / 4;
        if q == 0 {
            return None;
        }
        Some((Self::mean(&self.0[..q]), Self::mean(&self.0[self.0.len() - q..])))
    }

    /// True when the last `window` epochs improved on the `window` before by less than `tolerance`.
    pub fn plateaued(&self, window: usize, tolerance: f32) -> bool {
        if window == 0 || self.0.len() < 2 * window {
            return false;
        }
        let n = self.0.len();
        let previous = Self::mean(&self.0[n - 2 * window..n - window]);
        let recent = Self::mean(&self.0[n - window..]);
        previous - recent < tolerance
    }
}

/// Why a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The epoch budget was used up.
    EpochBudget,
    /// The loss plateaued.
    EarlyStop,
    /// The epoch callback asked to stop.
    Cancelled,
}

/// Outcome of [`AutoDecoderTrainer::fit`](crate::training::AutoDecoderTrainer::fit).
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Epochs completed, counting any before a resume.
    pub epochs: usize,
    /// Optimization steps taken, counting any before a resume.
    pub total_steps: usize,
    /// Mean loss of the last epoch.
    pub final_loss: f32,
    /// Why training stopped.
    pub stop_reason: StopReason,
    /// Last checkpoint written.
    pub last_checkpoint: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(values: &[f32]) -> LossHistory {
        let mut h = LossHistory::new();
        for &v in values {
            h.push(v);
        }
        h
    }

    #[test]
    fn test_quartile_means() {
        assert_eq!(history(&[1.0, 2.0, 3.0]).quartile_means(), None);
        let (first, last) = history(&[4.0, 3.0, 2.0, 1.0, 1.0, 1.0, 0.5, 0.5]).quartile_means().unwrap();
        assert!((first - 3.5).abs() < 1e-6);
        assert!((last - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_plateau_detection() {
        let improving = history(&[1.0, 0.9, 0.5, 0.4]);
        assert!(!improving.plateaued(2, 0.1));
        let flat = history(&[1.0, 1.0, 0.99, 0.99]);
        assert!(flat.plateaued(2, 0.1));
        assert!(!flat.plateaued(3, 0.1));
    }

    #[test]
    fn test_epoch_summary_averages() {
        let steps = [
            StepMetrics {
                loss: 1.0,
                reconstruction: 0.5,
                ..Default::default()
            },
            StepMetrics {
                loss: 3.0,
                reconstruction: 1.5,
                ..Default::default()
            },
        ];
        let summary = EpochSummary::from_steps(2, &steps, 0.1);
        assert_eq!(summary.mean_loss, 2.0);
        assert_eq!(summary.mean_reconstruction, 1.0);
        assert_eq!(summary.steps, 2);
    }
}
