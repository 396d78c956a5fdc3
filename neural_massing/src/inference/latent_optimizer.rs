//! Latent-code recovery for shapes never seen in training.

use std::fmt;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::config::LatentOptimizerConfig;
use crate::data::SampleSet;
use crate::error::{MassingError, Result};
use crate::latent::LatentCode;
use crate::loss::ClampedL1Loss;
use crate::nn::SdfDecoder;
use crate::tensor_ops::{column_tensor, matrix_tensor, points_tensor, scalar, to_host};
use crate::training::{LatentAdam, StepSchedule};

/// The fit did not reach the tolerance within the step budget.
///
/// Not an error: the best latent found is still returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceWarning {
    /// Loss of the returned latent on all samples.
    pub residual_loss: f32,
    /// Tolerance that was not reached.
    pub tolerance: f32,
    /// Steps run.
    pub steps: usize,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "latent fit did not converge: residual loss {:.6} above tolerance {:.6} after {} steps",
            self.residual_loss, self.tolerance, self.steps
        )
    }
}

/// Result of [`LatentOptimizer::fit`].
#[derive(Debug, Clone)]
pub struct LatentFit {
    /// Best latent found.
    pub latent: LatentCode,
    /// Loss of `latent` on all samples.
    pub loss: f32,
    /// Loss of the initial latent on all samples.
    pub initial_loss: f32,
    /// Gradient steps run.
    pub steps: usize,
    /// Set when `loss` stayed above the tolerance.
    pub warning: Option<ConvergenceWarning>,
}

impl LatentFit {
    /// True if the tolerance was reached.
    pub fn converged(&self) -> bool {
        self.warning.is_none()
    }
}

/// Gradient descent on a single latent code through a frozen decoder.
///
/// Uses the training loss with the decoder parameters held constant: only the
/// latent receives gradients.
pub struct LatentOptimizer<B: AutodiffBackend> {
    decoder: SdfDecoder<B>,
    config: LatentOptimizerConfig,
    loss: ClampedL1Loss,
}

impl<B: AutodiffBackend> LatentOptimizer<B> {
    /// Wrap a frozen decoder.
    pub fn new(decoder: &SdfDecoder<B::InnerBackend>, config: LatentOptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decoder: SdfDecoder::from_inner(decoder),
            loss: ClampedL1Loss::new(config.clamp_distance, config.latent_regularization),
            config,
        })
    }

    /// Configuration.
    pub fn config(&self) -> &LatentOptimizerConfig {
        &self.config
    }

    fn loss_and_gradient(
        &self,
        latent: &LatentCode,
        points: Tensor<B, 2>,
        targets: Tensor<B, 2>,
    ) -> Result<(f32, Vec<f32>)> {
        let n = points.dims()[0];
        let device = &self.decoder.device();
        let z = matrix_tensor::<B>(latent.as_slice().to_vec(), [1, latent.dim()], device).require_grad();
        let rows = z.clone().repeat_dim(0, n);
        let pred = self.decoder.forward(rows.clone(), points);
        let total = self.loss.forward(pred, targets, rows).total;

        let loss = scalar(total.clone())?;
        let grads = total.backward();
        let grad = match z.grad(&grads) {
            Some(g) => to_host(g)?,
            None => vec![0.0; latent.dim()],
        };
        Ok((loss, grad))
    }

    /// Loss of `latent` on every sample.
    pub fn evaluate(&self, latent: &LatentCode, samples: &SampleSet) -> Result<f32> {
        let device = &self.decoder.device();
        let n = samples.len();
        let z = matrix_tensor::<B>(latent.as_slice().to_vec(), [1, latent.dim()], device).repeat_dim(0, n);
        let pred = self.decoder.forward(z.clone(), points_tensor(samples.points(), device));
        scalar(
            self.loss
                .forward(pred, column_tensor(samples.distances(), device), z)
                .total,
        )
    }

    /// Recover a latent code for `samples`.
    ///
    /// Runs the configured step budget and returns the best latent seen.
    /// A NaN or infinite loss stops the descent early.
    pub fn fit(&self, samples: &SampleSet) -> Result<LatentFit> {
        if samples.is_empty() {
            return Err(MassingError::data("cannot fit a latent code to zero samples"));
        }
        let dim = self.decoder.latent_dim();
        let device = &self.decoder.device();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut latent = if self.config.init_std > 0.0 {
            LatentCode::random(dim, self.config.init_std, &mut rng)
        } else {
            LatentCode::zeros(dim)
        };
        let initial_loss = self.evaluate(&latent, samples)?;

        let schedule = StepSchedule::new(
            self.config.learning_rate,
            self.config.lr_decay_interval,
            self.config.lr_decay_factor,
        );
        let mut adam = LatentAdam::new(1, dim, self.config.optimizer.clone());
        let subsample = self.config.samples_per_step > 0 && self.config.samples_per_step < samples.len();
        let all_points = points_tensor::<B>(samples.points(), device);
        let all_targets = column_tensor::<B>(samples.distances(), device);

        let mut best = (initial_loss, latent.clone());
        let mut steps = 0;
        for step in 0..self.config.num_steps {
            let (points, targets) = if subsample {
                let picked = index::sample(&mut rng, samples.len(), self.config.samples_per_step).into_vec();
                let subset = samples.subset(&picked)?;
                (
                    points_tensor::<B>(subset.points(), device),
                    column_tensor::<B>(subset.distances(), device),
                )
            } else {
                (all_points.clone(), all_targets.clone())
            };

            let (loss, grad) = self.loss_and_gradient(&latent, points, targets)?;
            if !loss.is_finite() || grad.iter().any(|g| !g.is_finite()) {
                log::warn!("latent fit stopped at step {step}: non-finite loss {loss}");
                break;
            }
            if loss < best.0 {
                best = (loss, latent.clone());
            }
            adam.step(0, latent.as_mut_slice(), &grad, schedule.at(step) as f32)?;
            steps += 1;
        }

        // Subset losses are estimates, and the last update has not been scored yet.
        let best_loss = if subsample { self.evaluate(&best.1, samples)? } else { best.0 };
        let final_loss = self.evaluate(&latent, samples)?;
        let (loss, latent) = if final_loss.is_finite() && final_loss <= best_loss {
            (final_loss, latent)
        } else {
            (best_loss, best.1)
        };

        let warning = (loss > self.config.tolerance).then_some(ConvergenceWarning {
            residual_loss: loss,
            tolerance: self.config.tolerance,
            steps,
        });
        match &warning {
            Some(w) => log::warn!("{w}"),
            None => log::debug!("latent fit converged: loss {initial_loss:.6} -> {loss:.6} in {steps} steps"),
        }

        Ok(LatentFit {
            latent,
            loss,
            initial_loss,
            steps,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use massing_core::Point3;

    use crate::config::SdfDecoderConfig;

    type TestBackend = Autodiff<NdArray>;

    fn samples() -> SampleSet {
        let points: Vec<Point3> = (0..50)
            .map(|i| {
                let t = i as f32 / 50.0;
                Point3::new(t, (t * 3.0).fract(), (t * 5.0).fract())
            })
            .collect();
        let distances = points.iter().map(|p| p.z - 0.5).collect();
        SampleSet::new(points, distances).unwrap()
    }

    #[test]
    fn test_fit_does_not_increase_loss() {
        let device = Default::default();
        let decoder_config = SdfDecoderConfig::fast(4).with_hidden_dim(16).with_zero_init_output(false);
        let decoder = SdfDecoder::<NdArray>::new(&decoder_config, &device).unwrap();
        let config = LatentOptimizerConfig::new()
            .with_num_steps(30)
            .with_learning_rate(1e-2)
            .with_samples_per_step(0);
        let optimizer = LatentOptimizer::<TestBackend>::new(&decoder, config).unwrap();

        let fit = optimizer.fit(&samples()).unwrap();
        assert_eq!(fit.steps, 30);
        assert!(fit.loss <= fit.initial_loss);
        assert!(fit.latent.is_finite());
        assert!((optimizer.evaluate(&fit.latent, &samples()).unwrap() - fit.loss).abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_tolerance_warns() {
        let device = Default::default();
        let decoder = SdfDecoder::<NdArray>::new(&SdfDecoderConfig::fast(4), &device).unwrap();
        let config = LatentOptimizerConfig::new().with_num_steps(2).with_tolerance(0.0);
        let fit = LatentOptimizer::<TestBackend>::new(&decoder, config)
            .unwrap()
            .fit(&samples())
            .unwrap();
        let warning = fit.warning.unwrap();
        assert_eq!(warning.steps, 2);
        assert!(warning.residual_loss > 0.0);
        assert!(!fit.converged());
    }

    #[test]
    fn test_empty_samples_rejected() {
        let device = Default::default();
        let decoder = SdfDecoder::<NdArray>::new(&SdfDecoderConfig::fast(4), &device).unwrap();
        let optimizer = LatentOptimizer::<TestBackend>::new(&decoder, LatentOptimizerConfig::new()).unwrap();
        let empty = SampleSet::new(Vec::new(), Vec::new()).unwrap();
        assert!(optimizer.fit(&empty).unwrap_err().is_data_error());
    }
}
