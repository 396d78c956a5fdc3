//! Clamped L1 reconstruction loss with a latent L2 prior.

use burn::prelude::*;

/// Loss tensors for one batch.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    /// `reconstruction + λ · regularization`.
    pub total: Tensor<B, 1>,
    /// `mean(|clamp(pred) - clamp(target)|)`.
    pub reconstruction: Tensor<B, 1>,
    /// `mean(‖z‖²)` over the batch rows (unweighted).
    pub regularization: Tensor<B, 1>,
}

/// Auto-decoder loss.
///
/// L = mean(|clamp(pred, -δ, δ) - clamp(target, -δ, δ)|) + λ · mean(‖z‖²)
///
/// Clamping happens here, never when samples are stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampedL1Loss {
    /// Clamp distance `δ`.
    pub clamp: f32,
    /// Prior weight `λ`.
    pub latent_regularization: f32,
}

impl ClampedL1Loss {
    /// Create a loss with clamp `δ` and prior weight `λ`.
    pub fn new(clamp: f32, latent_regularization: f32) -> Self {
        Self {
            clamp,
            latent_regularization,
        }
    }

    /// Clamped L1 term only.
    ///
    /// Input: predictions and targets, both `[n, 1]`.
    pub fn reconstruction<B: Backend>(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        let pred = pred.clamp(-self.clamp, self.clamp);
        let target = target.clamp(-self.clamp, self.clamp);
        (pred - target).abs().mean()
    }

    /// Mean squared norm of the latent rows `[n, L]`.
    pub fn latent_prior<B: Backend>(&self, latents: Tensor<B, 2>) -> Tensor<B, 1> {
        latents.powf_scalar(2.0).sum_dim(1).mean()
    }

    /// Full loss for a batch.
    pub fn forward<B: Backend>(
        &self,
        pred: Tensor<B, 2>,
        target: Tensor<B, 2>,
        latents: Tensor<B, 2>,
    ) -> LossTerms<B> {
        let reconstruction = self.reconstruction(pred, target);
        let regularization = self.latent_prior(latents);
        let total = reconstruction.clone() + regularization.clone() * self.latent_regularization;
        LossTerms {
            total,
            reconstruction,
            regularization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::tensor_ops::{matrix_tensor, scalar};

    type TestBackend = NdArray;

    fn column(values: &[f32]) -> Tensor<TestBackend, 2> {
        matrix_tensor(values.to_vec(), [values.len(), 1], &Default::default())
    }

    #[test]
    fn test_zero_when_prediction_matches() {
        let loss = ClampedL1Loss::new(0.1, 0.0);
        let value = scalar(loss.reconstruction(column(&[0.02, -0.05]), column(&[0.02, -0.05]))).unwrap();
        assert!(value.abs() < 1e-7);
    }

    #[test]
    fn test_far_samples_are_clamped() {
        let loss = ClampedL1Loss::new(0.1, 0.0);
        // Both beyond δ on the same side: no penalty.
        let same_side = scalar(loss.reconstruction(column(&[0.5]), column(&[3.0]))).unwrap();
        assert!(same_side.abs() < 1e-7);
        // Opposite sides: at most 2δ.
        let opposite = scalar(loss.reconstruction(column(&[-4.0]), column(&[4.0]))).unwrap();
        assert!((opposite - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_regularization_weight() {
        let device = Default::default();
        let loss = ClampedL1Loss::new(0.1, 0.5);
        let latents = matrix_tensor::<TestBackend>(vec![1.0, 1.0, 0.0, 2.0], [2, 2], &device);
        let terms = loss.forward(column(&[0.0, 0.0]), column(&[0.05, -0.05]), latents);
        // mean(‖z‖²) = (2 + 4) / 2 = 3
        assert!((scalar(terms.regularization).unwrap() - 3.0).abs() < 1e-6);
        assert!((scalar(terms.reconstruction).unwrap() - 0.05).abs() < 1e-6);
        assert!((scalar(terms.total).unwrap() - (0.05 + 1.5)).abs() < 1e-5);
    }
}
