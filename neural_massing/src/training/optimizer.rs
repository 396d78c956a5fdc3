//! Optimizer state for auto-decoder training.
//!
//! Decoder weights are updated by one [`AdamState`] per parameter tensor on
//! the inner backend. Latent codes live on the host, so their Adam moments do
//! too ([`LatentAdam`]), one row per shape, touched only when the shape is in
//! the batch.

use burn::prelude::*;

use crate::config::OptimizerConfig;
use crate::error::{MassingError, Result};
use crate::tensor_ops::{matrix_tensor, scalar, to_host};

/// Step-decay learning-rate schedule: `initial · factor^(epoch / interval)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSchedule {
    /// Rate at epoch 0.
    pub initial: f64,
    /// Epochs between decays.
    pub interval: usize,
    /// Multiplier applied at each decay.
    pub factor: f64,
}

impl StepSchedule {
    /// Create a schedule.
    pub fn new(initial: f64, interval: usize, factor: f64) -> Self {
        Self {
            initial,
            interval,
            factor,
        }
    }

    /// Learning rate in effect at `epoch`.
    pub fn at(&self, epoch: usize) -> f64 {
        let decays = epoch / self.interval.max(1);
        self.initial * self.factor.powi(decays.min(i32::MAX as usize) as i32)
    }
}

/// Adam state for a single 2D parameter tensor.
#[derive(Debug, Clone)]
pub struct AdamState<B: Backend> {
    first: Tensor<B, 2>,
    second: Tensor<B, 2>,
    config: OptimizerConfig,
    step: usize,
}

impl<B: Backend> AdamState<B> {
    /// Zeroed moments for a parameter of `shape`.
    pub fn new(shape: [usize; 2], config: OptimizerConfig, device: &B::Device) -> Self {
        Self {
            first: Tensor::zeros(shape, device),
            second: Tensor::zeros(shape, device),
            config,
            step: 0,
        }
    }

    /// Restore moments saved with [`Self::to_host`].
    pub fn from_host(
        shape: [usize; 2],
        first: Vec<f32>,
        second: Vec<f32>,
        step: usize,
        config: OptimizerConfig,
        device: &B::Device,
    ) -> Result<Self> {
        let n = shape[0] * shape[1];
        if first.len() != n || second.len() != n {
            return Err(MassingError::checkpoint(format!(
                "optimizer moments have {} / {} values, expected {n}",
                first.len(),
                second.len()
            )));
        }
        Ok(Self {
            first: matrix_tensor(first, shape, device),
            second: matrix_tensor(second, shape, device),
            config,
            step,
        })
    }

    /// Apply one Adam update and return the new parameter.
    pub fn step(&mut self, param: Tensor<B, 2>, grad: Tensor<B, 2>, learning_rate: f32) -> Tensor<B, 2> {
        self.step += 1;
        let OptimizerConfig {
            beta_1,
            beta_2,
            epsilon,
        } = self.config;

        self.first = self.first.clone() * beta_1 + grad.clone() * (1.0 - beta_1);
        self.second = self.second.clone() * beta_2 + grad.powf_scalar(2.0) * (1.0 - beta_2);

        let t = self.step as i32;
        let first_hat = self.first.clone() / (1.0 - beta_1.powi(t));
        let second_hat = self.second.clone() / (1.0 - beta_2.powi(t));

        param - first_hat / (second_hat.sqrt() + epsilon) * learning_rate
    }

    /// Number of updates applied.
    pub fn current_step(&self) -> usize {
        self.step
    }

    /// First and second moments on the host.
    pub fn to_host(&self) -> Result<(Vec<f32>, Vec<f32>)> {
        Ok((to_host(self.first.clone())?, to_host(self.second.clone())?))
    }
}

/// Global L2 norm of a set of gradient tensors.
pub fn global_norm<B: Backend>(grads: &[Tensor<B, 2>]) -> Result<f32> {
    let mut total = 0.0f32;
    for g in grads {
        total += scalar(g.clone().powf_scalar(2.0).sum())?;
    }
    Ok(total.sqrt())
}

/// Scale `grads` so their global norm does not exceed `max_norm`.
pub fn clip_global_norm<B: Backend>(grads: Vec<Tensor<B, 2>>, norm: f32, max_norm: f32) -> Vec<Tensor<B, 2>> {
    if max_norm <= 0.0 || norm <= max_norm {
        return grads;
    }
    let scale = max_norm / norm;
    grads.into_iter().map(|g| g * scale).collect()
}

/// Adam moments of one latent row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMoments {
    /// First moment.
    pub first: Vec<f32>,
    /// Second moment.
    pub second: Vec<f32>,
    /// Updates applied to this row.
    pub step: usize,
}

impl RowMoments {
    fn zeros(dim: usize) -> Self {
        Self {
            first: vec![0.0; dim],
            second: vec![0.0; dim],
            step: 0,
        }
    }
}

/// Host-side Adam over rows of a latent table.
#[derive(Debug, Clone)]
pub struct LatentAdam {
    config: OptimizerConfig,
    rows: Vec<RowMoments>,
}

impl LatentAdam {
    /// Zeroed moments for `num_rows` codes of dimension `dim`.
    pub fn new(num_rows: usize, dim: usize, config: OptimizerConfig) -> Self {
        Self {
            config,
            rows: vec![RowMoments::zeros(dim); num_rows],
        }
    }

    /// Restore from saved rows.
    pub fn from_rows(config: OptimizerConfig, rows: Vec<RowMoments>) -> Self {
        Self { config, rows }
    }

    /// Per-row moments.
    pub fn rows(&self) -> &[RowMoments] {
        &self.rows
    }

    /// Update `code` (row `row`) in place from `grad`.
    pub fn step(&mut self, row: usize, code: &mut [f32], grad: &[f32], learning_rate: f32) -> Result<()> {
        let OptimizerConfig {
            beta_1,
            beta_2,
            epsilon,
        } = self.config;
        let moments = self
            .rows
            .get_mut(row)
            .ok_or_else(|| MassingError::data(format!("no optimizer state for latent row {row}")))?;
        if code.len() != grad.len() || code.len() != moments.first.len() {
            return Err(MassingError::data(format!(
                "latent row {row}: code has {} values, gradient {}, optimizer {}",
                code.len(),
                grad.len(),
                moments.first.len()
            )));
        }

        moments.step += 1;
        let t = moments.step as i32;
        let c1 = 1.0 - beta_1.powi(t);
        let c2 = 1.0 - beta_2.powi(t);
        for i in 0..code.len() {
            let g = grad[i];
            moments.first[i] = beta_1 * moments.first[i] + (1.0 - beta_1) * g;
            moments.second[i] = beta_2 * moments.second[i] + (1.0 - beta_2) * g * g;
            let m_hat = moments.first[i] / c1;
            let v_hat = moments.second[i] / c2;
            code[i] -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
        }
        Ok(())
    }
}
