//! Inference-time configuration: latent recovery and reconstruction.

use burn::config::Config;
use massing_core::{Aabb, Point3};

use super::{ensure, OptimizerConfig, TrainingConfig};

/// Configuration for recovering a latent code with a frozen decoder.
#[derive(Config, Debug)]
pub struct LatentOptimizerConfig {
    /// Gradient steps to run.
    #[config(default = 800)]
    pub num_steps: usize,

    /// Initial learning rate.
    #[config(default = 5e-3)]
    pub learning_rate: f64,

    /// Steps between learning-rate decays.
    #[config(default = 400)]
    pub lr_decay_interval: usize,

    /// Multiplicative learning-rate decay.
    #[config(default = 0.1)]
    pub lr_decay_factor: f64,

    /// Samples drawn per step (0 = use every sample).
    #[config(default = 8000)]
    pub samples_per_step: usize,

    /// Clamp distance `δ`; should match training.
    #[config(default = 0.1)]
    pub clamp_distance: f32,

    /// Latent prior weight `λ`; should match training.
    #[config(default = 1e-4)]
    pub latent_regularization: f32,

    /// Standard deviation of the initial latent (0 = start at the origin).
    #[config(default = 0.0)]
    pub init_std: f32,

    /// Loss below which the fit counts as converged.
    #[config(default = 0.01)]
    pub tolerance: f32,

    /// Adam hyperparameters.
    #[config(default = "OptimizerConfig::new()")]
    pub optimizer: OptimizerConfig,

    /// Seed for initialization and subsampling.
    #[config(default = 0)]
    pub seed: u64,
}

impl Default for LatentOptimizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LatentOptimizerConfig {
    /// Defaults with the loss settings copied from a training configuration.
    pub fn from_training(training: &TrainingConfig) -> Self {
        Self::new()
            .with_clamp_distance(training.clamp_distance)
            .with_latent_regularization(training.latent_regularization)
            .with_optimizer(training.optimizer.clone())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.optimizer.validate()?;
        ensure(self.learning_rate.is_finite() && self.learning_rate > 0.0, || {
            format!("learning_rate must be positive, got {}", self.learning_rate)
        })?;
        ensure(self.lr_decay_interval > 0, || "lr_decay_interval must be positive".into())?;
        ensure(self.lr_decay_factor > 0.0 && self.lr_decay_factor <= 1.0, || {
            format!("lr_decay_factor must be in (0, 1], got {}", self.lr_decay_factor)
        })?;
        ensure(self.clamp_distance.is_finite() && self.clamp_distance > 0.0, || {
            format!("clamp_distance must be positive, got {}", self.clamp_distance)
        })?;
        ensure(self.latent_regularization >= 0.0, || {
            format!("latent_regularization must be non-negative, got {}", self.latent_regularization)
        })?;
        ensure(self.init_std >= 0.0 && self.init_std.is_finite(), || {
            format!("init_std must be non-negative, got {}", self.init_std)
        })?;
        ensure(self.tolerance >= 0.0, || format!("tolerance must be non-negative, got {}", self.tolerance))
    }
}

/// Configuration for dense-grid reconstruction.
#[derive(Config, Debug)]
pub struct ReconstructionConfig {
    /// Grid nodes per axis.
    #[config(default = 64)]
    pub resolution: usize,

    /// Minimum corner of the evaluated region.
    #[config(default = "[0.0, 0.0, 0.0]")]
    pub bounds_min: [f32; 3],

    /// Maximum corner of the evaluated region.
    #[config(default = "[1.0, 1.0, 1.0]")]
    pub bounds_max: [f32; 3],

    /// Level set to extract.
    #[config(default = 0.0)]
    pub iso_value: f32,

    /// Grid nodes decoded per forward pass.
    #[config(default = 32768)]
    pub chunk_size: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconstructionConfig {
    /// Evaluated region as a box.
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Point3::from(self.bounds_min), Point3::from(self.bounds_max))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        ensure(self.resolution >= 2, || {
            format!("resolution must be at least 2, got {}", self.resolution)
        })?;
        ensure(self.chunk_size > 0, || "chunk_size must be positive".into())?;
        ensure(self.iso_value.is_finite(), || "iso_value must be finite".into())?;
        ensure(
            (0..3).all(|i| self.bounds_min[i] < self.bounds_max[i]),
            || format!("bounds are empty: {:?}..{:?}", self.bounds_min, self.bounds_max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_training_copies_loss_settings() {
        let training = TrainingConfig::fast(8)
            .with_clamp_distance(0.05)
            .with_latent_regularization(1e-3);
        let config = LatentOptimizerConfig::from_training(&training);
        assert_eq!(config.clamp_distance, 0.05);
        assert_eq!(config.latent_regularization, 1e-3);
        config.validate().unwrap();
    }

    #[test]
    fn test_reconstruction_validation() {
        ReconstructionConfig::default().validate().unwrap();
        assert!(ReconstructionConfig::new().with_resolution(1).validate().is_err());
        assert!(ReconstructionConfig::new().with_chunk_size(0).validate().is_err());
        assert!(ReconstructionConfig::new()
            .with_bounds_min([0.0, 2.0, 0.0])
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconstruction.json");
        ReconstructionConfig::new().with_resolution(48).save(&path).unwrap();
        let loaded = ReconstructionConfig::load(&path).unwrap();
        assert_eq!(loaded.resolution, 48);
        loaded.validate().unwrap();

        let path = dir.path().join("latent.json");
        LatentOptimizerConfig::new().with_num_steps(25).save(&path).unwrap();
        assert_eq!(LatentOptimizerConfig::load(&path).unwrap().num_steps, 25);
    }
}
