//! Training configuration types.

use burn::config::Config;

use super::{ensure, SdfDecoderConfig};

/// Adam hyperparameters shared by the decoder and latent updates.
#[derive(Config, Debug)]
pub struct OptimizerConfig {
    /// Exponential decay of the first moment.
    #[config(default = 0.9)]
    pub beta_1: f32,

    /// Exponential decay of the second moment.
    #[config(default = 0.999)]
    pub beta_2: f32,

    /// Epsilon for numerical stability.
    #[config(default = 1e-8)]
    pub epsilon: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        ensure((0.0..1.0).contains(&self.beta_1), || {
            format!("beta_1 must be in [0, 1), got {}", self.beta_1)
        })?;
        ensure((0.0..1.0).contains(&self.beta_2), || {
            format!("beta_2 must be in [0, 1), got {}", self.beta_2)
        })?;
        ensure(self.epsilon > 0.0, || format!("epsilon must be positive, got {}", self.epsilon))
    }
}

/// Configuration for the auto-decoder trainer.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Decoder network configuration (includes the latent dimension).
    pub decoder: SdfDecoderConfig,

    /// Adam hyperparameters.
    #[config(default = "OptimizerConfig::new()")]
    pub optimizer: OptimizerConfig,

    /// Clamp distance `δ` applied to predictions and targets in the loss.
    #[config(default = 0.1)]
    pub clamp_distance: f32,

    /// Weight `λ` of the latent L2 prior.
    #[config(default = 1e-4)]
    pub latent_regularization: f32,

    /// Shapes per batch.
    #[config(default = 16)]
    pub batch_size: usize,

    /// Samples drawn per shape per batch.
    #[config(default = 4096)]
    pub samples_per_shape: usize,

    /// Initial decoder learning rate.
    #[config(default = 5e-4)]
    pub decoder_learning_rate: f64,

    /// Initial latent learning rate.
    #[config(default = 1e-3)]
    pub latent_learning_rate: f64,

    /// Epochs between learning-rate decays.
    #[config(default = 500)]
    pub lr_decay_interval: usize,

    /// Multiplicative learning-rate decay.
    #[config(default = 0.5)]
    pub lr_decay_factor: f64,

    /// Epoch budget `E`.
    #[config(default = 2000)]
    pub num_epochs: usize,

    /// Checkpoint every `K` epochs.
    #[config(default = 100)]
    pub checkpoint_interval: usize,

    /// Standard deviation of the initial latent codes.
    #[config(default = 0.01)]
    pub latent_init_std: f32,

    /// Global L2 clipping threshold for decoder gradients (0 = no clipping).
    #[config(default = 0.0)]
    pub gradient_clip: f32,

    /// Stop when the windowed mean loss improves by less than this.
    pub early_stop_tolerance: Option<f32>,

    /// Window, in epochs, for the early-stop plateau test.
    #[config(default = 50)]
    pub early_stop_window: usize,

    /// Grid resolution of the reconstruction sanity check run at checkpoints (0 = off).
    #[config(default = 0)]
    pub sanity_check_resolution: usize,

    /// Log epoch summaries at info level every this many epochs.
    #[config(default = 10)]
    pub log_interval: usize,

    /// Seed for latent initialization and batch shuffling.
    #[config(default = 42)]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(SdfDecoderConfig::new(256))
    }
}

impl TrainingConfig {
    /// Small model and budget for quick experiments and tests.
    pub fn fast(latent_dim: usize) -> Self {
        Self::new(SdfDecoderConfig::fast(latent_dim))
            .with_batch_size(4)
            .with_samples_per_shape(512)
            .with_decoder_learning_rate(2e-3)
            .with_latent_learning_rate(5e-3)
            .with_lr_decay_interval(200)
            .with_num_epochs(200)
            .with_checkpoint_interval(50)
    }

    /// Latent code dimension.
    pub fn latent_dim(&self) -> usize {
        self.decoder.latent_dim
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.decoder.validate()?;
        self.optimizer.validate()?;
        ensure(self.clamp_distance.is_finite() && self.clamp_distance > 0.0, || {
            format!("clamp_distance must be positive, got {}", self.clamp_distance)
        })?;
        ensure(
            self.latent_regularization.is_finite() && self.latent_regularization >= 0.0,
            || format!("latent_regularization must be non-negative, got {}", self.latent_regularization),
        )?;
        ensure(self.batch_size > 0, || "batch_size must be positive".into())?;
        ensure(self.samples_per_shape > 0, || "samples_per_shape must be positive".into())?;
        ensure(
            self.decoder_learning_rate.is_finite() && self.decoder_learning_rate > 0.0,
            || format!("decoder_learning_rate must be positive, got {}", self.decoder_learning_rate),
        )?;
        ensure(
            self.latent_learning_rate.is_finite() && self.latent_learning_rate > 0.0,
            || format!("latent_learning_rate must be positive, got {}", self.latent_learning_rate),
        )?;
        ensure(self.lr_decay_interval > 0, || "lr_decay_interval must be positive".into())?;
        ensure(self.lr_decay_factor > 0.0 && self.lr_decay_factor <= 1.0, || {
            format!("lr_decay_factor must be in (0, 1], got {}", self.lr_decay_factor)
        })?;
        ensure(self.num_epochs > 0, || "num_epochs must be positive".into())?;
        ensure(self.checkpoint_interval > 0, || "checkpoint_interval must be positive".into())?;
        ensure(self.latent_init_std >= 0.0 && self.latent_init_std.is_finite(), || {
            format!("latent_init_std must be non-negative, got {}", self.latent_init_std)
        })?;
        ensure(self.gradient_clip >= 0.0, || {
            format!("gradient_clip must be non-negative, got {}", self.gradient_clip)
        })?;
        if let Some(tolerance) = self.early_stop_tolerance {
            ensure(tolerance >= 0.0, || format!("early_stop_tolerance must be non-negative, got {tolerance}"))?;
            ensure(self.early_stop_window > 0, || "early_stop_window must be positive".into())?;
        }
        ensure(self.sanity_check_resolution != 1, || {
            "sanity_check_resolution must be 0 (off) or at least 2".into()
        })?;
        ensure(self.log_interval > 0, || "log_interval must be positive".into())
    }
}
