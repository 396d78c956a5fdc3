//! Configuration types for neural_massing.
//!
//! Burn-style configuration structs for sampling, the decoder network,
//! training, latent inference and reconstruction. Every config exposes a
//! `validate()` that reports a [`MassingError::Configuration`](crate::MassingError)
//! and is called before any computation starts.

mod inference;
mod network;
mod sampling;
mod training;

pub use inference::{LatentOptimizerConfig, ReconstructionConfig};
pub use network::SdfDecoderConfig;
pub use sampling::SamplerConfig;
pub use training::{OptimizerConfig, TrainingConfig};

use crate::error::{MassingError, Result};

/// Fail with a configuration error unless `condition` holds.
pub(crate) fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(MassingError::config(message()))
    }
}
