//! Inference with a frozen decoder.

mod latent_optimizer;

pub use latent_optimizer::{ConvergenceWarning, LatentFit, LatentOptimizer};
