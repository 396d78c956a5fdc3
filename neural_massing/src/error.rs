//! Error types for neural_massing.

use std::path::{Path, PathBuf};

use massing_core::MeshError;
use thiserror::Error;

fn describe_checkpoint(path: &Option<PathBuf>) -> String {
    path.as_deref()
        .map(Path::display)
        .map_or_else(|| "none".to_string(), |p| p.to_string())
}

/// Errors that can occur while sampling, training, inferring or reconstructing.
#[derive(Error, Debug)]
pub enum MassingError {
    /// Malformed input data: mismatched sample arrays, empty shapes, unknown shape indices.
    #[error("data error: {message}")]
    Data {
        /// Description of the data problem.
        message: String,
    },

    /// Input mesh rejected: not closed, non-manifold, zero volume or unparseable.
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),

    /// NaN or Inf in the loss or gradients. Training halts; the last checkpoint is the recovery point.
    #[error(
        "training diverged at epoch {epoch}, step {step} (loss = {loss}); last checkpoint: {}",
        describe_checkpoint(.last_checkpoint)
    )]
    TrainingDiverged {
        /// Epoch in which divergence was detected.
        epoch: usize,
        /// Global step at which divergence was detected.
        step: usize,
        /// Offending loss value (may itself be finite if only gradients diverged).
        loss: f32,
        /// Most recent checkpoint written by this trainer, if any.
        last_checkpoint: Option<PathBuf>,
    },

    /// Invalid hyperparameter combination, detected before any computation.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// Checkpoint is missing, truncated or inconsistent with its metadata.
    #[error("checkpoint error: {message}")]
    Checkpoint {
        /// Description of the checkpoint problem.
        message: String,
    },

    /// Tensor data could not be read back from the backend.
    #[error("tensor error: {message}")]
    Tensor {
        /// Description of the tensor problem.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MassingError {
    /// Shorthand for [`MassingError::Data`].
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Shorthand for [`MassingError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for [`MassingError::Checkpoint`].
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// True for errors caused by bad input data (including rejected meshes).
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Data { .. } | Self::Mesh(_))
    }
}

/// Result type alias for neural_massing operations.
pub type Result<T> = std::result::Result<T, MassingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diverged_message_names_checkpoint() {
        let err = MassingError::TrainingDiverged {
            epoch: 3,
            step: 40,
            loss: f32::NAN,
            last_checkpoint: Some(PathBuf::from("runs/checkpoint_2")),
        };
        let msg = err.to_string();
        assert!(msg.contains("epoch 3"));
        assert!(msg.contains("checkpoint_2"));

        let err = MassingError::TrainingDiverged {
            epoch: 0,
            step: 1,
            loss: f32::INFINITY,
            last_checkpoint: None,
        };
        assert!(err.to_string().ends_with("none"));
    }

    #[test]
    fn test_mesh_errors_are_data_errors() {
        assert!(MassingError::from(MeshError::Empty).is_data_error());
        assert!(MassingError::data("x").is_data_error());
        assert!(!MassingError::config("x").is_data_error());
    }
}
