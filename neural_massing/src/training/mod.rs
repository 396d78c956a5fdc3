//! Auto-decoder training.
//!
//! This module provides:
//! - `AutoDecoderTrainer`: joint decoder/latent optimization loop
//! - `SdfBatch`: device-side batches with per-row latent indices
//! - Adam state for decoder tensors and latent rows, step-decay schedules
//! - Epoch metrics, loss history and training reports
//! - Checkpoint save/load for training resumption

mod batch;
mod checkpoint;
mod metrics;
mod optimizer;
mod trainer;

pub use batch::SdfBatch;
pub use checkpoint::{
    checkpoint_dir_name, checkpoint_exists, find_latest_checkpoint, Checkpoint, CheckpointMetadata,
    OptimizerSnapshot, CHECKPOINT_VERSION,
};
pub use metrics::{EpochSummary, LossHistory, StepMetrics, StopReason, TrainingReport};
pub use optimizer::{clip_global_norm, global_norm, AdamState, LatentAdam, RowMoments, StepSchedule};
pub use trainer::{AutoDecoderTrainer, TrainerState};
