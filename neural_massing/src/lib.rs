//! # neural_massing
//!
//! Auto-decoder neural signed distance fields for building massings, on Burn.
//!
//! One shared decoder network maps `(latent code, point)` to a signed
//! distance; every training shape owns a latent code that is optimized jointly
//! with the decoder weights. After training, codes can be recovered for unseen
//! shapes, interpolated or combined, and turned back into meshes.
//!
//! ## Features
//!
//! - **Sampling**: exact signed-distance samples near the surface, in the padded bounding box and in the unit volume
//! - **Balanced batches**: every shape contributes the same number of rows per epoch
//! - **Decoder**: ReLU MLP with raw-input re-injection and a bounded output
//! - **Trainer**: clamped L1 loss plus latent prior, Adam on both paths, checkpoints, early stop
//! - **Inference**: latent recovery with a frozen decoder, marching-cubes reconstruction
//! - **Synthesis**: interpolation and latent arithmetic with a provenance ledger
//!
//! ## Quick Start
//!
//! ```ignore
//! use burn::backend::{Autodiff, NdArray};
//! use neural_massing::prelude::*;
//!
//! type MyBackend = Autodiff<NdArray>;
//!
//! let device = Default::default();
//! let sampler = MeshSampler::new(SamplerConfig::new())?;
//! let dataset = ShapeDataset::from_meshes(&meshes, &sampler)?;
//!
//! let mut trainer = AutoDecoderTrainer::<MyBackend>::new(TrainingConfig::fast(8), dataset.size(), &device)?
//!     .with_checkpoint_dir("runs/massing");
//! trainer.fit(&dataset)?;
//!
//! let model = trainer.freeze()?;
//! let mesh = model.reconstruct_shape(0, ReconstructionConfig::new())?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! massing_core (geometry)
//!     │
//!     ▼
//! MeshSampler ──► ShapeDataset ──► BatchSampler
//!                                       │
//!                                       ▼
//!                 AutoDecoderTrainer ──► Checkpoint
//!                  (SdfDecoder + LatentTable)
//!                                       │ freeze / load
//!                                       ▼
//!                                 TrainedModel
//!                     ┌─────────────────┼──────────────────┐
//!                     ▼                 ▼                  ▼
//!              LatentOptimizer    Reconstructor       Synthesizer
//! ```
//!
//! ## Feature Flags
//!
//! - `ndarray` (default): CPU backend
//! - `wgpu`: GPU backend via WebGPU

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod latent;
pub mod loss;
pub mod model;
pub mod nn;
pub mod reconstruct;
pub mod synthesis;
pub mod training;

mod tensor_ops;

pub use config::{
    LatentOptimizerConfig, OptimizerConfig, ReconstructionConfig, SamplerConfig, SdfDecoderConfig,
    TrainingConfig,
};
pub use error::{MassingError, Result};
pub use latent::{LatentCode, LatentTable};
pub use model::TrainedModel;
pub use nn::SdfDecoder;
pub use training::AutoDecoderTrainer;

pub use massing_core::{Point3, TriangleMesh};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{
        LatentOptimizerConfig, OptimizerConfig, ReconstructionConfig, SamplerConfig,
        SdfDecoderConfig, TrainingConfig,
    };
    pub use crate::data::{BatchSampler, MeshSampler, SampleSet, ShapeBatch, ShapeDataset};
    pub use crate::error::{MassingError, Result};
    pub use crate::inference::{ConvergenceWarning, LatentFit, LatentOptimizer};
    pub use crate::latent::{LatentCode, LatentTable};
    pub use crate::loss::{ClampedL1Loss, LossTerms};
    pub use crate::model::TrainedModel;
    pub use crate::nn::SdfDecoder;
    pub use crate::reconstruct::Reconstructor;
    pub use crate::synthesis::{
        arithmetic, interpolate, LatentSource, Provenance, Synthesis, SynthesisLedger,
        SynthesisRequest, Synthesizer,
    };
    pub use crate::training::{
        find_latest_checkpoint, AutoDecoderTrainer, Checkpoint, CheckpointMetadata, LossHistory,
        StopReason, TrainerState, TrainingReport,
    };

    pub use massing_core::{Aabb, Point3, TriangleMesh};
}
