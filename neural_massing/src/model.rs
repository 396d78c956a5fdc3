//! Frozen decoder plus latent table.

use std::path::Path;

use burn::prelude::*;
use massing_core::TriangleMesh;

use crate::config::{ReconstructionConfig, TrainingConfig};
use crate::error::{MassingError, Result};
use crate::latent::{LatentCode, LatentTable};
use crate::nn::SdfDecoder;
use crate::reconstruct::Reconstructor;
use crate::training::Checkpoint;

/// A trained auto-decoder, read-only.
///
/// This is the handle reconstruction, latent recovery and synthesis work from;
/// training never mutates it.
#[derive(Debug, Clone)]
pub struct TrainedModel<B: Backend> {
    decoder: SdfDecoder<B>,
    latents: LatentTable,
    config: TrainingConfig,
}

impl<B: Backend> TrainedModel<B> {
    /// Bundle a decoder with its latent table.
    pub fn new(decoder: SdfDecoder<B>, latents: LatentTable, config: TrainingConfig) -> Result<Self> {
        if latents.dim() != decoder.latent_dim() {
            return Err(MassingError::data(format!(
                "latent table has dimension {}, decoder expects {}",
                latents.dim(),
                decoder.latent_dim()
            )));
        }
        Ok(Self {
            decoder,
            latents,
            config,
        })
    }

    /// Build from a loaded checkpoint.
    pub fn from_checkpoint(checkpoint: &Checkpoint, device: &B::Device) -> Result<Self> {
        checkpoint.validate()?;
        let decoder = SdfDecoder::from_host(checkpoint.config.decoder.clone(), &checkpoint.decoder, device)?;
        Self::new(decoder, checkpoint.latents.clone(), checkpoint.config.clone())
    }

    /// Load a checkpoint directory.
    pub fn load(dir: &Path, device: &B::Device) -> Result<Self> {
        Self::from_checkpoint(&Checkpoint::load(dir)?, device)
    }

    /// Frozen decoder.
    pub fn decoder(&self) -> &SdfDecoder<B> {
        &self.decoder
    }

    /// Trained latent codes.
    pub fn latents(&self) -> &LatentTable {
        &self.latents
    }

    /// Configuration the model was trained with.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Number of training shapes.
    pub fn num_shapes(&self) -> usize {
        self.latents.len()
    }

    /// Latent code of a training shape.
    pub fn latent(&self, shape: usize) -> Result<&LatentCode> {
        self.latents.get(shape)
    }

    /// Reconstruct a training shape.
    pub fn reconstruct_shape(&self, shape: usize, config: ReconstructionConfig) -> Result<TriangleMesh> {
        Reconstructor::new(&self.decoder, config)?.reconstruct(self.latent(shape)?)
    }
}
