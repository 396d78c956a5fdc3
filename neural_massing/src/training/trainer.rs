//! Auto-decoder trainer.
//!
//! The decoder weights and every shape's latent code are optimized jointly.
//! Both updates come out of one loss graph: each step uploads the batch's
//! distinct latent rows as a gradient-tracked slab, decodes every sample row
//! with its shape's code, and back-propagates the clamped L1 loss plus the
//! latent prior into the decoder parameters and the slab. Decoder gradients go
//! through one Adam state per tensor on the device and the results are loaded
//! back into the module; slab gradients are copied back and applied row by row
//! to the host-side [`LatentTable`].

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use instant::Instant;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{ReconstructionConfig, TrainingConfig};
use crate::data::{BatchSampler, ShapeBatch, ShapeDataset};
use crate::error::{MassingError, Result};
use crate::latent::LatentTable;
use crate::loss::ClampedL1Loss;
use crate::model::TrainedModel;
use crate::nn::SdfDecoder;
use crate::reconstruct::Reconstructor;
use crate::tensor_ops::{matrix_tensor, scalar, to_host};

use super::batch::SdfBatch;
use super::checkpoint::{checkpoint_dir_name, Checkpoint, CheckpointMetadata, OptimizerSnapshot, CHECKPOINT_VERSION};
use super::metrics::{EpochSummary, LossHistory, StepMetrics, StopReason, TrainingReport};
use super::optimizer::{clip_global_norm, global_norm, AdamState, LatentAdam, StepSchedule};

/// Lifecycle of a trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// Created, no step taken.
    Initialized,
    /// Inside the epoch loop; `epoch` epochs completed so far.
    Training {
        /// Completed epochs.
        epoch: usize,
    },
    /// A checkpoint of `epoch` completed epochs was just written or loaded.
    Checkpointed {
        /// Completed epochs.
        epoch: usize,
    },
    /// `fit` returned.
    Done,
}

/// Joint optimizer of the shared decoder and the per-shape latent codes.
pub struct AutoDecoderTrainer<B: AutodiffBackend> {
    config: TrainingConfig,
    decoder: SdfDecoder<B>,
    decoder_optimizer: Vec<AdamState<B::InnerBackend>>,
    latents: LatentTable,
    latent_optimizer: LatentAdam,
    loss: ClampedL1Loss,
    history: LossHistory,
    epoch: usize,
    total_steps: usize,
    state: TrainerState,
    checkpoint_dir: Option<PathBuf>,
    last_checkpoint: Option<PathBuf>,
    device: B::Device,
}

impl<B: AutodiffBackend> AutoDecoderTrainer<B> {
    /// Create a trainer for `num_shapes` shapes.
    ///
    /// The configuration is validated before anything is allocated.
    pub fn new(config: TrainingConfig, num_shapes: usize, device: &B::Device) -> Result<Self> {
        config.validate()?;
        if num_shapes == 0 {
            return Err(MassingError::data("cannot train on zero shapes"));
        }

        let decoder = SdfDecoder::new(&config.decoder, device)?;
        let decoder_optimizer = config
            .decoder
            .parameter_shapes()
            .into_iter()
            .map(|shape| AdamState::new(shape, config.optimizer.clone(), device))
            .collect();

        let mut rng = StdRng::seed_from_u64(config.seed);
        let latents = LatentTable::random(num_shapes, config.latent_dim(), config.latent_init_std, &mut rng);
        let latent_optimizer = LatentAdam::new(num_shapes, config.latent_dim(), config.optimizer.clone());

        log::info!(
            "auto-decoder trainer: {} shapes, latent dim {}, {} decoder parameters",
            num_shapes,
            config.latent_dim(),
            config.decoder.num_parameters()
        );

        Ok(Self {
            loss: ClampedL1Loss::new(config.clamp_distance, config.latent_regularization),
            config,
            decoder,
            decoder_optimizer,
            latents,
            latent_optimizer,
            history: LossHistory::new(),
            epoch: 0,
            total_steps: 0,
            state: TrainerState::Initialized,
            checkpoint_dir: None,
            last_checkpoint: None,
            device: device.clone(),
        })
    }

    /// Restore a trainer from a checkpoint.
    pub fn from_checkpoint(checkpoint: Checkpoint, device: &B::Device) -> Result<Self> {
        checkpoint.validate()?;
        let Checkpoint {
            metadata,
            config,
            decoder,
            latents,
            optimizer,
        } = checkpoint;
        config.validate()?;

        let decoder = SdfDecoder::from_host(config.decoder.clone(), &decoder, device)?;
        let decoder_optimizer = metadata
            .parameter_shapes
            .iter()
            .zip(optimizer.decoder)
            .map(|(&shape, (first, second))| {
                AdamState::from_host(
                    shape,
                    first,
                    second,
                    metadata.decoder_optimizer_step,
                    config.optimizer.clone(),
                    device,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let latent_optimizer = LatentAdam::from_rows(config.optimizer.clone(), optimizer.latents);

        Ok(Self {
            loss: ClampedL1Loss::new(config.clamp_distance, config.latent_regularization),
            config,
            decoder,
            decoder_optimizer,
            latents,
            latent_optimizer,
            history: metadata.loss_history,
            epoch: metadata.epoch,
            total_steps: metadata.total_steps,
            state: TrainerState::Checkpointed { epoch: metadata.epoch },
            checkpoint_dir: None,
            last_checkpoint: None,
            device: device.clone(),
        })
    }

    /// Load a checkpoint directory and resume from it.
    pub fn resume(dir: &Path, device: &B::Device) -> Result<Self> {
        let mut trainer = Self::from_checkpoint(Checkpoint::load(dir)?, device)?;
        trainer.last_checkpoint = Some(dir.to_path_buf());
        Ok(trainer)
    }

    /// Write periodic checkpoints under `dir` as `dir/checkpoint_<epoch>`.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Optimization steps taken.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Detached copy of the current decoder.
    pub fn decoder(&self) -> SdfDecoder<B::InnerBackend> {
        self.decoder.valid()
    }

    /// Current latent codes.
    pub fn latents(&self) -> &LatentTable {
        &self.latents
    }

    /// Mean loss of every completed epoch.
    pub fn loss_history(&self) -> &LossHistory {
        &self.history
    }

    /// Most recent checkpoint written or loaded.
    pub fn last_checkpoint(&self) -> Option<&Path> {
        self.last_checkpoint.as_deref()
    }

    fn diverged(&self, loss: f32) -> MassingError {
        log::error!(
            "training diverged at epoch {} step {} (loss {loss})",
            self.epoch,
            self.total_steps + 1
        );
        MassingError::TrainingDiverged {
            epoch: self.epoch,
            step: self.total_steps + 1,
            loss,
            last_checkpoint: self.last_checkpoint.clone(),
        }
    }

    fn learning_rates(&self) -> (f64, f64) {
        let decoder = StepSchedule::new(
            self.config.decoder_learning_rate,
            self.config.lr_decay_interval,
            self.config.lr_decay_factor,
        );
        let latent = StepSchedule::new(
            self.config.latent_learning_rate,
            self.config.lr_decay_interval,
            self.config.lr_decay_factor,
        );
        (decoder.at(self.epoch), latent.at(self.epoch))
    }

    /// Run one optimization step on `batch`.
    ///
    /// Nothing is updated if the loss or any gradient is NaN or infinite; the
    /// step fails with [`MassingError::TrainingDiverged`] instead.
    pub fn train_step(&mut self, batch: &ShapeBatch) -> Result<StepMetrics> {
        let sdf = SdfBatch::<B>::from_shape_batch(batch, self.latents.len(), &self.device)?;
        let dim = self.latents.dim();
        let (decoder_lr, latent_lr) = self.learning_rates();

        let slab = matrix_tensor::<B>(self.latents.gather(&sdf.shapes)?, [sdf.shapes.len(), dim], &self.device)
            .require_grad();

        let rows = slab.clone().select(0, sdf.latent_rows.clone());
        let pred = self.decoder.forward(rows.clone(), sdf.points.clone());
        let terms = self.loss.forward(pred, sdf.distances.clone(), rows);

        let loss = scalar(terms.total.clone())?;
        let reconstruction = scalar(terms.reconstruction.clone())?;
        let regularization = scalar(terms.regularization.clone())?;
        if !loss.is_finite() {
            return Err(self.diverged(loss));
        }

        let grads = terms.total.backward();
        let decoder_grads = self.decoder.gradients(&grads);
        let latent_grads = match slab.grad(&grads) {
            Some(g) => to_host(g)?,
            None => vec![0.0; sdf.shapes.len() * dim],
        };
        let gradient_norm = global_norm(&decoder_grads)?;
        if !gradient_norm.is_finite() || latent_grads.iter().any(|g| !g.is_finite()) {
            return Err(self.diverged(loss));
        }

        let decoder_grads = clip_global_norm(decoder_grads, gradient_norm, self.config.gradient_clip);
        let updated: Vec<_> = self
            .decoder
            .parameters()
            .into_iter()
            .zip(decoder_grads)
            .zip(self.decoder_optimizer.iter_mut())
            .map(|((param, grad), adam)| Tensor::from_inner(adam.step(param.inner(), grad, decoder_lr as f32)))
            .collect();
        self.decoder = self.decoder.clone().load_parameters(updated)?;

        for (row, &shape) in sdf.shapes.iter().enumerate() {
            let grad = &latent_grads[row * dim..(row + 1) * dim];
            let code = self.latents.get_mut(shape)?;
            self.latent_optimizer
                .step(shape, code.as_mut_slice(), grad, latent_lr as f32)?;
        }

        self.total_steps += 1;
        let metrics = StepMetrics {
            step: self.total_steps,
            loss,
            reconstruction,
            regularization,
            gradient_norm,
            decoder_learning_rate: decoder_lr,
            latent_learning_rate: latent_lr,
        };
        log::debug!(
            "step {}: loss={:.6} l1={:.6} prior={:.6} |g|={:.4}",
            metrics.step,
            metrics.loss,
            metrics.reconstruction,
            metrics.regularization,
            metrics.gradient_norm
        );
        Ok(metrics)
    }

    /// Run one full epoch: every shape contributes to exactly one batch.
    pub fn train_epoch(&mut self, sampler: &mut BatchSampler<'_>) -> Result<EpochSummary> {
        let start = Instant::now();
        sampler.start_epoch();
        let mut steps = Vec::with_capacity(sampler.batches_per_epoch(self.config.batch_size));
        while let Some(batch) = sampler.sample_batch(self.config.batch_size) {
            steps.push(self.train_step(&batch)?);
        }

        let summary = EpochSummary::from_steps(self.epoch, &steps, start.elapsed().as_secs_f32());
        self.history.push(summary.mean_loss);
        self.epoch += 1;
        self.state = TrainerState::Training { epoch: self.epoch };
        Ok(summary)
    }

    /// Train until the epoch budget is used up or the loss plateaus.
    pub fn fit(&mut self, dataset: &ShapeDataset) -> Result<TrainingReport> {
        self.fit_with(dataset, |_| ControlFlow::Continue(()))
    }

    /// Like [`Self::fit`], calling `on_epoch` after every completed epoch.
    ///
    /// Returning `ControlFlow::Break` stops training; the completed epoch is
    /// checkpointed (when a checkpoint directory is set) before returning.
    pub fn fit_with<F>(&mut self, dataset: &ShapeDataset, mut on_epoch: F) -> Result<TrainingReport>
    where
        F: FnMut(&EpochSummary) -> ControlFlow<()>,
    {
        if dataset.size() != self.latents.len() {
            return Err(MassingError::data(format!(
                "dataset has {} shapes but the trainer holds {} latent codes",
                dataset.size(),
                self.latents.len()
            )));
        }
        let seed = self.config.seed.wrapping_add(self.epoch as u64);
        let mut sampler = BatchSampler::new(dataset, self.config.samples_per_shape, seed)?;

        let mut stop_reason = StopReason::EpochBudget;
        let mut checkpointed_epoch = self.last_checkpoint.as_ref().map(|_| self.epoch);

        log::info!(
            "training from epoch {} to {} ({} batches per epoch)",
            self.epoch,
            self.config.num_epochs,
            sampler.batches_per_epoch(self.config.batch_size)
        );

        while self.epoch < self.config.num_epochs {
            let summary = self.train_epoch(&mut sampler)?;
            if self.epoch % self.config.log_interval == 0 || self.epoch == self.config.num_epochs {
                summary.log(self.config.num_epochs);
            }

            let cancelled = on_epoch(&summary).is_break();
            let plateaued = self
                .config
                .early_stop_tolerance
                .is_some_and(|tol| self.history.plateaued(self.config.early_stop_window, tol));

            if self.epoch % self.config.checkpoint_interval == 0 || cancelled || plateaued {
                self.write_periodic_checkpoint()?;
                checkpointed_epoch = Some(self.epoch);
            }
            if cancelled {
                log::info!("training cancelled after epoch {}", self.epoch);
                stop_reason = StopReason::Cancelled;
                break;
            }
            if plateaued {
                log::info!("loss plateaued, stopping early after epoch {}", self.epoch);
                stop_reason = StopReason::EarlyStop;
                break;
            }
        }

        if checkpointed_epoch != Some(self.epoch) {
            self.write_periodic_checkpoint()?;
        }
        self.state = TrainerState::Done;

        Ok(TrainingReport {
            epochs: self.epoch,
            total_steps: self.total_steps,
            final_loss: self.history.last().unwrap_or(f32::NAN),
            stop_reason,
            last_checkpoint: self.last_checkpoint.clone(),
        })
    }

    fn write_periodic_checkpoint(&mut self) -> Result<()> {
        let Some(base) = self.checkpoint_dir.clone() else {
            return Ok(());
        };
        let path = base.join(checkpoint_dir_name(self.epoch));
        self.save_checkpoint(&path)?;
        if self.config.sanity_check_resolution >= 2 {
            self.sanity_check();
        }
        Ok(())
    }

    /// Coarse reconstruction of shape 0; only logged.
    fn sanity_check(&self) {
        let config = ReconstructionConfig::new().with_resolution(self.config.sanity_check_resolution);
        let decoder = self.decoder.valid();
        let result = self
            .latents
            .get(0)
            .and_then(|latent| Reconstructor::new(&decoder, config)?.reconstruct(latent));
        match result {
            Ok(mesh) => log::info!(
                "sanity check at epoch {}: shape 0 -> {} vertices, {} faces",
                self.epoch,
                mesh.num_vertices(),
                mesh.num_faces()
            ),
            Err(e) => log::warn!("sanity check at epoch {} failed: {e}", self.epoch),
        }
    }

    /// Snapshot of the complete training state.
    pub fn checkpoint(&self) -> Result<Checkpoint> {
        let decoder_moments = self
            .decoder_optimizer
            .iter()
            .map(AdamState::to_host)
            .collect::<Result<Vec<_>>>()?;
        let latent_moments = self.latent_optimizer.rows().to_vec();

        Ok(Checkpoint {
            metadata: CheckpointMetadata {
                version: CHECKPOINT_VERSION,
                epoch: self.epoch,
                total_steps: self.total_steps,
                num_shapes: self.latents.len(),
                latent_dim: self.latents.dim(),
                parameter_shapes: self.config.decoder.parameter_shapes(),
                loss_history: self.history.clone(),
                decoder_optimizer_step: self
                    .decoder_optimizer
                    .first()
                    .map_or(0, AdamState::current_step),
                latent_optimizer_steps: latent_moments.iter().map(|r| r.step).collect(),
            },
            config: self.config.clone(),
            decoder: self.decoder.to_host()?,
            latents: self.latents.clone(),
            optimizer: OptimizerSnapshot {
                decoder: decoder_moments,
                latents: latent_moments,
            },
        })
    }

    /// Write the current state to `dir`.
    pub fn save_checkpoint(&mut self, dir: &Path) -> Result<()> {
        self.checkpoint()?.save(dir)?;
        self.last_checkpoint = Some(dir.to_path_buf());
        self.state = TrainerState::Checkpointed { epoch: self.epoch };
        Ok(())
    }

    /// Freeze the decoder and latents for inference.
    pub fn freeze(&self) -> Result<TrainedModel<B::InnerBackend>> {
        TrainedModel::new(self.decoder.valid(), self.latents.clone(), self.config.clone())
    }
}
