//! Checkpoint save/load for training state.
//!
//! A checkpoint is a directory:
//! - `metadata.json`: progress, shapes of every payload, loss history, optimizer step counters
//! - `config.json`: the [`TrainingConfig`]
//! - `decoder.bin`: decoder parameters in parameter order
//! - `latents.bin`: the latent table, row-major
//! - `optimizer.bin`: Adam moments (decoder tensors, then latent rows)
//!
//! Binary payloads are little-endian `f32`. Everything is held on the host, so
//! a load followed by a save reproduces the files byte for byte.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::metrics::LossHistory;
use super::optimizer::RowMoments;
use crate::config::TrainingConfig;
use crate::error::{MassingError, Result};
use crate::latent::LatentTable;

/// Current on-disk format version.
pub const CHECKPOINT_VERSION: u32 = 1;

const METADATA_FILE: &str = "metadata.json";
const CONFIG_FILE: &str = "config.json";
const DECODER_FILE: &str = "decoder.bin";
const LATENTS_FILE: &str = "latents.bin";
const OPTIMIZER_FILE: &str = "optimizer.bin";

/// Checkpoint metadata stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Format version.
    pub version: u32,
    /// Completed epochs.
    pub epoch: usize,
    /// Optimization steps taken.
    pub total_steps: usize,
    /// Rows in the latent table.
    pub num_shapes: usize,
    /// Latent dimension.
    pub latent_dim: usize,
    /// `[rows, cols]` of every decoder parameter.
    pub parameter_shapes: Vec<[usize; 2]>,
    /// Mean loss of every completed epoch.
    pub loss_history: LossHistory,
    /// Adam step counter of the decoder parameters.
    pub decoder_optimizer_step: usize,
    /// Adam step counter of every latent row.
    pub latent_optimizer_steps: Vec<usize>,
}

/// Adam moments on the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizerSnapshot {
    /// `(first, second)` moments of every decoder parameter.
    pub decoder: Vec<(Vec<f32>, Vec<f32>)>,
    /// Moments of every latent row.
    pub latents: Vec<RowMoments>,
}

/// Complete training state.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Progress and layout.
    pub metadata: CheckpointMetadata,
    /// Configuration the run was started with.
    pub config: TrainingConfig,
    /// Decoder parameters in parameter order.
    pub decoder: Vec<Vec<f32>>,
    /// Per-shape latent codes.
    pub latents: LatentTable,
    /// Optimizer moments.
    pub optimizer: OptimizerSnapshot,
}

fn write_f32s(path: &Path, chunks: &[&[f32]]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for chunk in chunks {
        for v in chunk.iter() {
            writer.write_all(&v.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn read_f32s(path: &Path, expected: usize) -> Result<Vec<f32>> {
    let bytes = fs::read(path)?;
    if bytes.len() != expected * 4 {
        return Err(MassingError::checkpoint(format!(
            "{} holds {} bytes, expected {} ({} floats)",
            path.display(),
            bytes.len(),
            expected * 4,
            expected
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Split `values` into consecutive pieces of the given lengths.
fn split(values: Vec<f32>, lengths: impl IntoIterator<Item = usize>) -> Vec<Vec<f32>> {
    let mut rest = values.as_slice();
    let mut out = Vec::new();
    for n in lengths {
        let (head, tail) = rest.split_at(n.min(rest.len()));
        out.push(head.to_vec());
        rest = tail;
    }
    out
}

impl Checkpoint {
    /// Check that the payloads agree with the metadata.
    pub fn validate(&self) -> Result<()> {
        let m = &self.metadata;
        if m.version != CHECKPOINT_VERSION {
            return Err(MassingError::checkpoint(format!(
                "unsupported checkpoint version {} (expected {CHECKPOINT_VERSION})",
                m.version
            )));
        }
        if m.parameter_shapes != self.config.decoder.parameter_shapes() {
            return Err(MassingError::checkpoint(
                "parameter shapes in metadata do not match the decoder configuration",
            ));
        }
        if m.latent_dim != self.config.latent_dim() || self.latents.dim() != m.latent_dim {
            return Err(MassingError::checkpoint(format!(
                "latent dimension mismatch: metadata {}, config {}, table {}",
                m.latent_dim,
                self.config.latent_dim(),
                self.latents.dim()
            )));
        }
        if self.latents.len() != m.num_shapes || m.latent_optimizer_steps.len() != m.num_shapes {
            return Err(MassingError::checkpoint(format!(
                "metadata lists {} shapes, table has {}, optimizer has {}",
                m.num_shapes,
                self.latents.len(),
                m.latent_optimizer_steps.len()
            )));
        }
        let sizes_ok = self.decoder.len() == m.parameter_shapes.len()
            && self
                .decoder
                .iter()
                .zip(&m.parameter_shapes)
                .all(|(p, [r, c])| p.len() == r * c);
        if !sizes_ok {
            return Err(MassingError::checkpoint("decoder parameters do not match their shapes"));
        }
        let moments_ok = self.optimizer.decoder.len() == m.parameter_shapes.len()
            && self
                .optimizer
                .decoder
                .iter()
                .zip(&m.parameter_shapes)
                .all(|((a, b), [r, c])| a.len() == r * c && b.len() == r * c)
            && self.optimizer.latents.len() == m.num_shapes
            && self
                .optimizer
                .latents
                .iter()
                .all(|row| row.first.len() == m.latent_dim && row.second.len() == m.latent_dim);
        if !moments_ok {
            return Err(MassingError::checkpoint("optimizer moments do not match parameter shapes"));
        }
        Ok(())
    }

    /// Write the checkpoint to `dir`.
    ///
    /// Files are written into `<dir>.partial` first and renamed into place,
    /// so an interrupted save leaves no half-written `dir` behind. An existing
    /// checkpoint at `dir` is moved to `<dir>.previous` and deleted only once
    /// the new one is in place; [`Self::load`] falls back to it.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let staging = staging_dir(dir);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        fs::write(staging.join(METADATA_FILE), serde_json::to_string_pretty(&self.metadata)?)?;
        fs::write(staging.join(CONFIG_FILE), serde_json::to_string_pretty(&self.config)?)?;

        let decoder: Vec<&[f32]> = self.decoder.iter().map(Vec::as_slice).collect();
        write_f32s(&staging.join(DECODER_FILE), &decoder)?;

        let latents: Vec<&[f32]> = self.latents.iter().map(|c| c.as_slice()).collect();
        write_f32s(&staging.join(LATENTS_FILE), &latents)?;

        let moments: Vec<&[f32]> = self
            .optimizer
            .decoder
            .iter()
            .flat_map(|(a, b)| [a.as_slice(), b.as_slice()])
            .chain(
                self.optimizer
                    .latents
                    .iter()
                    .flat_map(|row| [row.first.as_slice(), row.second.as_slice()]),
            )
            .collect();
        write_f32s(&staging.join(OPTIMIZER_FILE), &moments)?;

        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)?;
        }
        let previous = previous_dir(dir);
        if dir.exists() {
            if previous.exists() {
                fs::remove_dir_all(&previous)?;
            }
            fs::rename(dir, &previous)?;
        }
        if let Err(e) = fs::rename(&staging, dir) {
            if previous.exists() {
                fs::rename(&previous, dir)?;
            }
            return Err(e.into());
        }
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }

        log::info!(
            "saved checkpoint to {} (epoch {}, {} shapes)",
            dir.display(),
            self.metadata.epoch,
            self.metadata.num_shapes
        );
        Ok(())
    }

    /// Read a checkpoint from `dir`.
    ///
    /// If a save was interrupted while replacing `dir`, the replaced
    /// checkpoint is read from `<dir>.previous` instead.
    pub fn load(dir: &Path) -> Result<Self> {
        if !checkpoint_exists(dir) {
            let previous = previous_dir(dir);
            if checkpoint_exists(&previous) {
                log::warn!(
                    "{} is incomplete, reading the replaced checkpoint {}",
                    dir.display(),
                    previous.display()
                );
                return Self::load(&previous);
            }
            return Err(MassingError::checkpoint(format!(
                "no complete checkpoint at {}",
                dir.display()
            )));
        }
        let metadata: CheckpointMetadata = serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE))?)?;
        let config: TrainingConfig = serde_json::from_str(&fs::read_to_string(dir.join(CONFIG_FILE))?)?;

        let param_sizes: Vec<usize> = metadata.parameter_shapes.iter().map(|[r, c]| r * c).collect();
        let total_params: usize = param_sizes.iter().sum();
        let latent_size = metadata.num_shapes * metadata.latent_dim;

        let decoder = split(read_f32s(&dir.join(DECODER_FILE), total_params)?, param_sizes.iter().copied());

        let latent_rows = split(
            read_f32s(&dir.join(LATENTS_FILE), latent_size)?,
            std::iter::repeat(metadata.latent_dim).take(metadata.num_shapes),
        );
        let latents = LatentTable::from_rows(metadata.latent_dim, latent_rows)?;

        let moments = read_f32s(&dir.join(OPTIMIZER_FILE), 2 * (total_params + latent_size))?;
        let moment_lengths = param_sizes
            .iter()
            .flat_map(|&n| [n, n])
            .chain(std::iter::repeat(metadata.latent_dim).take(2 * metadata.num_shapes));
        let mut pieces = split(moments, moment_lengths).into_iter();

        let mut decoder_moments = Vec::with_capacity(param_sizes.len());
        for _ in 0..param_sizes.len() {
            let first = pieces.next().unwrap_or_default();
            let second = pieces.next().unwrap_or_default();
            decoder_moments.push((first, second));
        }
        let mut latent_moments = Vec::with_capacity(metadata.num_shapes);
        for &step in &metadata.latent_optimizer_steps {
            let first = pieces.next().unwrap_or_default();
            let second = pieces.next().unwrap_or_default();
            latent_moments.push(RowMoments { first, second, step });
        }

        let checkpoint = Self {
            metadata,
            config,
            decoder,
            latents,
            optimizer: OptimizerSnapshot {
                decoder: decoder_moments,
                latents: latent_moments,
            },
        };
        checkpoint.validate()?;

        log::info!(
            "loaded checkpoint from {} (epoch {}, {} shapes)",
            dir.display(),
            checkpoint.metadata.epoch,
            checkpoint.metadata.num_shapes
        );
        Ok(checkpoint)
    }
}

fn sibling_dir(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    dir.with_file_name(name)
}

fn staging_dir(dir: &Path) -> PathBuf {
    sibling_dir(dir, ".partial")
}

fn previous_dir(dir: &Path) -> PathBuf {
    sibling_dir(dir, ".previous")
}

/// Directory name of the checkpoint written after `epoch` completed epochs.
pub fn checkpoint_dir_name(epoch: usize) -> String {
    format!("checkpoint_{epoch}")
}

/// True if every checkpoint file is present in `dir`.
pub fn checkpoint_exists(dir: &Path) -> bool {
    [METADATA_FILE, CONFIG_FILE, DECODER_FILE, LATENTS_FILE, OPTIMIZER_FILE]
        .iter()
        .all(|f| dir.join(f).is_file())
}

/// The complete `checkpoint_N` directory under `base_dir` with the highest `N`.
pub fn find_latest_checkpoint(base_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(base_dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter_map(|path| {
            let epoch = path
                .file_name()?
                .to_str()?
                .strip_prefix("checkpoint_")?
                .parse::<usize>()
                .ok()?;
            checkpoint_exists(&path).then_some((epoch, path))
        })
        .max_by_key(|(epoch, _)| *epoch)
        .map(|(_, path)| path)
}
