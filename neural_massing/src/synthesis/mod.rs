//! Latent-space synthesis of new massings.
//!
//! New shapes come from existing latent codes, by chained interpolation or
//! by latent arithmetic, or from samples of an unseen shape through the
//! latent optimizer. Each resulting code is reconstructed into a mesh.
//! Requests address codes through a [`LatentSource`]: a trained model's
//! latent table, or a [`SynthesisLedger`] that also remembers where every
//! synthesized code came from.

mod ledger;

pub use ledger::{LedgerEntry, Provenance, SynthesisLedger};

use burn::tensor::backend::AutodiffBackend;
use massing_core::TriangleMesh;
use rand::seq::index;
use rand::Rng;

use crate::config::{LatentOptimizerConfig, ReconstructionConfig};
use crate::data::SampleSet;
use crate::error::{MassingError, Result};
use crate::inference::{LatentFit, LatentOptimizer};
use crate::latent::{LatentCode, LatentTable};
use crate::model::TrainedModel;
use crate::reconstruct::Reconstructor;

/// Random interpolation factors are drawn from this range.
pub const RANDOM_FACTOR_RANGE: (f32, f32) = (0.25, 0.75);

/// Chained interpolation.
///
/// Starts from `codes[0]` and, for each factor `f_i`, moves `f_i` of the way
/// towards `codes[i + 1]`: `z ← z + f_i (z_{i+1} - z)`.
pub fn interpolate(codes: &[&LatentCode], factors: &[f32]) -> Result<LatentCode> {
    let (first, rest) = codes
        .split_first()
        .ok_or_else(|| MassingError::data("interpolation needs at least one latent code"))?;
    if rest.len() != factors.len() {
        return Err(MassingError::data(format!(
            "{} codes need {} interpolation factors, got {}",
            codes.len(),
            rest.len(),
            factors.len()
        )));
    }
    rest.iter()
        .zip(factors)
        .try_fold((*first).clone(), |z, (next, &f)| z.lerp(next, f))
}

/// `base + Σ add - Σ subtract`.
pub fn arithmetic(base: &LatentCode, add: &[&LatentCode], subtract: &[&LatentCode]) -> Result<LatentCode> {
    let z = add.iter().try_fold(base.clone(), |z, a| z.add_scaled(a, 1.0))?;
    subtract.iter().try_fold(z, |z, s| z.add_scaled(s, -1.0))
}

/// Anything that hands out latent codes by index.
pub trait LatentSource {
    /// Dimension of every code.
    fn latent_dim(&self) -> usize;

    /// Number of codes.
    fn num_latents(&self) -> usize;

    /// Code at `index`.
    fn latent(&self, index: usize) -> Result<&LatentCode>;
}

impl LatentSource for LatentTable {
    fn latent_dim(&self) -> usize {
        self.dim()
    }

    fn num_latents(&self) -> usize {
        self.len()
    }

    fn latent(&self, index: usize) -> Result<&LatentCode> {
        self.get(index)
    }
}

impl LatentSource for SynthesisLedger {
    fn latent_dim(&self) -> usize {
        self.dim()
    }

    fn num_latents(&self) -> usize {
        self.len()
    }

    fn latent(&self, index: usize) -> Result<&LatentCode> {
        Ok(&self.entry(index)?.latent)
    }
}

fn lookup<'s, S: LatentSource + ?Sized>(source: &'s S, indices: &[usize]) -> Result<Vec<&'s LatentCode>> {
    indices.iter().map(|&i| source.latent(i)).collect()
}

/// What to synthesize.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisRequest {
    /// An existing code, unchanged.
    Existing(usize),
    /// Chained interpolation over `sources` (see [`interpolate`]).
    Interpolate {
        /// Codes in chain order.
        sources: Vec<usize>,
        /// One factor per link.
        factors: Vec<f32>,
    },
    /// `base + Σ add - Σ subtract`.
    Arithmetic {
        /// Starting code.
        base: usize,
        /// Codes added.
        add: Vec<usize>,
        /// Codes subtracted.
        subtract: Vec<usize>,
    },
    /// Recover a code from samples of an unseen shape.
    Novel(SampleSet),
}

impl SynthesisRequest {
    /// Two distinct codes from `candidates`, mixed by a factor in [`RANDOM_FACTOR_RANGE`].
    ///
    /// The factor is rounded to three decimals.
    pub fn random_interpolation<R: Rng + ?Sized>(candidates: &[usize], rng: &mut R) -> Result<Self> {
        if candidates.len() < 2 {
            return Err(MassingError::data(format!(
                "random interpolation needs 2 candidates, got {}",
                candidates.len()
            )));
        }
        let picked = index::sample(rng, candidates.len(), 2);
        let (lo, hi) = RANDOM_FACTOR_RANGE;
        let factor = (rng.gen_range(lo..=hi) * 1000.0).round() / 1000.0;
        Ok(Self::Interpolate {
            sources: picked.iter().map(|i| candidates[i]).collect(),
            factors: vec![factor],
        })
    }

    /// Three distinct codes from `candidates`: `a + b - c`.
    pub fn random_arithmetic<R: Rng + ?Sized>(candidates: &[usize], rng: &mut R) -> Result<Self> {
        if candidates.len() < 3 {
            return Err(MassingError::data(format!(
                "random arithmetic needs 3 candidates, got {}",
                candidates.len()
            )));
        }
        let picked: Vec<usize> = index::sample(rng, candidates.len(), 3)
            .iter()
            .map(|i| candidates[i])
            .collect();
        Ok(Self::Arithmetic {
            base: picked[0],
            add: vec![picked[1]],
            subtract: vec![picked[2]],
        })
    }
}

/// A synthesized latent code and its surface.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// The code.
    pub latent: LatentCode,
    /// Reconstructed surface (empty if the field never crosses zero).
    pub mesh: TriangleMesh,
    /// Latent fit details for [`SynthesisRequest::Novel`].
    pub fit: Option<LatentFit>,
}

/// Turns synthesis requests into meshes using a frozen model.
pub struct Synthesizer<'a, B: AutodiffBackend> {
    model: &'a TrainedModel<B::InnerBackend>,
    reconstruction: ReconstructionConfig,
    inference: LatentOptimizerConfig,
}

impl<'a, B: AutodiffBackend> Synthesizer<'a, B> {
    /// Validate both configurations up front.
    pub fn new(
        model: &'a TrainedModel<B::InnerBackend>,
        reconstruction: ReconstructionConfig,
        inference: LatentOptimizerConfig,
    ) -> Result<Self> {
        reconstruction.validate()?;
        inference.validate()?;
        Ok(Self {
            model,
            reconstruction,
            inference,
        })
    }

    /// Resolve `request` to a latent code, addressing codes in `source`.
    pub fn resolve_latent<S: LatentSource + ?Sized>(
        &self,
        source: &S,
        request: &SynthesisRequest,
    ) -> Result<(LatentCode, Option<LatentFit>)> {
        if source.latent_dim() != self.model.decoder().latent_dim() {
            return Err(MassingError::data(format!(
                "latent source has dimension {}, decoder expects {}",
                source.latent_dim(),
                self.model.decoder().latent_dim()
            )));
        }
        match request {
            SynthesisRequest::Existing(i) => Ok((source.latent(*i)?.clone(), None)),
            SynthesisRequest::Interpolate { sources, factors } => {
                Ok((interpolate(&lookup(source, sources)?, factors)?, None))
            }
            SynthesisRequest::Arithmetic { base, add, subtract } => Ok((
                arithmetic(source.latent(*base)?, &lookup(source, add)?, &lookup(source, subtract)?)?,
                None,
            )),
            SynthesisRequest::Novel(samples) => {
                let fit = LatentOptimizer::<B>::new(self.model.decoder(), self.inference.clone())?.fit(samples)?;
                Ok((fit.latent.clone(), Some(fit)))
            }
        }
    }

    fn reconstruct(&self, latent: LatentCode, fit: Option<LatentFit>) -> Result<Synthesis> {
        let mesh = Reconstructor::new(self.model.decoder(), self.reconstruction.clone())?.reconstruct(&latent)?;
        Ok(Synthesis { latent, mesh, fit })
    }

    /// Synthesize against the model's own latent table.
    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<Synthesis> {
        let (latent, fit) = self.resolve_latent(self.model.latents(), request)?;
        self.reconstruct(latent, fit)
    }

    /// Synthesize against `ledger` and record the new code there.
    ///
    /// Returns the ledger index of the result. [`SynthesisRequest::Existing`]
    /// records nothing and returns the requested index.
    pub fn synthesize_into(
        &self,
        ledger: &mut SynthesisLedger,
        request: &SynthesisRequest,
    ) -> Result<(usize, Synthesis)> {
        let (latent, fit) = self.resolve_latent(&*ledger, request)?;
        let provenance = match request {
            SynthesisRequest::Existing(i) => {
                let synthesis = self.reconstruct(latent, fit)?;
                return Ok((*i, synthesis));
            }
            SynthesisRequest::Interpolate { sources, factors } => Provenance::Interpolation {
                sources: sources.clone(),
                factors: factors.clone(),
            },
            SynthesisRequest::Arithmetic { base, add, subtract } => Provenance::Arithmetic {
                base: *base,
                add: add.clone(),
                subtract: subtract.clone(),
            },
            SynthesisRequest::Novel(_) => Provenance::Recovered {
                loss: fit.as_ref().map_or(f32::NAN, |f| f.loss),
            },
        };
        let index = ledger.record(latent.clone(), provenance)?;
        log::info!("recorded synthesized latent {index} ({} entries)", ledger.len());
        Ok((index, self.reconstruct(latent, fit)?))
    }
}
