//! Dense-grid reconstruction of a latent code's surface.

use burn::prelude::*;
use massing_core::{extract_isosurface, GridSpec, ScalarField, TriangleMesh};

use crate::config::ReconstructionConfig;
use crate::error::Result;
use crate::latent::LatentCode;
use crate::nn::SdfDecoder;

/// Evaluates a frozen decoder on a regular grid and extracts the zero level set.
///
/// Grid nodes are decoded `chunk_size` at a time in x-major order, so the same
/// latent, decoder, bounds and resolution always give the same mesh.
pub struct Reconstructor<'a, B: Backend> {
    decoder: &'a SdfDecoder<B>,
    config: ReconstructionConfig,
    grid: GridSpec,
}

impl<'a, B: Backend> Reconstructor<'a, B> {
    /// Validate `config` and set up the grid.
    pub fn new(decoder: &'a SdfDecoder<B>, config: ReconstructionConfig) -> Result<Self> {
        config.validate()?;
        let grid = GridSpec::new(config.bounds(), config.resolution)?;
        Ok(Self { decoder, config, grid })
    }

    /// The evaluation grid.
    pub fn grid_spec(&self) -> &GridSpec {
        &self.grid
    }

    /// Decode `latent` at every grid node.
    pub fn evaluate_field(&self, latent: &LatentCode) -> Result<ScalarField> {
        let positions = self.grid.positions();
        let mut values = Vec::with_capacity(positions.len());
        for chunk in positions.chunks(self.config.chunk_size) {
            values.extend(self.decoder.evaluate(latent, chunk)?);
        }
        Ok(ScalarField::new(self.grid, values)?)
    }

    /// Extract the surface of `latent`.
    ///
    /// A field that never crosses the iso value gives an empty mesh.
    pub fn reconstruct(&self, latent: &LatentCode) -> Result<TriangleMesh> {
        let field = self.evaluate_field(latent)?;
        if !field.crosses_level(self.config.iso_value) {
            log::debug!(
                "field does not cross {} on a {}^3 grid; returning an empty mesh",
                self.config.iso_value,
                self.grid.resolution()
            );
            return Ok(TriangleMesh::empty());
        }
        let mesh = extract_isosurface(&field, self.config.iso_value);
        log::debug!(
            "reconstructed {} vertices, {} faces at resolution {}",
            mesh.num_vertices(),
            mesh.num_faces(),
            self.grid.resolution()
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::config::SdfDecoderConfig;

    type TestBackend = NdArray;

    #[test]
    fn test_untrained_zero_latent_gives_empty_mesh() {
        let device = Default::default();
        let decoder = SdfDecoder::<TestBackend>::new(&SdfDecoderConfig::fast(8), &device).unwrap();
        let reconstructor = Reconstructor::new(&decoder, ReconstructionConfig::new().with_resolution(8)).unwrap();
        let mesh = reconstructor.reconstruct(&LatentCode::zeros(8)).unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_chunking_does_not_change_field() {
        let device = Default::default();
        let config = SdfDecoderConfig::fast(4).with_zero_init_output(false).with_seed(5);
        let decoder = SdfDecoder::<TestBackend>::new(&config, &device).unwrap();
        let latent = LatentCode::new(vec![0.1, 0.2, -0.3, 0.4]);

        let whole = Reconstructor::new(&decoder, ReconstructionConfig::new().with_resolution(6))
            .unwrap()
            .evaluate_field(&latent)
            .unwrap();
        let chunked = Reconstructor::new(
            &decoder,
            ReconstructionConfig::new().with_resolution(6).with_chunk_size(7),
        )
        .unwrap()
        .evaluate_field(&latent)
        .unwrap();
        for (a, b) in whole.values().iter().zip(chunked.values()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let device = Default::default();
        let decoder = SdfDecoder::<TestBackend>::new(&SdfDecoderConfig::fast(4), &device).unwrap();
        assert!(Reconstructor::new(&decoder, ReconstructionConfig::new().with_resolution(1)).is_err());
    }
}
