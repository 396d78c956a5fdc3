//! Mesh to (point, signed distance) sampling.

use std::borrow::Cow;

use massing_core::{Aabb, MeshSdf, Point3, TriangleMesh};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::config::SamplerConfig;
use crate::error::{MassingError, Result};

/// Sampled points with their exact signed distances (negative inside).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleSet {
    points: Vec<Point3>,
    distances: Vec<f32>,
}

impl SampleSet {
    /// Pair points with distances. Lengths must match and values must be finite.
    pub fn new(points: Vec<Point3>, distances: Vec<f32>) -> Result<Self> {
        if points.len() != distances.len() {
            return Err(MassingError::data(format!(
                "{} points but {} distances",
                points.len(),
                distances.len()
            )));
        }
        if let Some(i) = points.iter().position(|p| !p.is_finite()) {
            return Err(MassingError::data(format!("sample point {i} is not finite")));
        }
        if let Some(i) = distances.iter().position(|d| !d.is_finite()) {
            return Err(MassingError::data(format!("sample distance {i} is not finite")));
        }
        Ok(Self { points, distances })
    }

    /// Build from flat `[x, y, z, ...]` coordinates.
    pub fn from_flat(coords: &[f32], distances: Vec<f32>) -> Result<Self> {
        if coords.len() % 3 != 0 {
            return Err(MassingError::data(format!(
                "flat coordinate array has length {}, not a multiple of 3",
                coords.len()
            )));
        }
        let points = coords
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect();
        Self::new(points, distances)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sample positions.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Signed distances.
    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    /// Sample `i`.
    pub fn get(&self, i: usize) -> Option<(Point3, f32)> {
        Some((*self.points.get(i)?, *self.distances.get(i)?))
    }

    /// Copy of the samples at `indices`.
    ///
    /// Fails with a data error if any index is out of range.
    pub fn subset(&self, indices: &[usize]) -> Result<SampleSet> {
        let mut subset = SampleSet {
            points: Vec::with_capacity(indices.len()),
            distances: Vec::with_capacity(indices.len()),
        };
        for &i in indices {
            let (point, distance) = self.get(i).ok_or_else(|| {
                MassingError::data(format!("sample index {i} out of range for {} samples", self.len()))
            })?;
            subset.points.push(point);
            subset.distances.push(distance);
        }
        Ok(subset)
    }

    /// Append another set.
    pub fn extend(&mut self, other: &SampleSet) {
        self.points.extend_from_slice(&other.points);
        self.distances.extend_from_slice(&other.distances);
    }
}

/// Mixed near-surface / uniform sampler with exact signed distances.
#[derive(Debug, Clone)]
pub struct MeshSampler {
    config: SamplerConfig,
}

impl MeshSampler {
    /// Create a sampler, validating the configuration.
    pub fn new(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The sampler configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample `mesh`. Deterministic when the configuration carries a seed.
    ///
    /// Fails with a data error unless the mesh is a closed, consistently
    /// oriented solid with non-zero volume. A mesh whose faces do not share
    /// vertices is welded first and accepted if that closes it.
    pub fn sample(&self, mesh: &TriangleMesh) -> Result<SampleSet> {
        let mesh = if mesh.check_closed().is_ok() {
            Cow::Borrowed(mesh)
        } else {
            let mut welded = mesh.clone();
            let merged = welded.weld_coincident();
            log::debug!("welded {merged} duplicate vertices before sampling");
            Cow::Owned(welded)
        };
        let mesh = mesh.as_ref();
        let sdf = MeshSdf::new(mesh)?;
        let bbox = mesh
            .bounding_box()
            .ok_or_else(|| MassingError::data("mesh has no faces"))?
            .padded(self.config.bbox_padding);
        let volume = Aabb::new(
            Point3::from(self.config.volume_min),
            Point3::from(self.config.volume_max),
        );

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (n_near, n_bbox, n_volume) = self.config.split_counts();
        let sigmas = &self.config.near_surface_sigmas;

        let mut points = Vec::with_capacity(self.config.num_samples);
        for (i, p) in mesh.sample_surface(n_near, &mut rng).into_iter().enumerate() {
            let sigma = sigmas[i % sigmas.len()];
            let noise = Point3::new(
                rng.sample(StandardNormal),
                rng.sample(StandardNormal),
                rng.sample(StandardNormal),
            );
            points.push(p + noise * sigma);
        }
        points.extend((0..n_bbox).map(|_| uniform_in(&bbox, &mut rng)));
        points.extend((0..n_volume).map(|_| uniform_in(&volume, &mut rng)));

        let distances = sdf.signed_distances(&points);
        log::debug!(
            "sampled {} points ({n_near} near-surface, {n_bbox} bbox, {n_volume} volume), {} inside",
            points.len(),
            distances.iter().filter(|d| **d < 0.0).count()
        );
        SampleSet::new(points, distances)
    }
}

fn uniform_in<R: Rng + ?Sized>(bounds: &Aabb, rng: &mut R) -> Point3 {
    let t = Point3::new(rng.gen(), rng.gen(), rng.gen());
    bounds.min + t.scale_by(bounds.size())
}

#[cfg(test)]
mod tests {
    use super::*;
    use massing_core::MeshError;

    fn tower() -> TriangleMesh {
        TriangleMesh::axis_aligned_box(Point3::new(0.4, 0.4, 0.0), Point3::new(0.6, 0.6, 0.8))
    }

    fn sampler(seed: Option<u64>) -> MeshSampler {
        MeshSampler::new(SamplerConfig::new().with_num_samples(2000).with_seed(seed)).unwrap()
    }

    #[test]
    fn test_seeded_sampling_is_deterministic() {
        let a = sampler(Some(11)).sample(&tower()).unwrap();
        let b = sampler(Some(11)).sample(&tower()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2000);

        let c = sampler(Some(12)).sample(&tower()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_mix_contains_inside_and_outside() {
        let samples = sampler(Some(3)).sample(&tower()).unwrap();
        let inside = samples.distances().iter().filter(|d| **d < 0.0).count();
        assert!(inside > 100, "only {inside} inside samples");
        assert!(inside < samples.len() / 2);

        // Near-surface samples dominate: most distances are small.
        let near = samples.distances().iter().filter(|d| d.abs() < 0.05).count();
        assert!(near as f32 > 0.5 * samples.len() as f32);
    }

    #[test]
    fn test_signs_match_box_containment() {
        let samples = sampler(Some(5)).sample(&tower()).unwrap();
        let bbox = Aabb::new(Point3::new(0.4, 0.4, 0.0), Point3::new(0.6, 0.6, 0.8));
        for (p, d) in samples.points().iter().zip(samples.distances()) {
            if d.abs() > 1e-5 {
                assert_eq!(*d < 0.0, bbox.contains(*p), "sign mismatch at {p:?}: {d}");
            }
        }
    }

    #[test]
    fn test_degenerate_meshes_rejected() {
        let mut open = tower();
        open.faces.pop();
        let err = sampler(Some(1)).sample(&open).unwrap_err();
        assert!(err.is_data_error());
        assert!(matches!(err, MassingError::Mesh(MeshError::NonManifold { .. })));

        let flat = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::new(1.0, 1.0, 0.0));
        let err = sampler(Some(1)).sample(&flat).unwrap_err();
        assert!(matches!(err, MassingError::Mesh(MeshError::DegenerateVolume { .. })));
    }

    /// One vertex per face corner, as many exporters write closed solids.
    fn unwelded(mesh: &TriangleMesh) -> TriangleMesh {
        let vertices = (0..mesh.num_faces()).flat_map(|f| mesh.triangle(f)).collect();
        let faces = (0..mesh.num_faces()).map(|f| [3 * f, 3 * f + 1, 3 * f + 2]).collect();
        TriangleMesh::new(vertices, faces).unwrap()
    }

    #[test]
    fn test_unwelded_solid_is_sampled() {
        let split = unwelded(&tower());
        assert_eq!(split.num_vertices(), 36);
        assert!(split.check_closed().is_err());

        let samples = sampler(Some(9)).sample(&split).unwrap();
        assert_eq!(samples, sampler(Some(9)).sample(&tower()).unwrap());

        // Welding does not paper over a missing face.
        let mut open = split;
        open.faces.pop();
        assert!(sampler(Some(9)).sample(&open).unwrap_err().is_data_error());
    }

    #[test]
    fn test_sample_set_validation() {
        assert!(SampleSet::new(vec![Point3::splat(0.0)], vec![]).unwrap_err().is_data_error());
        assert!(SampleSet::new(vec![Point3::splat(0.0)], vec![f32::NAN]).is_err());
        assert!(SampleSet::from_flat(&[0.0, 1.0], vec![]).is_err());
        let set = SampleSet::from_flat(&[0.0, 1.0, 2.0], vec![0.5]).unwrap();
        assert_eq!(set.get(0), Some((Point3::new(0.0, 1.0, 2.0), 0.5)));
    }

    #[test]
    fn test_subset_checks_indices() {
        let set = SampleSet::from_flat(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![-0.25, 0.75]).unwrap();
        let picked = set.subset(&[1, 1, 0]).unwrap();
        assert_eq!(picked.distances(), &[0.75, 0.75, -0.25]);
        assert_eq!(picked.points()[2], Point3::splat(0.0));
        assert!(set.subset(&[0, 2]).unwrap_err().is_data_error());
    }
}
