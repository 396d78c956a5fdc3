//! Shape dataset and balanced batch sampling.
//!
//! Each epoch the shape order is shuffled once; batches are consecutive
//! slices of that order. Every shape in a batch contributes exactly
//! `samples_per_shape` rows, so all shapes receive equal weight per epoch.

use massing_core::{Point3, TriangleMesh};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};

use super::sampler::{MeshSampler, SampleSet};
use crate::error::{MassingError, Result};

/// One training shape.
#[derive(Debug, Clone)]
pub struct ShapeRecord {
    /// Index into the corpus; also the row of its latent code.
    pub index: usize,
    /// Human-readable name (usually the source file stem).
    pub name: String,
    /// Sampled points and distances.
    pub samples: SampleSet,
}

/// All training shapes, indexed by shape identity.
#[derive(Debug, Clone, Default)]
pub struct ShapeDataset {
    shapes: Vec<ShapeRecord>,
}

impl ShapeDataset {
    /// Empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape and return its index. Shapes without samples are rejected.
    pub fn push(&mut self, name: impl Into<String>, samples: SampleSet) -> Result<usize> {
        let name = name.into();
        if samples.is_empty() {
            return Err(MassingError::data(format!("shape {name:?} has no samples")));
        }
        let index = self.shapes.len();
        self.shapes.push(ShapeRecord { index, name, samples });
        Ok(index)
    }

    /// Sample every mesh and collect the results, in order.
    pub fn from_meshes<S: AsRef<str>>(meshes: &[(S, TriangleMesh)], sampler: &MeshSampler) -> Result<Self> {
        let mut dataset = Self::new();
        for (name, mesh) in meshes {
            let samples = sampler.sample(mesh).map_err(|e| match e {
                MassingError::Mesh(inner) => {
                    MassingError::data(format!("shape {:?}: {inner}", name.as_ref()))
                }
                other => other,
            })?;
            dataset.push(name.as_ref(), samples)?;
            log::info!("sampled shape {} ({})", dataset.size() - 1, name.as_ref());
        }
        Ok(dataset)
    }

    /// Number of shapes.
    pub fn size(&self) -> usize {
        self.shapes.len()
    }

    /// True if there are no shapes.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Shape by index.
    pub fn shape(&self, index: usize) -> Option<&ShapeRecord> {
        self.shapes.get(index)
    }

    /// All shapes in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ShapeRecord> {
        self.shapes.iter()
    }

    /// Total number of samples across shapes.
    pub fn total_samples(&self) -> usize {
        self.shapes.iter().map(|s| s.samples.len()).sum()
    }
}

/// A batch of rows, each tagged with the shape (latent row) it belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeBatch {
    /// Query points.
    pub points: Vec<Point3>,
    /// Target signed distances.
    pub distances: Vec<f32>,
    /// Shape index of every row.
    pub shape_indices: Vec<usize>,
}

impl ShapeBatch {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distinct shapes in order of first appearance.
    pub fn distinct_shapes(&self) -> Vec<usize> {
        let mut seen = Vec::new();
        for &s in &self.shape_indices {
            if !seen.contains(&s) {
                seen.push(s);
            }
        }
        seen
    }

    /// Check array lengths and that every shape index is below `num_shapes`.
    pub fn validate(&self, num_shapes: usize) -> Result<()> {
        if self.points.len() != self.distances.len() || self.points.len() != self.shape_indices.len() {
            return Err(MassingError::data(format!(
                "batch arrays disagree: {} points, {} distances, {} shape indices",
                self.points.len(),
                self.distances.len(),
                self.shape_indices.len()
            )));
        }
        if self.is_empty() {
            return Err(MassingError::data("batch is empty"));
        }
        if let Some(&s) = self.shape_indices.iter().find(|&&s| s >= num_shapes) {
            return Err(MassingError::data(format!(
                "batch references shape {s}, but only {num_shapes} latent codes exist"
            )));
        }
        Ok(())
    }
}

/// Per-epoch balanced batch sampler over a [`ShapeDataset`].
pub struct BatchSampler<'a> {
    dataset: &'a ShapeDataset,
    samples_per_shape: usize,
    rng: StdRng,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
}

impl<'a> BatchSampler<'a> {
    /// Create a sampler drawing `samples_per_shape` rows per shape per batch.
    pub fn new(dataset: &'a ShapeDataset, samples_per_shape: usize, seed: u64) -> Result<Self> {
        if dataset.is_empty() {
            return Err(MassingError::data("dataset has no shapes"));
        }
        if samples_per_shape == 0 {
            return Err(MassingError::config("samples_per_shape must be positive"));
        }
        Ok(Self {
            dataset,
            samples_per_shape,
            rng: StdRng::seed_from_u64(seed),
            order: Vec::new(),
            cursor: 0,
            epoch: 0,
        })
    }

    /// Shuffle the shape order and rewind. Returns the new epoch number (1-based).
    pub fn start_epoch(&mut self) -> usize {
        self.order = (0..self.dataset.size()).collect();
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        self.epoch += 1;
        self.epoch
    }

    /// Number of epochs started.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Shape order of the current epoch.
    pub fn epoch_order(&self) -> &[usize] {
        &self.order
    }

    /// Batches per epoch for a given batch size.
    pub fn batches_per_epoch(&self, batch_size: usize) -> usize {
        self.dataset.size().div_ceil(batch_size.max(1))
    }

    /// Next batch of up to `batch_size` shapes, or `None` once the epoch is exhausted.
    pub fn sample_batch(&mut self, batch_size: usize) -> Option<ShapeBatch> {
        if batch_size == 0 || self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + batch_size).min(self.order.len());
        let shapes: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let rows = shapes.len() * self.samples_per_shape;
        let mut batch = ShapeBatch {
            points: Vec::with_capacity(rows),
            distances: Vec::with_capacity(rows),
            shape_indices: Vec::with_capacity(rows),
        };
        let dataset = self.dataset;
        for shape in shapes {
            let samples = &dataset.shapes[shape].samples;
            for i in self.draw_rows(samples.len()) {
                batch.points.push(samples.points()[i]);
                batch.distances.push(samples.distances()[i]);
                batch.shape_indices.push(shape);
            }
        }
        Some(batch)
    }

    /// Row indices for one shape: without replacement when possible.
    fn draw_rows(&mut self, available: usize) -> Vec<usize> {
        if available >= self.samples_per_shape {
            index::sample(&mut self.rng, available, self.samples_per_shape).into_vec()
        } else {
            (0..self.samples_per_shape)
                .map(|_| self.rng.gen_range(0..available))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shape `s` has points with x = s so rows can be traced back to their shape.
    fn tagged_dataset(num_shapes: usize, samples: usize) -> ShapeDataset {
        let mut dataset = ShapeDataset::new();
        for s in 0..num_shapes {
            let points = (0..samples)
                .map(|i| Point3::new(s as f32, i as f32, 0.0))
                .collect();
            let distances = (0..samples).map(|i| -(s as f32) - i as f32 * 1e-3).collect();
            dataset
                .push(format!("shape_{s}"), SampleSet::new(points, distances).unwrap())
                .unwrap();
        }
        dataset
    }

    #[test]
    fn test_every_shape_contributes_equally() {
        let dataset = tagged_dataset(5, 100);
        let mut sampler = BatchSampler::new(&dataset, 16, 0).unwrap();
        assert_eq!(sampler.batches_per_epoch(2), 3);

        for _ in 0..3 {
            sampler.start_epoch();
            let mut counts = vec![0usize; 5];
            let mut batches = 0;
            while let Some(batch) = sampler.sample_batch(2) {
                batch.validate(5).unwrap();
                for &s in &batch.shape_indices {
                    counts[s] += 1;
                }
                batches += 1;
            }
            assert_eq!(batches, 3);
            assert!(counts.iter().all(|&c| c == 16), "{counts:?}");
        }
    }

    #[test]
    fn test_rows_pair_with_their_shape() {
        let dataset = tagged_dataset(4, 50);
        let mut sampler = BatchSampler::new(&dataset, 30, 9).unwrap();
        sampler.start_epoch();
        while let Some(batch) = sampler.sample_batch(3) {
            for ((p, d), &s) in batch.points.iter().zip(&batch.distances).zip(&batch.shape_indices) {
                assert_eq!(p.x, s as f32);
                assert!((d + s as f32 + p.y * 1e-3).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_rows_unique_when_enough_samples() {
        let dataset = tagged_dataset(1, 40);
        let mut sampler = BatchSampler::new(&dataset, 40, 1).unwrap();
        sampler.start_epoch();
        let batch = sampler.sample_batch(1).unwrap();
        let mut ys: Vec<i32> = batch.points.iter().map(|p| p.y as i32).collect();
        ys.sort_unstable();
        assert_eq!(ys, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_small_shapes_sampled_with_replacement() {
        let dataset = tagged_dataset(2, 3);
        let mut sampler = BatchSampler::new(&dataset, 10, 2).unwrap();
        sampler.start_epoch();
        let batch = sampler.sample_batch(2).unwrap();
        assert_eq!(batch.len(), 20);
        assert_eq!(batch.distinct_shapes().len(), 2);
    }

    #[test]
    fn test_order_reshuffled_per_epoch() {
        let dataset = tagged_dataset(12, 4);
        let mut sampler = BatchSampler::new(&dataset, 1, 5).unwrap();
        let mut orders = Vec::new();
        for _ in 0..4 {
            sampler.start_epoch();
            orders.push(sampler.epoch_order().to_vec());
        }
        assert!(orders.windows(2).any(|w| w[0] != w[1]));
        for order in &orders {
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..12).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let empty = ShapeDataset::new();
        assert!(BatchSampler::new(&empty, 4, 0).is_err());

        let mut dataset = ShapeDataset::new();
        assert!(dataset.push("empty", SampleSet::default()).is_err());

        let batch = ShapeBatch {
            points: vec![Point3::splat(0.0)],
            distances: vec![0.1],
            shape_indices: vec![3],
        };
        assert!(batch.validate(2).unwrap_err().is_data_error());
    }
}
