//! Device-side training batches.

use burn::prelude::*;

use crate::data::ShapeBatch;
use crate::error::Result;
use crate::tensor_ops::{column_tensor, index_tensor, points_tensor};

/// A [`ShapeBatch`] uploaded to a device.
///
/// `latent_rows` index into a slab holding only the batch's distinct shapes,
/// listed in `shapes` order.
#[derive(Debug, Clone)]
pub struct SdfBatch<B: Backend> {
    /// Query points `[n, 3]`.
    pub points: Tensor<B, 2>,
    /// Target distances `[n, 1]`.
    pub distances: Tensor<B, 2>,
    /// Slab row of every query `[n]`.
    pub latent_rows: Tensor<B, 1, Int>,
    /// Global shape index of every slab row.
    pub shapes: Vec<usize>,
}

impl<B: Backend> SdfBatch<B> {
    /// Validate `batch` against `num_shapes` and upload it.
    pub fn from_shape_batch(batch: &ShapeBatch, num_shapes: usize, device: &B::Device) -> Result<Self> {
        batch.validate(num_shapes)?;
        let shapes = batch.distinct_shapes();
        let rows: Vec<usize> = batch
            .shape_indices
            .iter()
            .map(|s| shapes.iter().position(|t| t == s).unwrap_or_default())
            .collect();

        Ok(Self {
            points: points_tensor(&batch.points, device),
            distances: column_tensor(&batch.distances, device),
            latent_rows: index_tensor(&rows, device),
            shapes,
        })
    }

    /// Number of query rows.
    pub fn len(&self) -> usize {
        self.points.dims()[0]
    }

    /// True if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device of this batch.
    pub fn device(&self) -> B::Device {
        self.points.device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use massing_core::Point3;

    type TestBackend = NdArray;

    #[test]
    fn test_rows_index_distinct_shapes() {
        let batch = ShapeBatch {
            points: vec![Point3::splat(0.1), Point3::splat(0.2), Point3::splat(0.3)],
            distances: vec![0.0, 0.1, -0.1],
            shape_indices: vec![4, 1, 4],
        };
        let sdf = SdfBatch::<TestBackend>::from_shape_batch(&batch, 5, &Default::default()).unwrap();
        assert_eq!(sdf.shapes, vec![4, 1]);
        assert_eq!(sdf.len(), 3);
        let rows: Vec<i64> = sdf.latent_rows.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(rows, vec![0, 1, 0]);
    }

    #[test]
    fn test_unknown_shape_rejected() {
        let batch = ShapeBatch {
            points: vec![Point3::splat(0.1)],
            distances: vec![0.0],
            shape_indices: vec![3],
        };
        let err = SdfBatch::<TestBackend>::from_shape_batch(&batch, 3, &Default::default()).unwrap_err();
        assert!(err.is_data_error());
    }
}
