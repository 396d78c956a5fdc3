//! Host/tensor conversions.

use burn::prelude::*;
use massing_core::Point3;

use crate::error::{MassingError, Result};

/// Read a float tensor back to the host as `f32`.
pub(crate) fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| MassingError::Tensor {
            message: format!("{e:?}"),
        })
}

/// Read a single-element tensor back as a scalar.
pub(crate) fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32> {
    to_host(tensor)?.first().copied().ok_or_else(|| MassingError::Tensor {
        message: "expected a scalar, got an empty tensor".into(),
    })
}

/// `[n, 3]` tensor of point coordinates.
pub(crate) fn points_tensor<B: Backend>(points: &[Point3], device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f32> = points.iter().flat_map(|p| p.as_array()).collect();
    Tensor::from_data(TensorData::new(flat, [points.len(), 3]), device)
}

/// `[n, 1]` column tensor.
pub(crate) fn column_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len(), 1]), device)
}

/// `[rows, cols]` tensor from row-major host data.
pub(crate) fn matrix_tensor<B: Backend>(
    values: Vec<f32>,
    shape: [usize; 2],
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// `[n]` integer index tensor.
pub(crate) fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    Tensor::from_data(TensorData::new(data, [indices.len()]), device)
}
