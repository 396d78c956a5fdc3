//! Latent codes and the per-shape latent table.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{MassingError, Result};

/// A fixed-length latent vector identifying one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatentCode(Vec<f32>);

impl LatentCode {
    /// Wrap a vector.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// The origin of latent space.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Gaussian sample with standard deviation `std`.
    pub fn random<R: Rng + ?Sized>(dim: usize, std: f32, rng: &mut R) -> Self {
        Self(
            (0..dim)
                .map(|_| rng.sample::<f32, _>(StandardNormal) * std)
                .collect(),
        )
    }

    /// Dimension.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Values as a slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Mutable values.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.0
    }

    /// Consume into the underlying vector.
    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Squared L2 norm.
    pub fn norm_squared(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum()
    }

    /// True if every value is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// `self + t * (other - self)`.
    pub fn lerp(&self, other: &LatentCode, t: f32) -> Result<LatentCode> {
        self.check_dim(other)?;
        Ok(Self(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| a + t * (b - a))
                .collect(),
        ))
    }

    /// `self + scale * other`.
    pub fn add_scaled(&self, other: &LatentCode, scale: f32) -> Result<LatentCode> {
        self.check_dim(other)?;
        Ok(Self(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| a + scale * b)
                .collect(),
        ))
    }

    fn check_dim(&self, other: &LatentCode) -> Result<()> {
        if self.dim() != other.dim() {
            return Err(MassingError::data(format!(
                "latent dimension mismatch: {} vs {}",
                self.dim(),
                other.dim()
            )));
        }
        Ok(())
    }
}

impl From<Vec<f32>> for LatentCode {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Per-shape latent codes, indexed by shape index.
///
/// Lives on the host; the trainer uploads only the rows touched by a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentTable {
    dim: usize,
    codes: Vec<LatentCode>,
}

impl LatentTable {
    /// Table of `num_shapes` Gaussian codes with standard deviation `std`.
    pub fn random<R: Rng + ?Sized>(num_shapes: usize, dim: usize, std: f32, rng: &mut R) -> Self {
        Self {
            dim,
            codes: (0..num_shapes).map(|_| LatentCode::random(dim, std, rng)).collect(),
        }
    }

    /// Table from explicit rows, all of dimension `dim`.
    pub fn from_rows(dim: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(MassingError::data(format!(
                "latent row {i} has dimension {}, expected {dim}",
                row.len()
            )));
        }
        Ok(Self {
            dim,
            codes: rows.into_iter().map(LatentCode::new).collect(),
        })
    }

    /// Latent dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of shapes.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// True if the table holds no shapes.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Code of a shape.
    pub fn get(&self, shape: usize) -> Result<&LatentCode> {
        self.codes
            .get(shape)
            .ok_or_else(|| MassingError::data(format!("unknown shape index {shape} (table has {})", self.len())))
    }

    /// Mutable code of a shape.
    pub fn get_mut(&mut self, shape: usize) -> Result<&mut LatentCode> {
        let len = self.len();
        self.codes
            .get_mut(shape)
            .ok_or_else(|| MassingError::data(format!("unknown shape index {shape} (table has {len})")))
    }

    /// Row-major concatenation of the given shapes' codes.
    pub fn gather(&self, shapes: &[usize]) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(shapes.len() * self.dim);
        for &s in shapes {
            out.extend_from_slice(self.get(s)?.as_slice());
        }
        Ok(out)
    }

    /// All codes.
    pub fn iter(&self) -> impl Iterator<Item = &LatentCode> {
        self.codes.iter()
    }

    /// Copy of every row.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.codes.iter().map(|c| c.as_slice().to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_lerp_endpoints() {
        let a = LatentCode::new(vec![0.1, -0.4, 2.0]);
        let b = LatentCode::new(vec![1.0, 0.3, -0.5]);
        assert_eq!(a.lerp(&b, 0.0).unwrap(), a);
        let end = a.lerp(&b, 1.0).unwrap();
        for (x, y) in end.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-6);
        }
        assert!(a.lerp(&LatentCode::zeros(2), 0.5).is_err());
    }

    #[test]
    fn test_random_table_is_seeded() {
        let t1 = LatentTable::random(3, 8, 0.01, &mut StdRng::seed_from_u64(1));
        let t2 = LatentTable::random(3, 8, 0.01, &mut StdRng::seed_from_u64(1));
        assert_eq!(t1, t2);
        assert!(t1.iter().all(|c| c.norm_squared() < 0.01));
    }

    #[test]
    fn test_gather_and_bounds() {
        let table = LatentTable::from_rows(2, vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(table.gather(&[1, 0]).unwrap(), vec![3.0, 4.0, 1.0, 2.0]);
        assert!(table.get(2).is_err());
        assert!(LatentTable::from_rows(2, vec![vec![1.0]]).is_err());
    }
}
