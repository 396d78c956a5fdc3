//! Regular sampling grids and the scalar fields evaluated on them.

use crate::error::{MeshError, Result};
use crate::types::{Aabb, Point3};

/// A regular lattice of `resolution^3` nodes spanning `bounds`.
///
/// Nodes are laid out x-major: node `(i, j, k)` lives at linear index
/// `(i * resolution + j) * resolution + k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    bounds: Aabb,
    resolution: usize,
}

impl GridSpec {
    /// Create a grid with `resolution` nodes per axis over `bounds`.
    pub fn new(bounds: Aabb, resolution: usize) -> Result<Self> {
        if resolution < 2 {
            return Err(MeshError::InvalidGrid {
                message: format!("resolution must be at least 2, got {resolution}"),
            });
        }
        let size = bounds.size();
        if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0) || !size.is_finite() {
            return Err(MeshError::InvalidGrid {
                message: format!("bounds must have positive finite extent, got {bounds:?}"),
            });
        }
        Ok(Self { bounds, resolution })
    }

    /// Grid bounds.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Nodes per axis.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Total number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.resolution * self.resolution * self.resolution
    }

    /// Distance between neighbouring nodes along each axis.
    pub fn spacing(&self) -> Point3 {
        self.bounds.size() / (self.resolution - 1) as f32
    }

    /// Linear index of node `(i, j, k)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.resolution + j) * self.resolution + k
    }

    /// World position of node `(i, j, k)`.
    #[inline]
    pub fn node_position(&self, i: usize, j: usize, k: usize) -> Point3 {
        self.grid_to_world(Point3::new(i as f32, j as f32, k as f32))
    }

    /// Map fractional grid coordinates to world space.
    #[inline]
    pub fn grid_to_world(&self, g: Point3) -> Point3 {
        self.bounds.min + g.scale_by(self.spacing())
    }

    /// Every node position in linear-index order.
    pub fn positions(&self) -> Vec<Point3> {
        let n = self.resolution;
        let mut out = Vec::with_capacity(self.num_nodes());
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    out.push(self.node_position(i, j, k));
                }
            }
        }
        out
    }
}

/// Scalar values sampled on a [`GridSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    spec: GridSpec,
    values: Vec<f32>,
}

impl ScalarField {
    /// Wrap values laid out in the grid's linear-index order.
    pub fn new(spec: GridSpec, values: Vec<f32>) -> Result<Self> {
        if values.len() != spec.num_nodes() {
            return Err(MeshError::FieldSizeMismatch {
                expected: spec.num_nodes(),
                actual: values.len(),
            });
        }
        Ok(Self { spec, values })
    }

    /// Sample a closure at every node.
    pub fn from_fn(spec: GridSpec, f: impl Fn(Point3) -> f32) -> Self {
        let values = spec.positions().into_iter().map(f).collect();
        Self { spec, values }
    }

    /// Grid description.
    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Raw values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at node `(i, j, k)`.
    #[inline]
    pub fn value(&self, i: usize, j: usize, k: usize) -> f32 {
        self.values[self.spec.index(i, j, k)]
    }

    /// True if some nodes lie below `level` and others at or above it.
    pub fn crosses_level(&self, level: f32) -> bool {
        let below = self.values.iter().any(|&v| v < level);
        let above = self.values.iter().any(|&v| v >= level);
        below && above
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid(resolution: usize) -> GridSpec {
        GridSpec::new(Aabb::new(Point3::splat(0.0), Point3::splat(1.0)), resolution).unwrap()
    }

    #[test]
    fn test_invalid_grids() {
        let bounds = Aabb::new(Point3::splat(0.0), Point3::splat(1.0));
        assert!(GridSpec::new(bounds, 1).is_err());
        let flat = Aabb::new(Point3::splat(0.0), Point3::new(1.0, 1.0, 0.0));
        assert!(GridSpec::new(flat, 8).is_err());
    }

    #[test]
    fn test_positions_follow_index_layout() {
        let spec = unit_grid(3);
        let positions = spec.positions();
        assert_eq!(positions.len(), 27);
        assert_eq!(positions[spec.index(2, 1, 0)], Point3::new(1.0, 0.5, 0.0));
        assert_eq!(positions[spec.index(0, 0, 2)], Point3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_field_size_checked() {
        let spec = unit_grid(2);
        assert!(matches!(
            ScalarField::new(spec, vec![0.0; 7]),
            Err(MeshError::FieldSizeMismatch { expected: 8, actual: 7 })
        ));
    }

    #[test]
    fn test_crosses_level() {
        let spec = unit_grid(4);
        assert!(!ScalarField::from_fn(spec, |_| 1.0).crosses_level(0.0));
        assert!(ScalarField::from_fn(spec, |p| p.x - 0.5).crosses_level(0.0));
    }
}
