//! Exact signed distance to a closed triangle mesh.

use rayon::prelude::*;

use crate::bvh::{TriangleBvh, DEFAULT_LEAF_SIZE};
use crate::error::Result;
use crate::mesh::TriangleMesh;
use crate::types::Point3;
use crate::winding;

/// Signed distance evaluator: BVH nearest point for magnitude, winding number for sign.
///
/// Negative inside, positive outside.
pub struct MeshSdf<'a> {
    mesh: &'a TriangleMesh,
    bvh: TriangleBvh,
}

impl<'a> MeshSdf<'a> {
    /// Build an evaluator. Fails unless the mesh is a closed solid, since a
    /// leaky surface has no well-defined inside.
    pub fn new(mesh: &'a TriangleMesh) -> Result<Self> {
        mesh.validate_solid()?;
        Ok(Self {
            mesh,
            bvh: TriangleBvh::build(mesh, DEFAULT_LEAF_SIZE),
        })
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &TriangleMesh {
        self.mesh
    }

    /// Unsigned distance to the surface.
    pub fn unsigned_distance(&self, p: Point3) -> f32 {
        self.bvh
            .nearest(self.mesh, p)
            .map_or(f32::INFINITY, |hit| hit.distance())
    }

    /// Signed distance at `p`.
    pub fn signed_distance(&self, p: Point3) -> f32 {
        let distance = self.unsigned_distance(p);
        if winding::is_inside(self.mesh, p) {
            -distance
        } else {
            distance
        }
    }

    /// Signed distances for many points, evaluated in parallel. Output order matches input.
    pub fn signed_distances(&self, points: &[Point3]) -> Vec<f32> {
        points.par_iter().map(|&p| self.signed_distance(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeshError;

    #[test]
    fn test_box_signed_distance() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::new(2.0, 1.0, 1.0));
        let sdf = MeshSdf::new(&mesh).unwrap();

        assert!((sdf.signed_distance(Point3::new(1.0, 0.5, 0.5)) + 0.5).abs() < 1e-6);
        assert!((sdf.signed_distance(Point3::new(3.0, 0.5, 0.5)) - 1.0).abs() < 1e-6);
        assert!((sdf.signed_distance(Point3::new(0.1, 0.5, 0.5)) + 0.1).abs() < 1e-6);

        // Corner region: distance to the vertex.
        let d = sdf.signed_distance(Point3::new(3.0, 2.0, 2.0));
        assert!((d - 3.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::splat(-1.0), Point3::splat(1.0));
        let sdf = MeshSdf::new(&mesh).unwrap();
        let points: Vec<Point3> = (0..64)
            .map(|i| Point3::new(i as f32 * 0.05 - 1.6, 0.3, -0.2))
            .collect();
        let batch = sdf.signed_distances(&points);
        for (p, d) in points.iter().zip(&batch) {
            assert_eq!(*d, sdf.signed_distance(*p));
        }
    }

    #[test]
    fn test_open_mesh_rejected() {
        let mut mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::splat(1.0));
        mesh.faces.truncate(10);
        assert!(matches!(MeshSdf::new(&mesh), Err(MeshError::NonManifold { .. })));
    }
}
