//! Corpus normalization: bring a set of meshes into a shared unit frame.
//!
//! Each mesh is first anchored (translated) on its own, then the whole corpus
//! is scaled by one common factor so relative sizes survive, and finally
//! shifted by a fixed offset. With the default `CenterWithoutZ` anchor and
//! `(0.5, 0.5, 0)` offset, footprints are centred in the unit square and
//! stand on the `z = 0` plane.

use crate::error::{MeshError, Result};
use crate::mesh::TriangleMesh;
use crate::types::Point3;

/// How each mesh is positioned before corpus-wide scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorMode {
    /// Bounding-box minimum moves to the origin.
    MinBound,
    /// Vertex mean moves to the origin.
    Center,
    /// Bounding-box centre in x/y and minimum z move to the origin.
    #[default]
    CenterWithoutZ,
}

impl AnchorMode {
    /// Translation that anchors `mesh` at the origin.
    pub fn anchor_offset(self, mesh: &TriangleMesh) -> Option<Point3> {
        let bbox = mesh.bounding_box()?;
        let offset = match self {
            AnchorMode::MinBound => -bbox.min,
            AnchorMode::Center => {
                let sum = mesh.vertices.iter().fold(Point3::splat(0.0), |acc, &v| acc + v);
                -(sum / mesh.vertices.len() as f32)
            }
            AnchorMode::CenterWithoutZ => {
                let c = bbox.centroid();
                Point3::new(-c.x, -c.y, -bbox.min.z)
            }
        };
        Some(offset)
    }
}

/// Normalization settings for a training corpus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusNormalizer {
    /// Per-mesh anchor.
    pub anchor: AnchorMode,
    /// Offset applied after scaling.
    pub offset: Point3,
    /// Swap y and z before anchoring (for y-up sources).
    pub swap_yz: bool,
}

impl Default for CorpusNormalizer {
    fn default() -> Self {
        Self {
            anchor: AnchorMode::CenterWithoutZ,
            offset: Point3::new(0.5, 0.5, 0.0),
            swap_yz: false,
        }
    }
}

impl CorpusNormalizer {
    /// Normalize meshes in place. Returns the common scale factor applied.
    pub fn normalize(&self, meshes: &mut [TriangleMesh]) -> Result<f32> {
        for mesh in meshes.iter_mut() {
            if self.swap_yz {
                mesh.swap_yz();
            }
            let offset = self.anchor.anchor_offset(mesh).ok_or(MeshError::Empty)?;
            mesh.translate(offset);
        }

        let max_norm = meshes
            .iter()
            .flat_map(|m| m.vertices.iter())
            .map(|v| v.length())
            .fold(0.0f32, f32::max);
        if !(max_norm > 0.0) || !max_norm.is_finite() {
            return Err(MeshError::DegenerateVolume { volume: 0.0 });
        }

        let scale = 1.0 / max_norm;
        for mesh in meshes.iter_mut() {
            mesh.scale(scale);
            mesh.translate(self.offset);
        }
        log::debug!("normalized {} meshes, scale {scale}", meshes.len());
        Ok(scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_modes() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::new(1.0, 2.0, 3.0), Point3::new(3.0, 4.0, 5.0));
        assert_eq!(AnchorMode::MinBound.anchor_offset(&mesh), Some(Point3::new(-1.0, -2.0, -3.0)));
        assert_eq!(AnchorMode::Center.anchor_offset(&mesh), Some(Point3::new(-2.0, -3.0, -4.0)));
        assert_eq!(
            AnchorMode::CenterWithoutZ.anchor_offset(&mesh),
            Some(Point3::new(-2.0, -3.0, -3.0))
        );
        assert_eq!(AnchorMode::Center.anchor_offset(&TriangleMesh::empty()), None);
    }

    #[test]
    fn test_corpus_keeps_relative_scale() {
        let mut meshes = vec![
            TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::new(2.0, 2.0, 8.0)),
            TriangleMesh::axis_aligned_box(Point3::splat(10.0), Point3::new(12.0, 12.0, 14.0)),
        ];
        let scale = CorpusNormalizer::default().normalize(&mut meshes).unwrap();
        assert!(scale > 0.0);

        let tall = meshes[0].bounding_box().unwrap();
        let short = meshes[1].bounding_box().unwrap();
        assert!((tall.min.z).abs() < 1e-6);
        assert!((short.min.z).abs() < 1e-6);
        assert!((tall.centroid().x - 0.5).abs() < 1e-6);
        assert!((tall.size().z / short.size().z - 2.0).abs() < 1e-5);
        assert!(meshes
            .iter()
            .flat_map(|m| m.vertices.iter())
            .all(|v| (*v - Point3::new(0.5, 0.5, 0.0)).length() <= 1.0 + 1e-5));
    }
}
