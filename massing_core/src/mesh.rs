//! Indexed triangle meshes.
//!
//! A [`TriangleMesh`] is the interchange format of the workspace: the sampler
//! consumes it, the isosurface extractor produces it, and the OBJ module reads
//! and writes it.

use std::collections::HashMap;

use rand::Rng;

use crate::error::{MeshError, Result};
use crate::types::{Aabb, Point3};

/// Minimum |volume| for a mesh to count as a solid.
pub const MIN_SOLID_VOLUME: f32 = 1e-9;

/// Weld tolerance of [`TriangleMesh::weld_coincident`], relative to the bounding box diagonal.
pub const WELD_RELATIVE_TOLERANCE: f32 = 1e-6;

/// Corner layout of [`TriangleMesh::axis_aligned_box`], unit cube coordinates.
const BOX_CORNERS: [[f32; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

/// Box faces, counter-clockwise seen from outside.
const BOX_FACES: [[usize; 3]; 12] = [
    [0, 2, 1],
    [0, 3, 2],
    [4, 5, 6],
    [4, 6, 7],
    [0, 1, 5],
    [0, 5, 4],
    [3, 7, 6],
    [3, 6, 2],
    [0, 4, 7],
    [0, 7, 3],
    [1, 2, 6],
    [1, 6, 5],
];

/// Triangle mesh with shared vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Triangles as vertex index triples.
    pub faces: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Create a mesh, checking that every face index is in range.
    pub fn new(vertices: Vec<Point3>, faces: Vec<[usize; 3]>) -> Result<Self> {
        for (face, tri) in faces.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i >= vertices.len()) {
                return Err(MeshError::IndexOutOfBounds {
                    face,
                    index,
                    vertex_count: vertices.len(),
                });
            }
        }
        Ok(Self { vertices, faces })
    }

    /// Mesh with no geometry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Closed box spanning `min`..`max` with outward-facing triangles.
    pub fn axis_aligned_box(min: Point3, max: Point3) -> Self {
        let size = max - min;
        let vertices = BOX_CORNERS
            .iter()
            .map(|&c| min + Point3::from(c).scale_by(size))
            .collect();
        Self {
            vertices,
            faces: BOX_FACES.to_vec(),
        }
    }

    /// True when the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Corner positions of a face.
    #[inline]
    pub fn triangle(&self, face: usize) -> [Point3; 3] {
        let [a, b, c] = self.faces[face];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Bounding box of the referenced vertices, or `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<Aabb> {
        if self.is_empty() {
            return None;
        }
        Aabb::from_points(&self.vertices)
    }

    /// Area of one face.
    pub fn face_area(&self, face: usize) -> f32 {
        let [a, b, c] = self.triangle(face);
        (b - a).cross(c - a).length() * 0.5
    }

    /// Total surface area.
    pub fn surface_area(&self) -> f32 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    /// Signed enclosed volume; positive for outward-oriented closed meshes.
    pub fn signed_volume(&self) -> f32 {
        let volume: f64 = (0..self.faces.len())
            .map(|f| {
                let [a, b, c] = self.triangle(f);
                a.dot(b.cross(c)) as f64
            })
            .sum();
        (volume / 6.0) as f32
    }

    /// Check that the surface is closed, 2-manifold and consistently oriented.
    ///
    /// Every directed edge must occur exactly once and be matched by exactly
    /// one occurrence of its reverse.
    pub fn check_closed(&self) -> Result<()> {
        let mut edges: HashMap<(usize, usize), usize> = HashMap::with_capacity(self.faces.len() * 3);
        for &[a, b, c] in &self.faces {
            for edge in [(a, b), (b, c), (c, a)] {
                *edges.entry(edge).or_insert(0) += 1;
            }
        }

        // Sorted so the reported edge does not depend on hash order.
        let mut keys: Vec<_> = edges.keys().copied().collect();
        keys.sort_unstable();
        for (from, to) in keys {
            let forward = edges[&(from, to)];
            let backward = edges.get(&(to, from)).copied().unwrap_or(0);
            if forward != 1 || backward != 1 {
                return Err(MeshError::NonManifold {
                    from,
                    to,
                    forward,
                    backward,
                });
            }
        }
        Ok(())
    }

    /// Validate that this mesh bounds a solid region.
    pub fn validate_solid(&self) -> Result<()> {
        if self.vertices.is_empty() || self.faces.is_empty() {
            return Err(MeshError::Empty);
        }
        if let Some(index) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(MeshError::NonFiniteVertex { index });
        }
        self.check_closed()?;

        let volume = self.signed_volume().abs();
        if !(volume > MIN_SOLID_VOLUME) {
            return Err(MeshError::DegenerateVolume { volume });
        }
        Ok(())
    }

    /// Translate every vertex.
    pub fn translate(&mut self, offset: Point3) {
        for v in &mut self.vertices {
            *v = *v + offset;
        }
    }

    /// Scale every vertex about the origin.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.vertices {
            *v = *v * factor;
        }
    }

    /// Swap the y and z axes, flipping face winding to keep orientation.
    pub fn swap_yz(&mut self) {
        for v in &mut self.vertices {
            std::mem::swap(&mut v.y, &mut v.z);
        }
        for f in &mut self.faces {
            f.swap(1, 2);
        }
    }

    /// Merge vertices closer than `tolerance` and remap faces onto the survivors.
    ///
    /// Faces that collapse onto fewer than three distinct vertices are dropped.
    /// The first occurrence of each position is kept, so the result does not
    /// depend on hash order. Returns the number of vertices removed.
    pub fn weld_vertices(&mut self, tolerance: f32) -> usize {
        let cell = if tolerance > 0.0 { tolerance } else { f32::EPSILON };
        let key = |p: Point3| {
            [
                (p.x / cell).round() as i64,
                (p.y / cell).round() as i64,
                (p.z / cell).round() as i64,
            ]
        };

        let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::with_capacity(self.vertices.len());
        let mut kept: Vec<Point3> = Vec::with_capacity(self.vertices.len());
        let mut remap = Vec::with_capacity(self.vertices.len());
        for &v in &self.vertices {
            let [kx, ky, kz] = key(v);
            // Neighbouring cells too, so points straddling a cell border still meet.
            let existing = (-1..=1)
                .flat_map(|dx| (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| [kx + dx, ky + dy, kz + dz])))
                .filter_map(|k| grid.get(&k))
                .flatten()
                .copied()
                .filter(|&i| (kept[i] - v).length() <= tolerance)
                .min();
            let index = existing.unwrap_or_else(|| {
                kept.push(v);
                grid.entry([kx, ky, kz]).or_default().push(kept.len() - 1);
                kept.len() - 1
            });
            remap.push(index);
        }

        let removed = self.vertices.len() - kept.len();
        self.vertices = kept;
        self.faces = self
            .faces
            .iter()
            .map(|&[a, b, c]| [remap[a], remap[b], remap[c]])
            .filter(|&[a, b, c]| a != b && b != c && a != c)
            .collect();
        removed
    }

    /// [`Self::weld_vertices`] with a tolerance scaled to the mesh size.
    pub fn weld_coincident(&mut self) -> usize {
        let Some(bbox) = Aabb::from_points(&self.vertices) else {
            return 0;
        };
        let diagonal = bbox.size().length();
        if !diagonal.is_finite() {
            return 0;
        }
        self.weld_vertices(diagonal * WELD_RELATIVE_TOLERANCE)
    }

    /// Draw `count` points uniformly over the surface (area-weighted).
    pub fn sample_surface<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Point3> {
        if self.is_empty() || count == 0 {
            return Vec::new();
        }

        let mut cumulative = Vec::with_capacity(self.faces.len());
        let mut total = 0.0f64;
        for f in 0..self.faces.len() {
            total += self.face_area(f) as f64;
            cumulative.push(total);
        }

        (0..count)
            .map(|_| {
                let target = rng.gen::<f64>() * total;
                let face = cumulative
                    .partition_point(|&c| c < target)
                    .min(self.faces.len() - 1);
                let [a, b, c] = self.triangle(face);

                let r1 = rng.gen::<f32>().sqrt();
                let r2 = rng.gen::<f32>();
                a * (1.0 - r1) + b * (r1 * (1.0 - r2)) + c * (r1 * r2)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_box_is_closed_solid() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 1.0, 3.0));
        mesh.validate_solid().unwrap();
        assert!((mesh.signed_volume() - 6.0).abs() < 1e-5);
        assert!((mesh.surface_area() - 22.0).abs() < 1e-4);
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let err = TriangleMesh::new(vec![Point3::splat(0.0)], vec![[0, 0, 1]]).unwrap_err();
        assert!(matches!(err, MeshError::IndexOutOfBounds { index: 1, .. }));
    }

    #[test]
    fn test_open_mesh_rejected() {
        let mut mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::splat(1.0));
        mesh.faces.pop();
        assert!(matches!(mesh.validate_solid(), Err(MeshError::NonManifold { .. })));
    }

    #[test]
    fn test_weld_restores_shared_edges() {
        let solid = TriangleMesh::axis_aligned_box(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 4.0));
        let vertices = (0..solid.num_faces()).flat_map(|f| solid.triangle(f)).collect();
        let faces = (0..solid.num_faces()).map(|f| [3 * f, 3 * f + 1, 3 * f + 2]).collect();
        let mut split = TriangleMesh::new(vertices, faces).unwrap();
        assert!(matches!(split.validate_solid(), Err(MeshError::NonManifold { .. })));

        assert_eq!(split.weld_coincident(), 28);
        assert_eq!(split.num_vertices(), 8);
        assert_eq!(split.num_faces(), 12);
        split.validate_solid().unwrap();
        assert!((split.signed_volume() - solid.signed_volume()).abs() < 1e-5);
    }

    #[test]
    fn test_weld_drops_collapsed_faces() {
        let mut mesh = TriangleMesh::new(
            vec![
                Point3::splat(0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1e-4, 0.0),
            ],
            vec![[0, 1, 2], [0, 1, 3]],
        )
        .unwrap();
        assert_eq!(mesh.weld_vertices(1e-3), 1);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.weld_vertices(1e-3), 0);
    }

    #[test]
    fn test_inconsistent_winding_rejected() {
        let mut mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::splat(1.0));
        mesh.faces[0].swap(1, 2);
        assert!(matches!(mesh.check_closed(), Err(MeshError::NonManifold { .. })));
    }

    #[test]
    fn test_flat_mesh_has_no_volume() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::new(1.0, 1.0, 0.0));
        assert!(matches!(mesh.validate_solid(), Err(MeshError::DegenerateVolume { .. })));
    }

    #[test]
    fn test_swap_yz_keeps_orientation() {
        let mut mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::new(1.0, 2.0, 3.0));
        mesh.swap_yz();
        assert!(mesh.signed_volume() > 0.0);
        let bbox = mesh.bounding_box().unwrap();
        assert_eq!(bbox.max, Point3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_surface_samples_lie_on_box() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::splat(1.0));
        let mut rng = StdRng::seed_from_u64(7);
        for p in mesh.sample_surface(500, &mut rng) {
            let on_face = [p.x, p.y, p.z]
                .iter()
                .any(|&c| c.abs() < 1e-5 || (c - 1.0).abs() < 1e-5);
            assert!(on_face, "{p:?} is not on the box surface");
        }
    }
}
