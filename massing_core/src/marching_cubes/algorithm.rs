//! Table-driven marching cubes over a [`ScalarField`].

use std::collections::HashMap;

use super::field::ScalarField;
use super::tables;
use crate::mesh::TriangleMesh;
use crate::types::Point3;

/// Cell edges as (corner a, corner b, axis, offset of the edge origin from the cell origin).
const CELL_EDGES: [(usize, usize, usize, [usize; 3]); 12] = [
    (0, 1, 0, [0, 0, 0]),
    (2, 3, 0, [0, 1, 0]),
    (4, 5, 0, [0, 0, 1]),
    (6, 7, 0, [0, 1, 1]),
    (0, 2, 1, [0, 0, 0]),
    (1, 3, 1, [1, 0, 0]),
    (4, 6, 1, [0, 0, 1]),
    (5, 7, 1, [1, 0, 1]),
    (0, 4, 2, [0, 0, 0]),
    (1, 5, 2, [1, 0, 0]),
    (2, 6, 2, [0, 1, 0]),
    (3, 7, 2, [1, 1, 0]),
];

/// Fractional position of the crossing along an edge with values `va` and `vb`.
///
/// Falls back to the midpoint when the values are (nearly) equal.
#[inline]
pub fn crossing_parameter(va: f32, vb: f32) -> f32 {
    let denom = va - vb;
    if denom.abs() < 1e-10 {
        0.5
    } else {
        (va / denom).clamp(0.0, 1.0)
    }
}

/// Inside mask of a cell: bit `c` is set when corner `c` is below the level.
#[inline]
pub fn cube_configuration(corners: &[f32; 8]) -> u8 {
    corners
        .iter()
        .enumerate()
        .fold(0u8, |mask, (c, &v)| if v < 0.0 { mask | (1 << c) } else { mask })
}

/// Extract the `level` isosurface of `field`.
///
/// Values below `level` count as inside. Vertices on shared edges are welded,
/// and triangles are wound outward (away from the inside region), so a surface
/// that does not touch the grid boundary comes out closed. A field that never
/// crosses `level` yields an empty mesh.
pub fn extract_isosurface(field: &ScalarField, level: f32) -> TriangleMesh {
    let spec = *field.spec();
    let n = spec.resolution();
    let mut mesh = TriangleMesh::empty();
    if !field.crosses_level(level) {
        return mesh;
    }

    // Keyed by (origin node index, axis).
    let mut edge_vertices: HashMap<(usize, usize), usize> = HashMap::new();

    for z in 0..n - 1 {
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let mut corners = [0.0f32; 8];
                for (c, value) in corners.iter_mut().enumerate() {
                    *value = field.value(x + (c & 1), y + ((c >> 1) & 1), z + ((c >> 2) & 1)) - level;
                }

                let config = cube_configuration(&corners);
                if tables::triangle_count(config) == 0 {
                    continue;
                }

                let mut corner_ids = [0usize; 15];
                let mut count = 0;
                for edge in tables::triangle_edges(config) {
                    let (a, b, axis, [ox, oy, oz]) = CELL_EDGES[edge];
                    let (ix, iy, iz) = (x + ox, y + oy, z + oz);
                    let key = (spec.index(ix, iy, iz), axis);
                    let id = *edge_vertices.entry(key).or_insert_with(|| {
                        let t = crossing_parameter(corners[a], corners[b]);
                        let grid = Point3::new(ix as f32, iy as f32, iz as f32);
                        let grid = grid.with_axis(axis, grid.axis(axis) + t);
                        mesh.vertices.push(spec.grid_to_world(grid));
                        mesh.vertices.len() - 1
                    });
                    corner_ids[count] = id;
                    count += 1;
                }

                for tri in corner_ids[..count].chunks_exact(3) {
                    mesh.faces.push([tri[0], tri[1], tri[2]]);
                }
            }
        }
    }

    log::trace!(
        "isosurface at level {level}: {} vertices, {} faces",
        mesh.num_vertices(),
        mesh.num_faces()
    );
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marching_cubes::field::GridSpec;
    use crate::types::Aabb;

    fn sphere_field(resolution: usize, radius: f32) -> ScalarField {
        let spec = GridSpec::new(Aabb::new(Point3::splat(-1.0), Point3::splat(1.0)), resolution).unwrap();
        ScalarField::from_fn(spec, |p| p.length() - radius)
    }

    #[test]
    fn test_crossing_parameter() {
        assert_eq!(crossing_parameter(-1.0, 1.0), 0.5);
        assert!((crossing_parameter(-0.25, 0.75) - 0.25).abs() < 1e-6);
        assert_eq!(crossing_parameter(0.0, 0.0), 0.5);
    }

    #[test]
    fn test_cube_configuration() {
        assert_eq!(cube_configuration(&[1.0; 8]), 0);
        assert_eq!(cube_configuration(&[-1.0; 8]), 255);
        let mut corners = [1.0; 8];
        corners[3] = -0.5;
        assert_eq!(cube_configuration(&corners), 0b1000);
    }

    #[test]
    fn test_uniform_field_is_empty() {
        let spec = GridSpec::new(Aabb::new(Point3::splat(0.0), Point3::splat(1.0)), 8).unwrap();
        assert!(extract_isosurface(&ScalarField::from_fn(spec, |_| 0.3), 0.0).is_empty());
        assert!(extract_isosurface(&ScalarField::from_fn(spec, |_| -0.3), 0.0).is_empty());
    }

    #[test]
    fn test_sphere_is_closed_and_outward() {
        let mesh = extract_isosurface(&sphere_field(24, 0.6), 0.0);
        assert!(!mesh.is_empty());
        mesh.check_closed().unwrap();

        let expected = 4.0 / 3.0 * std::f32::consts::PI * 0.6f32.powi(3);
        let volume = mesh.signed_volume();
        assert!(volume > 0.0);
        assert!((volume - expected).abs() / expected < 0.05, "volume {volume} vs {expected}");

        for v in &mesh.vertices {
            assert!((v.length() - 0.6).abs() < 0.02);
        }
    }

    #[test]
    fn test_level_shifts_surface() {
        let mesh = extract_isosurface(&sphere_field(24, 0.6), 0.2);
        let bbox = mesh.bounding_box().unwrap();
        assert!((bbox.max.x - 0.8).abs() < 0.03);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let field = sphere_field(16, 0.5);
        assert_eq!(extract_isosurface(&field, 0.0), extract_isosurface(&field, 0.0));
    }
}
