//! Generalized winding number inside/outside test.
//!
//! The winding number of a closed, consistently oriented surface is 1 for
//! points inside and 0 outside (or -1 inside for inverted orientation). It
//! degrades gracefully near the surface, where ray-parity tests are fragile.
//! Each face contributes its signed solid angle, computed with the
//! Van Oosterom & Strackee formula in f64.

use std::f64::consts::PI;

use crate::mesh::TriangleMesh;
use crate::types::Point3;

/// Signed solid angle subtended by triangle `abc` as seen from `p`.
pub fn solid_angle(p: Point3, a: Point3, b: Point3, c: Point3) -> f64 {
    let to64 = |v: Point3| [v.x as f64, v.y as f64, v.z as f64];
    let [ax, ay, az] = to64(a - p);
    let [bx, by, bz] = to64(b - p);
    let [cx, cy, cz] = to64(c - p);

    let la = (ax * ax + ay * ay + az * az).sqrt();
    let lb = (bx * bx + by * by + bz * bz).sqrt();
    let lc = (cx * cx + cy * cy + cz * cz).sqrt();

    let det = ax * (by * cz - bz * cy) - ay * (bx * cz - bz * cx) + az * (bx * cy - by * cx);
    let ab = ax * bx + ay * by + az * bz;
    let bc = bx * cx + by * cy + bz * cz;
    let ca = cx * ax + cy * ay + cz * az;
    let denom = la * lb * lc + ab * lc + bc * la + ca * lb;

    2.0 * det.atan2(denom)
}

/// Winding number of `mesh` around `p`.
pub fn winding_number(mesh: &TriangleMesh, p: Point3) -> f64 {
    let total: f64 = (0..mesh.num_faces())
        .map(|f| {
            let [a, b, c] = mesh.triangle(f);
            solid_angle(p, a, b, c)
        })
        .sum();
    total / (4.0 * PI)
}

/// True if `p` is enclosed by `mesh` (|winding| >= 0.5).
pub fn is_inside(mesh: &TriangleMesh, p: Point3) -> bool {
    winding_number(mesh, p).abs() >= 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_winding() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::splat(1.0));
        assert!((winding_number(&mesh, Point3::splat(0.5)) - 1.0).abs() < 1e-9);
        assert!(winding_number(&mesh, Point3::splat(2.0)).abs() < 1e-9);
        assert!(is_inside(&mesh, Point3::new(0.999, 0.001, 0.5)));
        assert!(!is_inside(&mesh, Point3::new(1.001, 0.5, 0.5)));
    }

    #[test]
    fn test_inverted_box_still_inside() {
        let mut mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::splat(1.0));
        for f in &mut mesh.faces {
            f.swap(1, 2);
        }
        assert!((winding_number(&mesh, Point3::splat(0.5)) + 1.0).abs() < 1e-9);
        assert!(is_inside(&mesh, Point3::splat(0.5)));
    }
}
