//! Bounding volume hierarchy for exact nearest-triangle queries.
//!
//! Median split on the longest axis of each node. Queries descend the nearer
//! child first and prune any node whose box is farther than the best hit so far,
//! so the returned triangle is the true nearest, not an approximation.

use crate::mesh::TriangleMesh;
use crate::types::{Aabb, Point3};

/// Default maximum number of triangles per leaf.
pub const DEFAULT_LEAF_SIZE: usize = 4;

/// Nearest-surface query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    /// Index of the nearest face.
    pub face: usize,
    /// Closest point on that face.
    pub point: Point3,
    /// Barycentric coordinates of `point` within the face.
    pub barycentric: [f32; 3],
    /// Squared distance from the query to `point`.
    pub distance_squared: f32,
}

impl NearestHit {
    /// Unsigned distance to the surface.
    pub fn distance(&self) -> f32 {
        self.distance_squared.sqrt()
    }
}

enum BvhNode {
    Leaf {
        bounds: Aabb,
        faces: Vec<usize>,
    },
    Internal {
        bounds: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bounds(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Internal { bounds, .. } => bounds,
        }
    }
}

/// Triangle BVH over a [`TriangleMesh`].
///
/// Stores only face indices and boxes; queries take the mesh by reference.
pub struct TriangleBvh {
    root: Option<BvhNode>,
    num_faces: usize,
}

impl TriangleBvh {
    /// Build a hierarchy with at most `max_leaf_size` faces per leaf.
    pub fn build(mesh: &TriangleMesh, max_leaf_size: usize) -> Self {
        if mesh.is_empty() {
            return Self {
                root: None,
                num_faces: 0,
            };
        }

        let face_bounds: Vec<Aabb> = (0..mesh.num_faces())
            .map(|f| {
                let [a, b, c] = mesh.triangle(f);
                Aabb::from_triangle(a, b, c)
            })
            .collect();
        let faces: Vec<usize> = (0..face_bounds.len()).collect();
        let root = Self::build_node(&face_bounds, faces, max_leaf_size.max(1));

        Self {
            root: Some(root),
            num_faces: face_bounds.len(),
        }
    }

    fn build_node(face_bounds: &[Aabb], mut faces: Vec<usize>, max_leaf_size: usize) -> BvhNode {
        let bounds = faces
            .iter()
            .fold(Aabb::empty(), |acc, &f| acc.union(&face_bounds[f]));

        if faces.len() <= max_leaf_size {
            return BvhNode::Leaf { bounds, faces };
        }

        let axis = bounds.longest_axis();
        faces.sort_by(|&a, &b| {
            let ca = face_bounds[a].centroid().axis(axis);
            let cb = face_bounds[b].centroid().axis(axis);
            ca.total_cmp(&cb)
        });

        let right = faces.split_off(faces.len() / 2);
        BvhNode::Internal {
            bounds,
            left: Box::new(Self::build_node(face_bounds, faces, max_leaf_size)),
            right: Box::new(Self::build_node(face_bounds, right, max_leaf_size)),
        }
    }

    /// Number of faces indexed.
    pub fn num_faces(&self) -> usize {
        self.num_faces
    }

    /// True if the hierarchy holds no faces.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Bounds of the whole hierarchy.
    pub fn bounds(&self) -> Option<Aabb> {
        self.root.as_ref().map(|r| *r.bounds())
    }

    /// Nearest face to `query`. `mesh` must be the mesh the hierarchy was built from.
    pub fn nearest(&self, mesh: &TriangleMesh, query: Point3) -> Option<NearestHit> {
        let root = self.root.as_ref()?;
        let mut best: Option<NearestHit> = None;
        let mut best_dist_sq = f32::MAX;
        let mut stack: Vec<&BvhNode> = vec![root];

        while let Some(node) = stack.pop() {
            if node.bounds().distance_squared(query) >= best_dist_sq {
                continue;
            }
            match node {
                BvhNode::Leaf { faces, .. } => {
                    for &face in faces {
                        let [a, b, c] = mesh.triangle(face);
                        let (point, barycentric) = closest_point_on_triangle(query, a, b, c);
                        let distance_squared = (query - point).length_squared();
                        if distance_squared < best_dist_sq {
                            best_dist_sq = distance_squared;
                            best = Some(NearestHit {
                                face,
                                point,
                                barycentric,
                                distance_squared,
                            });
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    // Push the farther child first so the nearer one is popped next.
                    let dl = left.bounds().distance_squared(query);
                    let dr = right.bounds().distance_squared(query);
                    if dl < dr {
                        stack.push(right);
                        stack.push(left);
                    } else {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
        }
        best
    }
}

/// Closest point on triangle `abc` to `p`, with barycentric coordinates.
///
/// Voronoi-region classification (Ericson, Real-Time Collision Detection 5.1.5).
pub fn closest_point_on_triangle(p: Point3, a: Point3, b: Point3, c: Point3) -> (Point3, [f32; 3]) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, [1.0, 0.0, 0.0]);
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, [1.0 - v, v, 0.0]);
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, [0.0, 1.0 - w, w]);
    }

    // Degenerate (zero-area) faces fall through here with a zero denominator.
    let sum = va + vb + vc;
    if sum.abs() < f32::MIN_POSITIVE {
        return (a, [1.0, 0.0, 0.0]);
    }
    let v = vb / sum;
    let w = vc / sum;
    (a + ab * v + ac * w, [1.0 - v - w, v, w])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(mesh: &TriangleMesh, query: Point3) -> f32 {
        (0..mesh.num_faces())
            .map(|f| {
                let [a, b, c] = mesh.triangle(f);
                (query - closest_point_on_triangle(query, a, b, c).0).length_squared()
            })
            .fold(f32::MAX, f32::min)
    }

    #[test]
    fn test_single_triangle() {
        let mesh = TriangleMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let bvh = TriangleBvh::build(&mesh, DEFAULT_LEAF_SIZE);
        let hit = bvh.nearest(&mesh, Point3::new(0.25, 0.25, 1.0)).unwrap();
        assert_eq!(hit.face, 0);
        assert!(hit.point.z.abs() < 1e-6);
        assert!((hit.distance() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_mesh() {
        let bvh = TriangleBvh::build(&TriangleMesh::empty(), DEFAULT_LEAF_SIZE);
        assert!(bvh.is_empty());
        assert!(bvh.nearest(&TriangleMesh::empty(), Point3::splat(0.0)).is_none());
    }

    #[test]
    fn test_matches_brute_force() {
        let mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::new(1.0, 2.0, 0.5));
        let bvh = TriangleBvh::build(&mesh, 1);
        assert_eq!(bvh.num_faces(), 12);

        let queries = [
            Point3::new(0.5, 0.5, 0.25),
            Point3::new(2.0, 0.5, 0.5),
            Point3::new(0.5, 0.5, -1.0),
            Point3::new(1.5, 2.5, 1.5),
            Point3::new(0.9, 1.9, 0.2),
        ];
        for q in queries {
            let hit = bvh.nearest(&mesh, q).unwrap();
            assert!((hit.distance_squared - brute_force(&mesh, q)).abs() < 1e-6, "query {q:?}");
        }
    }

    #[test]
    fn test_closest_point_regions() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);

        let (p, bary) = closest_point_on_triangle(Point3::new(-1.0, -1.0, 0.0), a, b, c);
        assert_eq!(p, a);
        assert_eq!(bary, [1.0, 0.0, 0.0]);

        let (p, _) = closest_point_on_triangle(Point3::new(0.5, -1.0, 0.0), a, b, c);
        assert!((p - Point3::new(0.5, 0.0, 0.0)).length() < 1e-6);

        let (p, _) = closest_point_on_triangle(Point3::new(1.0, 1.0, 0.0), a, b, c);
        assert!((p - Point3::new(0.5, 0.5, 0.0)).length() < 1e-6);
    }
}
