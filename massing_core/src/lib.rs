//! # massing_core
//!
//! Geometry kernel for learning signed distance functions of building massings.
//!
//! Everything here is plain geometry with no tensor dependency: the pieces that
//! turn raw meshes into exact signed-distance samples, and the pieces that turn a
//! dense scalar field back into a mesh.
//!
//! ## Modules
//!
//! - [`types`]: `Point3` and `Aabb`
//! - [`mesh`]: indexed triangle meshes with closed-solid validation
//! - [`obj`]: Wavefront OBJ import/export
//! - [`normalize`]: corpus-wide anchoring and scaling
//! - [`bvh`]: exact nearest-triangle queries
//! - [`winding`]: generalized winding number inside test
//! - [`sdf`]: exact signed distance to a closed mesh
//! - [`marching_cubes`]: grids, scalar fields, isosurface extraction
//!
//! ## Usage
//!
//! ```
//! use massing_core::prelude::*;
//!
//! let mesh = TriangleMesh::axis_aligned_box(Point3::splat(0.0), Point3::new(1.0, 1.0, 3.0));
//! let sdf = MeshSdf::new(&mesh).unwrap();
//! assert!(sdf.signed_distance(Point3::new(0.5, 0.5, 1.5)) < 0.0);
//!
//! let grid = GridSpec::new(Aabb::new(Point3::splat(-0.5), Point3::new(1.5, 1.5, 3.5)), 24).unwrap();
//! let field = ScalarField::from_fn(grid, |p| sdf.signed_distance(p));
//! let surface = extract_isosurface(&field, 0.0);
//! assert!(!surface.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bvh;
pub mod error;
pub mod marching_cubes;
pub mod mesh;
pub mod normalize;
pub mod obj;
pub mod sdf;
pub mod types;
pub mod winding;

pub use bvh::{closest_point_on_triangle, NearestHit, TriangleBvh};
pub use error::{MeshError, Result};
pub use marching_cubes::{extract_isosurface, GridSpec, ScalarField};
pub use mesh::{TriangleMesh, MIN_SOLID_VOLUME, WELD_RELATIVE_TOLERANCE};
pub use normalize::{AnchorMode, CorpusNormalizer};
pub use obj::{parse_obj, read_obj_file, write_obj, write_obj_file};
pub use sdf::MeshSdf;
pub use types::{Aabb, Point3};

/// Commonly used items.
pub mod prelude {
    pub use crate::error::{MeshError, Result};
    pub use crate::marching_cubes::{extract_isosurface, GridSpec, ScalarField};
    pub use crate::mesh::TriangleMesh;
    pub use crate::normalize::{AnchorMode, CorpusNormalizer};
    pub use crate::sdf::MeshSdf;
    pub use crate::types::{Aabb, Point3};
}
