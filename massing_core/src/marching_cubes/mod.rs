//! Isosurface extraction from dense scalar grids.
//!
//! - [`field`]: grid layout and sampled values
//! - [`algorithm`]: marching cubes with welded edge vertices
//! - [`tables`]: packed triangle configurations

pub mod algorithm;
pub mod field;
pub mod tables;

pub use algorithm::{crossing_parameter, cube_configuration, extract_isosurface};
pub use field::{GridSpec, ScalarField};
