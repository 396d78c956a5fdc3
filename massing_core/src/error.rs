//! Error types for massing_core.

use thiserror::Error;

/// Errors raised by mesh validation, parsing and grid construction.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no vertices or no faces.
    #[error("mesh is empty")]
    Empty,

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {index}, but the mesh has {vertex_count} vertices")]
    IndexOutOfBounds {
        /// Offending face.
        face: usize,
        /// Offending vertex index.
        index: usize,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("vertex {index} has a non-finite coordinate")]
    NonFiniteVertex {
        /// Offending vertex.
        index: usize,
    },

    /// An edge is open, shared by more than two faces, or inconsistently oriented.
    #[error("non-manifold edge ({from}, {to}): used {forward} time(s), opposite used {backward} time(s)")]
    NonManifold {
        /// Edge start vertex.
        from: usize,
        /// Edge end vertex.
        to: usize,
        /// Occurrences of the directed edge.
        forward: usize,
        /// Occurrences of the opposite directed edge.
        backward: usize,
    },

    /// The enclosed volume is too small to define an inside.
    #[error("mesh encloses no volume (|volume| = {volume:e})")]
    DegenerateVolume {
        /// Absolute signed volume.
        volume: f32,
    },

    /// Malformed line in a mesh file.
    #[error("parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// Invalid grid dimensions or bounds.
    #[error("invalid grid: {message}")]
    InvalidGrid {
        /// Description of the problem.
        message: String,
    },

    /// Scalar field length does not match its grid.
    #[error("field has {actual} values, grid expects {expected}")]
    FieldSizeMismatch {
        /// Expected number of values.
        expected: usize,
        /// Actual number of values.
        actual: usize,
    },

    /// I/O error while reading or writing a mesh.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for massing_core.
pub type Result<T> = std::result::Result<T, MeshError>;
