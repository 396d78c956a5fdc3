//! Neural network components.

mod decoder;
mod params;

pub use decoder::SdfDecoder;
