//! Training data: mesh sampling and the shape dataset.

mod dataset;
mod sampler;

pub use dataset::{BatchSampler, ShapeBatch, ShapeDataset, ShapeRecord};
pub use sampler::{MeshSampler, SampleSet};
