//! Ordered access to a module's float parameters.
//!
//! The trainer runs its own Adam over the decoder and checkpoints write the
//! parameters out flat, so both need every float tensor in one fixed order.
//! [`ModuleVisitor`] and [`ModuleMapper`] walk fields in declaration order,
//! which for the decoder is `[w_0, b_0, ..., w_out, b_out]`. Tensors of any
//! rank are exchanged as `[rows, cols]` matrices; a rank-1 bias becomes `[1, n]`.

use burn::module::{ModuleMapper, ModuleVisitor, ParamId};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// View a tensor of any rank as `[rows, last_dim]`.
pub(crate) fn as_matrix<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, 2> {
    let dims = tensor.dims();
    let cols = dims[D - 1];
    let rows = if cols == 0 { 0 } else { dims.iter().product::<usize>() / cols };
    tensor.reshape([rows, cols])
}

/// Collects every float parameter.
pub(crate) struct ParameterCollector<B: Backend> {
    pub(crate) tensors: Vec<Tensor<B, 2>>,
}

impl<B: Backend> ParameterCollector<B> {
    pub(crate) fn new() -> Self {
        Self { tensors: Vec::new() }
    }
}

impl<B: Backend> ModuleVisitor<B> for ParameterCollector<B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.tensors.push(as_matrix(tensor.clone()));
    }
}

/// Collects the gradient of every float parameter.
///
/// Parameters that did not take part in the graph get a zero gradient.
pub(crate) struct GradientCollector<'a, B: AutodiffBackend> {
    grads: &'a B::Gradients,
    pub(crate) tensors: Vec<Tensor<B::InnerBackend, 2>>,
}

impl<'a, B: AutodiffBackend> GradientCollector<'a, B> {
    pub(crate) fn new(grads: &'a B::Gradients) -> Self {
        Self {
            grads,
            tensors: Vec::new(),
        }
    }
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientCollector<'_, B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let grad = tensor
            .grad(self.grads)
            .unwrap_or_else(|| tensor.clone().inner().zeros_like());
        self.tensors.push(as_matrix(grad));
    }
}

/// Replaces every float parameter, in order, with the next matrix.
///
/// Callers check shapes beforehand; the matrix is reshaped to the parameter's
/// own rank. Gradient tracking of the replaced parameter carries over.
pub(crate) struct ParameterLoader<B: Backend> {
    tensors: std::vec::IntoIter<Tensor<B, 2>>,
}

impl<B: Backend> ParameterLoader<B> {
    pub(crate) fn new(tensors: Vec<Tensor<B, 2>>) -> Self {
        Self {
            tensors: tensors.into_iter(),
        }
    }
}

impl<B: Backend> ModuleMapper<B> for ParameterLoader<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let Some(next) = self.tensors.next() else {
            return tensor;
        };
        let loaded = next.reshape(tensor.dims());
        if tensor.is_require_grad() {
            loaded.require_grad()
        } else {
            loaded
        }
    }
}
