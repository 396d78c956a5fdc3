//! Auto-decoder SDF network.
//!
//! Maps a `(latent, xyz)` row to a signed distance. The network is a stack of
//! ReLU layers with the raw input re-injected before every skip layer, and an
//! optional tanh on the single output.
//!
//! The trainer runs its own optimizer and the checkpoint code writes the
//! parameters out flat, both in [`SdfDecoderConfig::parameter_shapes`] order;
//! see [`SdfDecoder::parameters`] and [`SdfDecoder::load_parameters`].

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use burn::tensor::backend::AutodiffBackend;
use massing_core::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::params::{GradientCollector, ParameterCollector, ParameterLoader};
use crate::config::SdfDecoderConfig;
use crate::error::{MassingError, Result};
use crate::latent::LatentCode;
use crate::tensor_ops::{matrix_tensor, points_tensor, to_host};

/// SDF decoder `f_θ(z, x)`.
#[derive(Module, Debug)]
pub struct SdfDecoder<B: Backend> {
    /// Hidden layers.
    layers: Vec<Linear<B>>,
    /// Output layer to a scalar distance.
    output: Linear<B>,
    activation: Relu,
    latent_dim: usize,
    /// Hidden layers that receive the raw input again.
    skip_layers: Vec<usize>,
    bounded_output: bool,
}

/// Zero-initialized linear layer; values are loaded afterwards.
fn blank_linear<B: Backend>(input: usize, output: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(input, output)
        .with_initializer(Initializer::Zeros)
        .init(device)
}

impl<B: Backend> SdfDecoder<B> {
    /// Layer structure of `config` with every parameter at zero.
    fn blank(config: &SdfDecoderConfig, device: &B::Device) -> Self {
        Self {
            layers: (0..config.num_layers)
                .map(|l| blank_linear(config.layer_input_dim(l), config.hidden_dim, device))
                .collect(),
            output: blank_linear(config.hidden_dim, 1, device),
            activation: Relu::new(),
            latent_dim: config.latent_dim,
            skip_layers: config.skip_layers.clone(),
            bounded_output: config.bounded_output,
        }
    }

    /// Create a freshly initialized decoder.
    ///
    /// Weights and biases are uniform in `±1/sqrt(fan_in)`, drawn from the
    /// configured seed; the output layer stays at zero when
    /// `zero_init_output` is set.
    pub fn new(config: &SdfDecoderConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let shapes = config.parameter_shapes();
        let output_start = shapes.len() - 2;
        let mut fan_in = 1;
        let parameters = shapes
            .iter()
            .enumerate()
            .map(|(i, &[rows, cols])| {
                // Weights come first in each pair and fix the bound for their bias.
                if i % 2 == 0 {
                    fan_in = rows;
                }
                let values = if i >= output_start && config.zero_init_output {
                    vec![0.0; rows * cols]
                } else {
                    let bound = 1.0 / (fan_in as f32).sqrt();
                    (0..rows * cols).map(|_| rng.gen_range(-bound..bound)).collect()
                };
                matrix_tensor(values, [rows, cols], device)
            })
            .collect();

        log::debug!(
            "created decoder: {} hidden layers of width {}, skip {:?}, {} parameters",
            config.num_layers,
            config.hidden_dim,
            config.skip_layers,
            config.num_parameters()
        );
        Self::blank(config, device).load_parameters(parameters)
    }

    /// Rebuild a decoder from parameter tensors in [`Self::parameters`] order.
    pub fn from_parameters(config: SdfDecoderConfig, parameters: Vec<Tensor<B, 2>>) -> Result<Self> {
        config.validate()?;
        let device = parameters
            .first()
            .map(Tensor::device)
            .ok_or_else(|| MassingError::checkpoint("no decoder parameters"))?;
        Self::blank(&config, &device).load_parameters(parameters)
    }

    /// Rebuild a decoder from host parameter vectors.
    pub fn from_host(config: SdfDecoderConfig, values: &[Vec<f32>], device: &B::Device) -> Result<Self> {
        let shapes = config.parameter_shapes();
        if values.len() != shapes.len() {
            return Err(MassingError::checkpoint(format!(
                "expected {} parameter arrays, got {}",
                shapes.len(),
                values.len()
            )));
        }
        let mut parameters = Vec::with_capacity(shapes.len());
        for (i, (data, shape)) in values.iter().zip(&shapes).enumerate() {
            if data.len() != shape[0] * shape[1] {
                return Err(MassingError::checkpoint(format!(
                    "parameter {i} has {} values, expected {} for shape {shape:?}",
                    data.len(),
                    shape[0] * shape[1]
                )));
            }
            parameters.push(matrix_tensor(data.clone(), *shape, device));
        }
        Self::from_parameters(config, parameters)
    }

    /// Replace every parameter, in [`Self::parameters`] order.
    ///
    /// Fails without touching the decoder when the count or any shape differs.
    pub fn load_parameters(self, parameters: Vec<Tensor<B, 2>>) -> Result<Self> {
        let current = self.parameters();
        if parameters.len() != current.len() {
            return Err(MassingError::checkpoint(format!(
                "expected {} parameter tensors, got {}",
                current.len(),
                parameters.len()
            )));
        }
        for (i, (tensor, existing)) in parameters.iter().zip(&current).enumerate() {
            if tensor.dims() != existing.dims() {
                return Err(MassingError::checkpoint(format!(
                    "parameter {i} has shape {:?}, expected {:?}",
                    tensor.dims(),
                    existing.dims()
                )));
            }
        }
        Ok(self.map(&mut ParameterLoader::new(parameters)))
    }

    /// Latent dimension expected by [`Self::forward`].
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Device holding the parameters.
    pub fn device(&self) -> B::Device {
        self.output.weight.device()
    }

    /// Parameters as `[w_0, b_0, ..., w_out, b_out]`, biases as `[1, out]` rows.
    pub fn parameters(&self) -> Vec<Tensor<B, 2>> {
        let mut collector = ParameterCollector::new();
        self.visit(&mut collector);
        collector.tensors
    }

    /// Copy every parameter to the host, in [`Self::parameters`] order.
    pub fn to_host(&self) -> Result<Vec<Vec<f32>>> {
        self.parameters().into_iter().map(to_host).collect()
    }

    /// Decode rows of latent codes `[n, L]` at points `[n, 3]` into distances `[n, 1]`.
    pub fn forward(&self, latents: Tensor<B, 2>, xyz: Tensor<B, 2>) -> Tensor<B, 2> {
        let input = Tensor::cat(vec![latents, xyz], 1);
        let mut x = input.clone();
        for (l, layer) in self.layers.iter().enumerate() {
            if self.skip_layers.contains(&l) {
                x = Tensor::cat(vec![x, input.clone()], 1);
            }
            x = self.activation.forward(layer.forward(x));
        }
        let out = self.output.forward(x);
        if self.bounded_output {
            tanh(out)
        } else {
            out
        }
    }

    /// Decode one latent code at many points `[n, 3]`.
    pub fn forward_shared(&self, latent: &LatentCode, xyz: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        self.check_latent(latent)?;
        let n = xyz.dims()[0];
        let z = matrix_tensor::<B>(latent.as_slice().to_vec(), [1, latent.dim()], &xyz.device());
        Ok(self.forward(z.repeat_dim(0, n), xyz))
    }

    /// Decode one latent code at host points.
    pub fn evaluate(&self, latent: &LatentCode, points: &[Point3]) -> Result<Vec<f32>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        let xyz = points_tensor::<B>(points, &self.device());
        to_host(self.forward_shared(latent, xyz)?)
    }

    /// Signed distance of a single point.
    pub fn decode(&self, latent: &LatentCode, point: Point3) -> Result<f32> {
        self.evaluate(latent, &[point])?
            .first()
            .copied()
            .ok_or_else(|| MassingError::Tensor {
                message: "decoder returned no value".into(),
            })
    }

    fn check_latent(&self, latent: &LatentCode) -> Result<()> {
        if latent.dim() != self.latent_dim {
            return Err(MassingError::data(format!(
                "latent code has dimension {}, decoder expects {}",
                latent.dim(),
                self.latent_dim
            )));
        }
        Ok(())
    }
}

impl<B: AutodiffBackend> SdfDecoder<B> {
    /// Lift an inner-backend decoder onto the autodiff backend.
    pub fn from_inner(inner: &SdfDecoder<B::InnerBackend>) -> Self {
        let device = inner.device();
        let structure = Self {
            layers: inner
                .layers
                .iter()
                .map(|layer| {
                    let [input, output] = layer.weight.dims();
                    blank_linear(input, output, &device)
                })
                .collect(),
            output: blank_linear(inner.output.weight.dims()[0], 1, &device),
            activation: Relu::new(),
            latent_dim: inner.latent_dim,
            skip_layers: inner.skip_layers.clone(),
            bounded_output: inner.bounded_output,
        };
        let lifted: Vec<Tensor<B, 2>> = inner.parameters().into_iter().map(Tensor::from_inner).collect();
        structure.map(&mut ParameterLoader::new(lifted))
    }

    /// Gradient of every parameter, in [`Self::parameters`] order.
    ///
    /// Parameters that did not take part in the graph get a zero gradient.
    pub fn gradients(&self, grads: &B::Gradients) -> Vec<Tensor<B::InnerBackend, 2>> {
        let mut collector = GradientCollector::<B>::new(grads);
        self.visit(&mut collector);
        collector.tensors
    }
}
