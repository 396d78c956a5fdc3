//! Decoder network configuration.

use burn::config::Config;

use super::ensure;

/// Configuration for the auto-decoder SDF network.
///
/// `num_layers` hidden layers of width `hidden_dim`. Before every layer listed
/// in `skip_layers`, the raw `(latent, xyz)` input is concatenated back onto
/// the hidden activations.
#[derive(Config, Debug)]
pub struct SdfDecoderConfig {
    /// Latent code dimension `L`.
    pub latent_dim: usize,

    /// Width of every hidden layer.
    #[config(default = 256)]
    pub hidden_dim: usize,

    /// Number of hidden layers.
    #[config(default = 8)]
    pub num_layers: usize,

    /// Hidden layers that receive the raw input again (0-based, must be > 0).
    #[config(default = "vec![4]")]
    pub skip_layers: Vec<usize>,

    /// Squash the output with tanh.
    #[config(default = true)]
    pub bounded_output: bool,

    /// Start the output layer at zero so an untrained network predicts 0 everywhere.
    #[config(default = true)]
    pub zero_init_output: bool,

    /// Seed for weight initialization.
    #[config(default = 0)]
    pub seed: u64,
}

impl SdfDecoderConfig {
    /// Small network for fast experiments and tests.
    pub fn fast(latent_dim: usize) -> Self {
        Self::new(latent_dim)
            .with_hidden_dim(64)
            .with_num_layers(4)
            .with_skip_layers(vec![2])
    }

    /// Dimension of the concatenated `(latent, xyz)` input.
    pub fn input_dim(&self) -> usize {
        self.latent_dim + 3
    }

    /// Input width of hidden layer `layer`.
    pub fn layer_input_dim(&self, layer: usize) -> usize {
        if layer == 0 {
            self.input_dim()
        } else if self.skip_layers.contains(&layer) {
            self.hidden_dim + self.input_dim()
        } else {
            self.hidden_dim
        }
    }

    /// `[in, out]` shapes of every weight and bias, in parameter order.
    ///
    /// Biases are stored as `[1, out]` rows.
    pub fn parameter_shapes(&self) -> Vec<[usize; 2]> {
        let mut shapes = Vec::with_capacity(2 * (self.num_layers + 1));
        for layer in 0..self.num_layers {
            shapes.push([self.layer_input_dim(layer), self.hidden_dim]);
            shapes.push([1, self.hidden_dim]);
        }
        shapes.push([self.hidden_dim, 1]);
        shapes.push([1, 1]);
        shapes
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.parameter_shapes().iter().map(|[r, c]| r * c).sum()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        ensure(self.latent_dim > 0, || "latent_dim must be positive".into())?;
        ensure(self.hidden_dim > 0, || "hidden_dim must be positive".into())?;
        ensure(self.num_layers >= 2, || {
            format!("need at least 2 hidden layers for input re-injection, got {}", self.num_layers)
        })?;
        ensure(!self.skip_layers.is_empty(), || {
            "at least one skip layer is required; without re-injection deep layers ignore the latent"
                .into()
        })?;
        ensure(
            self.skip_layers.iter().all(|&l| l > 0 && l < self.num_layers),
            || {
                format!(
                    "skip layers {:?} must lie in 1..{}",
                    self.skip_layers, self.num_layers
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_shapes_include_skip_inputs() {
        let config = SdfDecoderConfig::new(8)
            .with_hidden_dim(16)
            .with_num_layers(4)
            .with_skip_layers(vec![2]);
        let shapes = config.parameter_shapes();
        assert_eq!(shapes.len(), 10);
        assert_eq!(shapes[0], [11, 16]);
        assert_eq!(shapes[2], [16, 16]);
        assert_eq!(shapes[4], [27, 16]);
        assert_eq!(shapes[8], [16, 1]);
        assert_eq!(shapes[9], [1, 1]);
    }

    #[test]
    fn test_skip_layers_required() {
        SdfDecoderConfig::new(8).validate().unwrap();
        assert!(SdfDecoderConfig::new(8).with_skip_layers(vec![]).validate().is_err());
        assert!(SdfDecoderConfig::new(8).with_skip_layers(vec![0]).validate().is_err());
        assert!(SdfDecoderConfig::new(8).with_skip_layers(vec![8]).validate().is_err());
        assert!(SdfDecoderConfig::new(0).validate().is_err());
    }
}
