//! Sampler configuration.

use burn::config::Config;

use super::ensure;

/// Configuration for turning a mesh into (point, signed distance) samples.
///
/// The sample budget splits three ways: near-surface points (surface samples
/// perturbed by Gaussian noise, cycling through `near_surface_sigmas`), uniform
/// points in the mesh's padded bounding box, and uniform points in the fixed
/// normalization volume.
#[derive(Config, Debug)]
pub struct SamplerConfig {
    /// Total number of samples per mesh.
    #[config(default = 50000)]
    pub num_samples: usize,

    /// Fraction of samples drawn near the surface.
    #[config(default = 0.7)]
    pub near_surface_fraction: f32,

    /// Noise standard deviations for near-surface samples (at least two scales).
    #[config(default = "vec![0.005, 0.025]")]
    pub near_surface_sigmas: Vec<f32>,

    /// Fraction of samples drawn uniformly in the padded mesh bounding box.
    #[config(default = 0.15)]
    pub bbox_fraction: f32,

    /// Padding added to the mesh bounding box for bbox samples.
    #[config(default = 0.05)]
    pub bbox_padding: f32,

    /// Minimum corner of the normalization volume.
    #[config(default = "[0.0, 0.0, 0.0]")]
    pub volume_min: [f32; 3],

    /// Maximum corner of the normalization volume.
    #[config(default = "[1.0, 1.0, 1.0]")]
    pub volume_max: [f32; 3],

    /// Random seed. `None` draws a fresh seed from the OS.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerConfig {
    /// Small sample budget for quick experiments and tests.
    pub fn fast() -> Self {
        Self::new().with_num_samples(8000)
    }

    /// Number of (near-surface, bbox, volume) samples.
    pub fn split_counts(&self) -> (usize, usize, usize) {
        let n = self.num_samples;
        let near = ((n as f32 * self.near_surface_fraction).round() as usize).min(n);
        let bbox = ((n as f32 * self.bbox_fraction).round() as usize).min(n - near);
        (near, bbox, n - near - bbox)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        ensure(self.num_samples > 0, || "num_samples must be positive".into())?;
        ensure((0.0..=1.0).contains(&self.near_surface_fraction), || {
            format!("near_surface_fraction must be in [0, 1], got {}", self.near_surface_fraction)
        })?;
        ensure((0.0..=1.0).contains(&self.bbox_fraction), || {
            format!("bbox_fraction must be in [0, 1], got {}", self.bbox_fraction)
        })?;
        ensure(self.near_surface_fraction + self.bbox_fraction <= 1.0 + 1e-6, || {
            "near_surface_fraction + bbox_fraction must not exceed 1".into()
        })?;
        ensure(self.near_surface_sigmas.len() >= 2, || {
            format!(
                "need at least two near-surface noise scales, got {}",
                self.near_surface_sigmas.len()
            )
        })?;
        ensure(
            self.near_surface_sigmas.iter().all(|s| s.is_finite() && *s > 0.0),
            || format!("noise scales must be positive, got {:?}", self.near_surface_sigmas),
        )?;
        ensure(self.bbox_padding >= 0.0 && self.bbox_padding.is_finite(), || {
            format!("bbox_padding must be non-negative, got {}", self.bbox_padding)
        })?;
        ensure(
            (0..3).all(|i| self.volume_min[i] < self.volume_max[i]),
            || format!("volume bounds are empty: {:?}..{:?}", self.volume_min, self.volume_max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_counts_cover_budget() {
        let config = SamplerConfig::new().with_num_samples(1001);
        let (near, bbox, volume) = config.split_counts();
        assert_eq!(near + bbox + volume, 1001);
        assert_eq!(near, 701);
    }

    #[test]
    fn test_validation() {
        SamplerConfig::default().validate().unwrap();
        assert!(SamplerConfig::new().with_num_samples(0).validate().is_err());
        assert!(SamplerConfig::new().with_near_surface_sigmas(vec![0.01]).validate().is_err());
        assert!(SamplerConfig::new()
            .with_near_surface_fraction(0.9)
            .with_bbox_fraction(0.2)
            .validate()
            .is_err());
        assert!(SamplerConfig::new()
            .with_volume_max([1.0, 0.0, 1.0])
            .validate()
            .is_err());
    }
}
