use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::foundation::core::Point;
use crate::foundation::error::{MorphError, MorphResult};
use crate::sampling::cloud::PointCloud;
use crate::sampling::intensity::IntensityField;

/// Draws point clouds whose density follows the darkness of a picture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointCloudSampler {
    /// Points drawn per picture.
    pub n_points: usize,
    /// Exponent applied to darkness; values above 1 let dark regions dominate.
    pub gamma: f64,
}

impl PointCloudSampler {
    /// Create a sampler drawing `n_points` points with darkness exponent `gamma`.
    pub fn new(n_points: usize, gamma: f64) -> MorphResult<Self> {
        if n_points == 0 {
            return Err(MorphError::validation("sampler needs n_points >= 1"));
        }
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(MorphError::validation(format!(
                "sampler gamma must be finite and > 0, got {gamma}"
            )));
        }
        Ok(Self { n_points, gamma })
    }

    /// Sample one cloud from `field`. `name` identifies the picture in errors.
    ///
    /// Pixels are drawn with replacement, proportionally to `(255 - intensity)^gamma`, and every
    /// draw is jittered uniformly inside its pixel so no two points share a grid position.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        field: &IntensityField,
        name: &str,
        rng: &mut R,
    ) -> MorphResult<PointCloud> {
        let weights = darkness_weights(field, self.gamma);
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(MorphError::invalid_image(
                name,
                "no ink to sample: total darkness weight is zero",
            ));
        }
        let dist = WeightedIndex::new(&weights)
            .map_err(|e| MorphError::invalid_image(name, format!("degenerate density: {e}")))?;

        let width = field.width() as usize;
        let mut points = Vec::with_capacity(self.n_points);
        for _ in 0..self.n_points {
            let idx = dist.sample(rng);
            let row = (idx / width) as f64;
            let col = (idx % width) as f64;
            let jx: f64 = rng.random();
            let jy: f64 = rng.random();
            points.push(Point::new(col + jx, row + jy));
        }

        tracing::debug!(
            image = name,
            points = points.len(),
            width = field.width(),
            height = field.height(),
            "sampled point cloud"
        );
        Ok(PointCloud::new(points))
    }
}

/// Per-pixel sampling weights `(255 - intensity)^gamma`, row-major.
pub fn darkness_weights(field: &IntensityField, gamma: f64) -> Vec<f64> {
    field
        .data()
        .iter()
        .map(|&c| f64::from(255 - c).powf(gamma))
        .collect()
}

/// RNG for picture `index` of the cycle.
///
/// With a seed every picture gets its own reproducible stream; the index is spread with a
/// multiplicative hash so neighbouring seeds do not share streams. Without a seed the OS provides
/// entropy.
pub fn picture_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_os_rng(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sampling/sampler.rs"]
mod tests;
