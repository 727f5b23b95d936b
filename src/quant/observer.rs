//! Range observation for affine quantization.

pub use super::*;

/// An exponential moving average of observed tensor ranges.
#[derive(Clone, Copy, Debug)]
pub struct MovingMinMax {
    decay: f32,
    min: f32,
    max: f32,
    initialized: bool,
}

impl MovingMinMax {
    /// Initialize an empty observer with the given decay.
    pub fn init(decay: f32) -> Self {
        Self {
            decay,
            min: 0.0,
            max: 0.0,
            initialized: false,
        }
    }

    /// Blend a freshly observed range into the moving average.
    ///
    /// ## Details
    ///
    /// The first observation replaces the state directly.
    pub fn observe(
        &mut self,
        min: f32,
        max: f32,
    ) {
        if !self.initialized {
            self.min = min;
            self.max = max;
            self.initialized = true;
            return;
        }
        self.min = self.decay * self.min + (1.0 - self.decay) * min;
        self.max = self.decay * self.max + (1.0 - self.decay) * max;
    }

    /// The tracked minimum.
    #[inline]
    pub const fn min(&self) -> f32 {
        self.min
    }

    /// The tracked maximum.
    #[inline]
    pub const fn max(&self) -> f32 {
        self.max
    }
}

/// Parameters of an affine integer grid.
///
/// `quantized = clamp(round(input / scale + zero_point), range_min, range_max)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineParams {
    /// Unit step size.
    pub scale: f32,
    /// Grid position of the real zero.
    pub zero_point: f32,
    /// Smallest representable position.
    pub range_min: f32,
    /// Largest representable position.
    pub range_max: f32,
}

impl AffineParams {
    /// Derive the grid covering `[min, max]` with the given bit width.
    ///
    /// ## Details
    ///
    /// The range is widened to include zero so that zero quantizes
    /// exactly. Degenerate ranges fall back to a unit scale step. The
    /// scale and zero point anchor in double precision, so a range
    /// midpoint lands on the integer grid instead of drifting below it.
    pub fn from_range(
        bits: usize,
        min: f32,
        max: f32,
    ) -> Self {
        let range_min = 0.0_f32;
        let range_max = round::grid_levels(bits);
        let min = f64::from(min.min(0.0));
        let max = f64::from(max.max(0.0));
        let scale = ((max - min) / f64::from(range_max - range_min))
            .max(f64::from(f32::EPSILON));
        let zero_point = (f64::from(range_min) - min / scale)
            .round()
            .clamp(range_min.into(), range_max.into());
        Self {
            scale: scale as f32,
            zero_point: zero_point as f32,
            range_min,
            range_max,
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn observations_blend_exponentially() {
        use super::*;

        let mut observer = MovingMinMax::init(0.99);

        observer.observe(-1.0, 1.0);
        assert_eq!(observer.min(), -1.0);
        assert_eq!(observer.max(), 1.0);

        observer.observe(0.0, 2.0);
        assert!((observer.min() - -0.99).abs() < 1e-6);
        assert!((observer.max() - 1.01).abs() < 1e-6);
    }

    #[test]
    fn grids_cover_the_observed_range() {
        use super::*;

        let params = AffineParams::from_range(8, -1.0, 1.0);
        assert_eq!(params.range_min, 0.0);
        assert_eq!(params.range_max, 255.0);
        assert!((params.scale - 2.0 / 255.0).abs() < 1e-6);
        assert_eq!(params.zero_point, 128.0);
    }

    #[test]
    fn grids_include_zero() {
        use super::*;

        let params = AffineParams::from_range(8, 0.5, 3.0);
        assert_eq!(params.zero_point, 0.0);
        assert!((params.scale - 3.0 / 255.0).abs() < 1e-6);

        let params = AffineParams::from_range(8, -3.0, -0.5);
        assert_eq!(params.zero_point, 255.0);
    }

    #[test]
    fn degenerate_ranges_stay_finite() {
        use super::*;

        let params = AffineParams::from_range(8, 0.0, 0.0);
        assert!(params.scale > 0.0);
        assert!(params.zero_point.is_finite());
    }
}
