//! DoReFa quantization.

pub use super::*;

/// DoReFa quantization of weights and output activations.
///
/// ## Details
///
/// Weights squash through `tanh` onto the unit interval, snap to a
/// uniform grid, and stretch back onto `[-1, 1]`. Output activations
/// clamp onto the unit interval before snapping. The whole transform
/// passes gradients straight through.
#[derive(Clone, Debug)]
pub struct DorefaQuantizer {
    plan: QuantPlan,
}

impl DorefaQuantizer {
    /// Ports supported by the family.
    pub const CAPS: PortCaps = PortCaps {
        weight: true,
        input: false,
        output: true,
    };

    /// Initialize from a configuration list.
    pub fn init(configure: &[OpQuantConfig]) -> Result<Self, Error> {
        Ok(Self {
            plan: QuantPlan::compile(configure, Self::CAPS)?,
        })
    }

    /// Snap a unit interval tensor onto a `bits`-wide grid.
    ///
    /// `output = round(input * (2^bits - 1)) / (2^bits - 1)`
    fn grid<B: Backend>(
        unit: Tensor<B, 2>,
        bits: usize,
    ) -> Tensor<B, 2> {
        let levels = round::grid_levels(bits);
        unit.mul_scalar(levels)
            .add_scalar(0.5)
            .floor()
            .div_scalar(levels)
    }
}

impl<B: Backend> Compressor<B> for DorefaQuantizer {
    fn name(&self) -> &'static str {
        "dorefa"
    }

    fn compress(
        &mut self,
        model: Vae<B>,
    ) -> Result<Vae<B>, Error> {
        Ok(model)
    }

    fn weight(
        &mut self,
        op: OpId,
        weight: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let Some(bits) = self.plan.get(op).weight else {
            return weight;
        };
        let squashed = weight.to_owned().tanh();
        let max_abs = squashed
            .to_owned()
            .abs()
            .max()
            .into_scalar()
            .elem::<f32>()
            .max(f32::EPSILON);
        let unit = squashed.div_scalar(2.0 * max_abs).add_scalar(0.5);
        let quantized = Self::grid(unit, bits).mul_scalar(2.0).sub_scalar(1.0);
        round::straight_through(quantized, weight)
    }

    fn output(
        &mut self,
        op: OpId,
        output: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let Some(bits) = self.plan.get(op).output else {
            return output;
        };
        let clamped = output.to_owned().clamp(0.0, 1.0);
        round::straight_through(Self::grid(clamped, bits), output)
    }

    fn calibration(&self) -> CalibrationConfig {
        let mut ports = Vec::new();
        for (op, resolved) in &self.plan.ops {
            if let Some(bits) = resolved.weight {
                let levels = round::grid_levels(bits);
                let params = AffineParams {
                    scale: 2.0 / levels,
                    zero_point: levels / 2.0,
                    range_min: 0.0,
                    range_max: levels,
                };
                ports.push(PortCalibration::from_params(
                    *op,
                    Port::Weight,
                    bits,
                    &params,
                    -1.0,
                    1.0,
                ));
            }
            if let Some(bits) = resolved.output {
                let levels = round::grid_levels(bits);
                let params = AffineParams {
                    scale: 1.0 / levels,
                    zero_point: 0.0,
                    range_min: 0.0,
                    range_max: levels,
                };
                ports.push(PortCalibration::from_params(
                    *op,
                    Port::Output,
                    bits,
                    &params,
                    0.0,
                    1.0,
                ));
            }
        }
        CalibrationConfig::new(Compressor::<B>::name(self).to_string(), ports)
    }
}
