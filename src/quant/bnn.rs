//! Binary network quantization.

pub use super::*;

/// Binarization of weights and output activations.
///
/// ## Details
///
/// Tensors snap to `{-1, 1}` through [`round::binarize`], so gradients
/// clip outside the unit interval. Only single-bit configurations are
/// accepted.
#[derive(Clone, Debug)]
pub struct BnnQuantizer {
    plan: QuantPlan,
}

impl BnnQuantizer {
    /// Ports supported by the family.
    pub const CAPS: PortCaps = PortCaps {
        weight: true,
        input: false,
        output: true,
    };

    /// Initialize from a configuration list.
    pub fn init(configure: &[OpQuantConfig]) -> Result<Self, Error> {
        let plan = QuantPlan::compile(configure, Self::CAPS)?;
        for (op, ports) in &plan.ops {
            let widths = [(Port::Weight, ports.weight), (Port::Output, ports.output)];
            for (port, bits) in widths {
                let Some(width) = bits else {
                    continue;
                };
                if width != 1 {
                    return Err(Error::Validation(
                        format!("{width} bits on {op} {port}"),
                        "1 for binarization".to_string(),
                    ));
                }
            }
        }
        Ok(Self { plan })
    }
}

impl<B: Backend> Compressor<B> for BnnQuantizer {
    fn name(&self) -> &'static str {
        "bnn"
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
        if self.plan.get(op).weight.is_none() {
            return weight;
        }
        round::binarize(weight)
    }

    fn output(
        &mut self,
        op: OpId,
        output: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        if self.plan.get(op).output.is_none() {
            return output;
        }
        round::binarize(output)
    }

    fn calibration(&self) -> CalibrationConfig {
        let params = AffineParams {
            scale: 1.0,
            zero_point: 0.0,
            range_min: -1.0,
            range_max: 1.0,
        };
        let mut ports = Vec::new();
        for (op, resolved) in &self.plan.ops {
            let widths = [
                (Port::Weight, resolved.weight),
                (Port::Output, resolved.output),
            ];
            for (port, bits) in widths {
                let Some(bits) = bits else {
                    continue;
                };
                ports.push(PortCalibration::from_params(
                    *op, port, bits, &params, -1.0, 1.0,
                ));
            }
        }
        CalibrationConfig::new(Compressor::<B>::name(self).to_string(), ports)
    }
}
