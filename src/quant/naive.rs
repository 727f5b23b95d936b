//! Post-training symmetric weight quantization.

pub use super::*;

/// Post-training truncation of layer weights onto a symmetric grid.
///
/// ## Details
///
/// The grid scale of each op tracks the largest weight magnitude seen
/// across compression passes, so a repeated pass never shrinks the
/// representable range.
#[derive(Clone, Debug)]
pub struct NaiveQuantizer {
    plan: QuantPlan,
    scales: Vec<(OpId, f32)>,
}

impl NaiveQuantizer {
    /// Ports supported by the family.
    pub const CAPS: PortCaps = PortCaps {
        weight: true,
        input: false,
        output: false,
    };

    /// Initialize from a configuration list.
    pub fn init(configure: &[OpQuantConfig]) -> Result<Self, Error> {
        Ok(Self {
            plan: QuantPlan::compile(configure, Self::CAPS)?,
            scales: Vec::new(),
        })
    }

    /// The largest positive position on a signed `bits`-wide grid.
    #[inline]
    fn grid_max(bits: usize) -> f32 {
        ((1_u64 << (bits - 1)) - 1) as f32
    }

    /// Track the scale of the op, keeping the largest one seen.
    fn update_scale(
        &mut self,
        op: OpId,
        scale: f32,
    ) -> f32 {
        match self
            .scales
            .iter_mut()
            .find(|(candidate, _)| *candidate == op)
        {
            Some((_, tracked)) => {
                *tracked = tracked.max(scale);
                *tracked
            },
            None => {
                self.scales.push((op, scale));
                scale
            },
        }
    }

    /// The tracked scale of the op.
    #[inline]
    fn scale(
        &self,
        op: OpId,
    ) -> f32 {
        self.scales
            .iter()
            .find(|(candidate, _)| *candidate == op)
            .map(|(_, scale)| *scale)
            .unwrap_or_default()
    }
}

impl<B: Backend> Compressor<B> for NaiveQuantizer {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn compress(
        &mut self,
        mut model: Vae<B>,
    ) -> Result<Vae<B>, Error> {
        for (op, ports) in self.plan.ops.to_owned() {
            let Some(bits) = ports.weight else {
                continue;
            };
            let layer = linear_mut(&mut model, op)?;
            let weight = layer.weight.val();
            let grid_max = Self::grid_max(bits);
            let max_abs = weight
                .to_owned()
                .abs()
                .max()
                .into_scalar()
                .elem::<f32>()
                .max(f32::EPSILON);
            let scale = self.update_scale(op, max_abs / grid_max);
            let quantized = weight
                .div_scalar(scale)
                .int()
                .float()
                .mul_scalar(scale);
            layer.weight = Param::from_tensor(quantized.detach());

            log::debug!(
                target: "vae_compress::quant::naive",
                "op {op}: {bits} bits, scale {scale:.6}",
            );
        }

        Ok(model)
    }

    fn calibration(&self) -> CalibrationConfig {
        let ports = self
            .plan
            .ops
            .iter()
            .filter_map(|(op, ports)| {
                let bits = ports.weight?;
                let scale = self.scale(*op);
                let grid_max = Self::grid_max(bits);
                let params = AffineParams {
                    scale,
                    zero_point: 0.0,
                    range_min: -grid_max,
                    range_max: grid_max,
                };
                Some(PortCalibration::from_params(
                    *op,
                    Port::Weight,
                    bits,
                    &params,
                    -scale * grid_max,
                    scale * grid_max,
                ))
            })
            .collect();
        CalibrationConfig::new(Compressor::<B>::name(self).to_string(), ports)
    }
}

#[cfg(test)]
mod tests {
    pub use super::*;
    use crate::model::VaeConfig;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn tiny_model(device: &<B as Backend>::Device) -> Vae<B> {
        VaeConfig::new()
            .with_dim_input(2)
            .with_dim_hidden(2)
            .with_dim_latent(2)
            .init(device)
    }

    #[test]
    fn weights_truncate_onto_the_grid() {
        let device = &Default::default();

        let mut model = tiny_model(device);
        model.fc1.weight = Param::from_tensor(Tensor::from_floats(
            [[2.0, -1.0], [0.5, 0.254]],
            device,
        ));
        let configure = [OpQuantConfig::new(&[OpId::Fc1]).with_weight(8)];
        let mut strategy = NaiveQuantizer::init(&configure).unwrap();

        let model = strategy.compress(model).unwrap();
        let scale = 2.0 / 127.0;
        assert_eq!(strategy.scale(OpId::Fc1), scale);
        model.fc1.weight.val().into_data().assert_approx_eq(
            &Tensor::<B, 2>::from_floats(
                [
                    [127.0 * scale, -63.0 * scale],
                    [31.0 * scale, 16.0 * scale],
                ],
                device,
            )
            .into_data(),
            4,
        );
    }

    #[test]
    fn scales_never_shrink() {
        let device = &Default::default();

        let mut model = tiny_model(device);
        model.fc1.weight = Param::from_tensor(Tensor::from_floats(
            [[2.0, -1.0], [0.5, 0.25]],
            device,
        ));
        let configure = [OpQuantConfig::new(&[OpId::Fc1]).with_weight(8)];
        let mut strategy = NaiveQuantizer::init(&configure).unwrap();

        let mut model = strategy.compress(model).unwrap();
        model.fc1.weight = Param::from_tensor(Tensor::from_floats(
            [[0.2, -0.1], [0.1, 0.1]],
            device,
        ));
        let _ = strategy.compress(model).unwrap();

        assert_eq!(strategy.scale(OpId::Fc1), 2.0 / 127.0);
    }

    #[test]
    fn activation_ports_are_rejected() {
        let configure = [OpQuantConfig::new(&[OpId::Fc1]).with_output(8)];
        assert!(NaiveQuantizer::init(&configure).is_err());
    }

    #[test]
    fn calibration_records_symmetric_grids() {
        let device = &Default::default();

        let mut model = tiny_model(device);
        model.fc1.weight = Param::from_tensor(Tensor::from_floats(
            [[2.0, -1.0], [0.5, 0.25]],
            device,
        ));
        let configure = [OpQuantConfig::new(&[OpId::Fc1]).with_weight(8)];
        let mut strategy = NaiveQuantizer::init(&configure).unwrap();
        let _ = strategy.compress(model).unwrap();

        let calibration = Compressor::<B>::calibration(&strategy);
        assert_eq!(calibration.strategy, "naive");
        assert_eq!(calibration.ports.len(), 1);

        let port = &calibration.ports[0];
        assert_eq!(port.op, "fc1");
        assert_eq!(port.port, "weight");
        assert_eq!(port.bits, 8);
        assert_eq!(port.scale, 2.0 / 127.0);
        assert_eq!(port.zero_point, 0.0);
        assert!((port.tracked_min - -2.0).abs() < 1e-6);
        assert!((port.tracked_max - 2.0).abs() < 1e-6);
    }
}
