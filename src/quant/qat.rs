//! Quantization-aware training.

pub use super::*;

/// One observed activation port.
#[derive(Clone, Copy, Debug)]
struct ActivationSite {
    op: OpId,
    port: Port,
    bits: usize,
    observer: MovingMinMax,
}

/// Affine fake-quantization with ranges learned while training.
///
/// ## Details
///
/// Weights quantize against their live range on every pass. Activation
/// ranges blend into moving averages during training and freeze for
/// evaluation. Gradients pass straight through inside the representable
/// range and vanish where the grid saturates.
#[derive(Clone, Debug)]
pub struct QatQuantizer {
    plan: QuantPlan,
    training: bool,
    sites: Vec<ActivationSite>,
}

impl QatQuantizer {
    /// Ports supported by the family.
    pub const CAPS: PortCaps = PortCaps {
        weight: true,
        input: true,
        output: true,
    };

    /// Range observer decay.
    pub const DECAY: f32 = 0.99;

    /// Batch size of the observer warmup pass.
    pub const WARMUP_BATCH: usize = 32;

    /// Initialize from a configuration list.
    pub fn init(configure: &[OpQuantConfig]) -> Result<Self, Error> {
        let plan = QuantPlan::compile(configure, Self::CAPS)?;
        let sites = plan
            .ops
            .iter()
            .flat_map(|(op, ports)| {
                [(Port::Input, ports.input), (Port::Output, ports.output)]
                    .into_iter()
                    .filter_map(move |(port, bits)| {
                        Some(ActivationSite {
                            op: *op,
                            port,
                            bits: bits?,
                            observer: MovingMinMax::init(Self::DECAY),
                        })
                    })
            })
            .collect();
        Ok(Self {
            plan,
            training: true,
            sites,
        })
    }

    /// Fake-quantize an activation against its observed range.
    fn quantize_activation<B: Backend>(
        &mut self,
        op: OpId,
        port: Port,
        tensor: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let training = self.training;
        let Some(site) = self
            .sites
            .iter_mut()
            .find(|site| site.op == op && site.port == port)
        else {
            return tensor;
        };
        if training {
            let min = tensor.to_owned().min().into_scalar().elem::<f32>();
            let max = tensor.to_owned().max().into_scalar().elem::<f32>();
            site.observer.observe(min, max);
        }
        let params = AffineParams::from_range(
            site.bits,
            site.observer.min(),
            site.observer.max(),
        );
        round::fake_quantize_affine(tensor, &params)
    }
}

impl<B: Backend> Compressor<B> for QatQuantizer {
    fn name(&self) -> &'static str {
        "qat"
    }

    fn compress(
        &mut self,
        model: Vae<B>,
    ) -> Result<Vae<B>, Error> {
        let dim_input = model.fc1.weight.dims()[0];
        let warmup = Tensor::random(
            [Self::WARMUP_BATCH, dim_input],
            Distribution::Normal(0.0, 1.0),
            &model.device(),
        );
        self.forward(&model, warmup);

        log::debug!(
            target: "vae_compress::quant::qat",
            "observers warmed up on {} ops",
            self.plan.ops.len(),
        );

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
        let min = weight.to_owned().min().into_scalar().elem::<f32>();
        let max = weight.to_owned().max().into_scalar().elem::<f32>();
        let params = AffineParams::from_range(bits, min, max);
        round::fake_quantize_affine(weight, &params)
    }

    fn input(
        &mut self,
        op: OpId,
        input: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        self.quantize_activation(op, Port::Input, input)
    }

    fn output(
        &mut self,
        op: OpId,
        output: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        self.quantize_activation(op, Port::Output, output)
    }

    fn set_training(
        &mut self,
        training: bool,
    ) {
        self.training = training;
    }

    fn calibration(&self) -> CalibrationConfig {
        let mut ports = Vec::new();
        for (op, resolved) in &self.plan.ops {
            if let Some(bits) = resolved.weight {
                let params = AffineParams {
                    scale: 0.0,
                    zero_point: 0.0,
                    range_min: 0.0,
                    range_max: round::grid_levels(bits),
                };
                ports.push(PortCalibration::from_params(
                    *op,
                    Port::Weight,
                    bits,
                    &params,
                    0.0,
                    0.0,
                ));
            }
            for site in &self.sites {
                if site.op != *op {
                    continue;
                }
                let params = AffineParams::from_range(
                    site.bits,
                    site.observer.min(),
                    site.observer.max(),
                );
                ports.push(PortCalibration::from_params(
                    site.op,
                    site.port,
                    site.bits,
                    &params,
                    site.observer.min(),
                    site.observer.max(),
                ));
            }
        }
        CalibrationConfig::new(Compressor::<B>::name(self).to_string(), ports)
    }
}
