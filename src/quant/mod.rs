//! Model compression strategies.
//!
//! A strategy fake-quantizes the weights and activations of a [`Vae`]
//! following a declarative per-op configuration list. The same strategy
//! object drives compression, the quantized data path, and calibration
//! export.

pub mod bnn;
pub mod calibration;
pub mod dorefa;
pub mod naive;
pub mod observer;
pub mod qat;
pub mod round;

pub use crate::{
    error::Error,
    model::{Vae, VaeOutput},
};
pub use bnn::BnnQuantizer;
pub use burn::{
    config::Config,
    module::{Module, Param},
    nn::Linear,
    tensor::{backend::Backend, Distribution, ElementConversion, Tensor},
};
pub use calibration::{CalibrationConfig, PortCalibration};
pub use dorefa::DorefaQuantizer;
pub use naive::NaiveQuantizer;
pub use observer::{AffineParams, MovingMinMax};
pub use qat::QatQuantizer;

use burn::tensor::activation;
use std::fmt;

/// Quantizable operations of the [`Vae`] data path, in forward order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum OpId {
    /// Encoder input layer.
    Fc1,
    /// Encoder activation.
    Relu1,
    /// Latent mean head.
    Fc21,
    /// Latent log-variance head.
    Fc22,
    /// Decoder input layer.
    Fc3,
    /// Decoder activation.
    Relu2,
    /// Decoder output layer.
    Fc4,
}

impl OpId {
    /// All operations in forward order.
    pub const ALL: [Self; 7] = [
        Self::Fc1,
        Self::Relu1,
        Self::Fc21,
        Self::Fc22,
        Self::Fc3,
        Self::Relu2,
        Self::Fc4,
    ];

    /// The operation name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Fc1 => "fc1",
            Self::Relu1 => "relu1",
            Self::Fc21 => "fc21",
            Self::Fc22 => "fc22",
            Self::Fc3 => "fc3",
            Self::Relu2 => "relu2",
            Self::Fc4 => "fc4",
        }
    }

    /// Whether the operation is an activation without weights.
    #[inline]
    pub const fn is_activation(&self) -> bool {
        matches!(self, Self::Relu1 | Self::Relu2)
    }
}

impl fmt::Display for OpId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quantizable data ports of an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Port {
    /// Layer weights.
    Weight,
    /// Input activations.
    Input,
    /// Output activations.
    Output,
}

impl Port {
    /// The port name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a declarative quantization configuration list.
///
/// ## Details
///
/// Missing bit widths leave the corresponding port untouched.
#[derive(Clone, Debug)]
pub struct OpQuantConfig {
    /// Targeted operations.
    pub ops: Vec<OpId>,
    /// Weight bit width.
    pub weight_bits: Option<usize>,
    /// Input activation bit width.
    pub input_bits: Option<usize>,
    /// Output activation bit width.
    pub output_bits: Option<usize>,
}

impl OpQuantConfig {
    /// Initialize an entry targeting the given operations.
    pub fn new(ops: &[OpId]) -> Self {
        Self {
            ops: ops.to_vec(),
            weight_bits: None,
            input_bits: None,
            output_bits: None,
        }
    }

    /// Quantize the weights with the given bit width.
    pub fn with_weight(
        mut self,
        bits: usize,
    ) -> Self {
        self.weight_bits = Some(bits);
        self
    }

    /// Quantize the input activations with the given bit width.
    pub fn with_input(
        mut self,
        bits: usize,
    ) -> Self {
        self.input_bits = Some(bits);
        self
    }

    /// Quantize the output activations with the given bit width.
    pub fn with_output(
        mut self,
        bits: usize,
    ) -> Self {
        self.output_bits = Some(bits);
        self
    }
}

/// Resolved bit widths of one operation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PortBits {
    /// Weight bit width.
    pub weight: Option<usize>,
    /// Input activation bit width.
    pub input: Option<usize>,
    /// Output activation bit width.
    pub output: Option<usize>,
}

/// Ports a strategy family can quantize.
#[derive(Clone, Copy, Debug)]
pub struct PortCaps {
    /// Weights.
    pub weight: bool,
    /// Input activations.
    pub input: bool,
    /// Output activations.
    pub output: bool,
}

impl PortCaps {
    #[inline]
    const fn supports(
        &self,
        port: Port,
    ) -> bool {
        match port {
            Port::Weight => self.weight,
            Port::Input => self.input,
            Port::Output => self.output,
        }
    }
}

/// A validated quantization plan, ordered like [`OpId::ALL`].
#[derive(Clone, Debug, Default)]
pub struct QuantPlan {
    /// Configured operations and their resolved ports.
    pub ops: Vec<(OpId, PortBits)>,
}

impl QuantPlan {
    /// Compile and validate a configuration list against the family caps.
    ///
    /// ## Details
    ///
    /// Later entries override earlier ones per op and port.
    pub fn compile(
        configure: &[OpQuantConfig],
        caps: PortCaps,
    ) -> Result<Self, Error> {
        let mut resolved = [PortBits::default(); OpId::ALL.len()];
        for entry in configure {
            if entry.ops.is_empty() {
                return Err(Error::Validation(
                    "the op list of a quantization entry".to_string(),
                    "non-empty".to_string(),
                ));
            }
            let ports = [
                (Port::Weight, entry.weight_bits),
                (Port::Input, entry.input_bits),
                (Port::Output, entry.output_bits),
            ];
            if ports.iter().all(|(_, bits)| bits.is_none()) {
                return Err(Error::Validation(
                    "a quantization entry".to_string(),
                    "targeting at least one port".to_string(),
                ));
            }
            for &op in &entry.ops {
                for (port, bits) in ports {
                    let Some(bits) = bits else {
                        continue;
                    };
                    if !(1..=32).contains(&bits) {
                        return Err(Error::Validation(
                            format!("{bits} bits on {op} {port}"),
                            "within 1..=32".to_string(),
                        ));
                    }
                    if port == Port::Weight && op.is_activation() {
                        return Err(Error::Validation(
                            format!("weight quantization on {op}"),
                            "applied to a weighted op".to_string(),
                        ));
                    }
                    if !caps.supports(port) {
                        return Err(Error::Validation(
                            format!("{port} quantization on {op}"),
                            "a port supported by the strategy".to_string(),
                        ));
                    }
                    let slot = &mut resolved[op as usize];
                    match port {
                        Port::Weight => slot.weight = Some(bits),
                        Port::Input => slot.input = Some(bits),
                        Port::Output => slot.output = Some(bits),
                    }
                }
            }
        }
        let ops = OpId::ALL
            .into_iter()
            .zip(resolved)
            .filter(|(_, bits)| *bits != PortBits::default())
            .collect();
        Ok(Self { ops })
    }

    /// Resolved ports of the operation.
    #[inline]
    pub fn get(
        &self,
        op: OpId,
    ) -> PortBits {
        self.ops
            .iter()
            .find(|(candidate, _)| *candidate == op)
            .map(|(_, bits)| *bits)
            .unwrap_or_default()
    }
}

/// A model compression strategy.
///
/// ## Details
///
/// `compress` prepares the model once. The port transforms fake-quantize
/// tensors on every pass through the provided data path, so stateful
/// strategies keep observing while the model trains.
pub trait Compressor<B: Backend> {
    /// The strategy family name.
    fn name(&self) -> &'static str;

    /// Prepare the model for the compressed data path.
    fn compress(
        &mut self,
        model: Vae<B>,
    ) -> Result<Vae<B>, Error>;

    /// Transform the weights of the operation.
    fn weight(
        &mut self,
        op: OpId,
        weight: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let _ = op;
        weight
    }

    /// Transform the input activations of the operation.
    fn input(
        &mut self,
        op: OpId,
        input: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let _ = op;
        input
    }

    /// Transform the output activations of the operation.
    fn output(
        &mut self,
        op: OpId,
        output: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let _ = op;
        output
    }

    /// Toggle training-time statistics updates.
    fn set_training(
        &mut self,
        training: bool,
    ) {
        let _ = training;
    }

    /// Snapshot the calibration state for export.
    fn calibration(&self) -> CalibrationConfig;

    /// Encode through the compressed data path.
    fn encode(
        &mut self,
        model: &Vae<B>,
        input: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let input = self.input(OpId::Fc1, input);
        let weight = self.weight(OpId::Fc1, model.fc1.weight.val());
        let hidden = self.output(OpId::Fc1, forward_linear(&model.fc1, weight, input));
        let hidden = self.input(OpId::Relu1, hidden);
        let hidden = self.output(OpId::Relu1, model.ac1.forward(hidden));

        let input = self.input(OpId::Fc21, hidden.to_owned());
        let weight = self.weight(OpId::Fc21, model.fc21.weight.val());
        let mean = self.output(OpId::Fc21, forward_linear(&model.fc21, weight, input));

        let input = self.input(OpId::Fc22, hidden);
        let weight = self.weight(OpId::Fc22, model.fc22.weight.val());
        let log_var =
            self.output(OpId::Fc22, forward_linear(&model.fc22, weight, input));
        (mean, log_var)
    }

    /// Decode through the compressed data path.
    fn decode(
        &mut self,
        model: &Vae<B>,
        latent: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let latent = self.input(OpId::Fc3, latent);
        let weight = self.weight(OpId::Fc3, model.fc3.weight.val());
        let hidden = self.output(OpId::Fc3, forward_linear(&model.fc3, weight, latent));
        let hidden = self.input(OpId::Relu2, hidden);
        let hidden = self.output(OpId::Relu2, model.ac2.forward(hidden));

        let hidden = self.input(OpId::Fc4, hidden);
        let weight = self.weight(OpId::Fc4, model.fc4.weight.val());
        let output = self.output(OpId::Fc4, forward_linear(&model.fc4, weight, hidden));
        activation::sigmoid(output)
    }

    /// Applies the forward pass on the input tensor through the compressed
    /// data path.
    fn forward(
        &mut self,
        model: &Vae<B>,
        input: Tensor<B, 2>,
    ) -> VaeOutput<B> {
        let (mean, log_var) = self.encode(model, input);
        let latent = model.reparameterize(mean.to_owned(), log_var.to_owned());
        let reconstruction = self.decode(model, latent);
        VaeOutput {
            reconstruction,
            mean,
            log_var,
        }
    }
}

/// Apply a linear layer with substituted weights.
///
/// ## Shapes
///
/// * `weight` - `[dim_input, dim_output]`
/// * `input` - `[B, dim_input]`
/// * `output` - `[B, dim_output]`
pub fn forward_linear<B: Backend>(
    layer: &Linear<B>,
    weight: Tensor<B, 2>,
    input: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let output = input.matmul(weight);
    match &layer.bias {
        Some(bias) => output + bias.val().unsqueeze(),
        None => output,
    }
}

/// Mutable access to the weighted layer behind an operation.
pub fn linear_mut<B: Backend>(
    model: &mut Vae<B>,
    op: OpId,
) -> Result<&mut Linear<B>, Error> {
    match op {
        OpId::Fc1 => Ok(&mut model.fc1),
        OpId::Fc21 => Ok(&mut model.fc21),
        OpId::Fc22 => Ok(&mut model.fc22),
        OpId::Fc3 => Ok(&mut model.fc3),
        OpId::Fc4 => Ok(&mut model.fc4),
        OpId::Relu1 | OpId::Relu2 => Err(Error::Validation(
            format!("the weights of {op}"),
            "taken from a weighted op".to_string(),
        )),
    }
}

/// Compression strategy families.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StrategyKind {
    /// Post-training symmetric weight quantization.
    Naive,
    /// Quantization-aware training with affine fake-quantization.
    Qat,
    /// Binarization of weights and activations.
    Bnn,
    /// DoReFa weight and activation quantization.
    Dorefa,
}

impl StrategyKind {
    /// The family name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Qat => "qat",
            Self::Bnn => "bnn",
            Self::Dorefa => "dorefa",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build a compression strategy from a declarative configuration list.
pub fn build<B: Backend>(
    kind: StrategyKind,
    configure: &[OpQuantConfig],
) -> Result<Box<dyn Compressor<B>>, Error> {
    Ok(match kind {
        StrategyKind::Naive => Box::new(NaiveQuantizer::init(configure)?),
        StrategyKind::Qat => Box::new(QatQuantizer::init(configure)?),
        StrategyKind::Bnn => Box::new(BnnQuantizer::init(configure)?),
        StrategyKind::Dorefa => Box::new(DorefaQuantizer::init(configure)?),
    })
}
