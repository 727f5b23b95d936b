//! Variational autoencoder.

pub mod loss;

pub use burn::{
    config::Config,
    module::Module,
    nn::Linear,
    tensor::{backend::Backend, Tensor},
};
pub use loss::VaeLoss;

use burn::{
    nn::LinearConfig,
    tensor::{activation, Distribution},
};
use humansize::{format_size, BINARY};

/// The configuration for [`Vae`].
#[derive(Config, Copy, Debug)]
pub struct VaeConfig {
    /// Flattened input image dimension.
    #[config(default = 784)]
    pub dim_input: usize,
    /// Hidden layer dimension.
    #[config(default = 400)]
    pub dim_hidden: usize,
    /// Latent code dimension.
    #[config(default = 20)]
    pub dim_latent: usize,
}

/// Bounded rectifier.
///
/// `output = min(max(input, 0), 6)`
#[derive(Clone, Debug, Default, Module)]
pub struct Relu6 {}

impl Relu6 {
    /// Initialize the activation.
    #[inline]
    pub const fn init() -> Self {
        Self {}
    }

    /// Clamp the input tensor to `[0.0, 6.0]`.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        input.clamp(0.0, 6.0)
    }
}

/// Variational autoencoder over flattened grey images.
///
/// ## Details
///
/// The encoder maps an image to the mean and log-variance of a diagonal
/// Gaussian over the latent code. The decoder maps a latent code back to
/// pixel probabilities.
#[derive(Debug, Module)]
pub struct Vae<B: Backend> {
    /// Encoder input layer.
    pub fc1: Linear<B>,
    /// Latent mean head.
    pub fc21: Linear<B>,
    /// Latent log-variance head.
    pub fc22: Linear<B>,
    /// Decoder input layer.
    pub fc3: Linear<B>,
    /// Decoder output layer.
    pub fc4: Linear<B>,
    /// Encoder activation.
    pub ac1: Relu6,
    /// Decoder activation.
    pub ac2: Relu6,
}

/// The output of [`Vae::forward`].
#[derive(Clone, Debug)]
pub struct VaeOutput<B: Backend> {
    /// Reconstructed pixel probabilities.
    ///
    /// The shape is `[B, dim_input]`.
    pub reconstruction: Tensor<B, 2>,
    /// Latent means.
    ///
    /// The shape is `[B, dim_latent]`.
    pub mean: Tensor<B, 2>,
    /// Latent log-variances.
    ///
    /// The shape is `[B, dim_latent]`.
    pub log_var: Tensor<B, 2>,
}

impl VaeConfig {
    /// Initialize from the configuration.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Vae<B> {
        let fc1 = LinearConfig::new(self.dim_input, self.dim_hidden).init(device);
        let fc21 = LinearConfig::new(self.dim_hidden, self.dim_latent).init(device);
        let fc22 = LinearConfig::new(self.dim_hidden, self.dim_latent).init(device);
        let fc3 = LinearConfig::new(self.dim_latent, self.dim_hidden).init(device);
        let fc4 = LinearConfig::new(self.dim_hidden, self.dim_input).init(device);
        let ac1 = Relu6::init();
        let ac2 = Relu6::init();
        Vae {
            fc1,
            fc21,
            fc22,
            fc3,
            fc4,
            ac1,
            ac2,
        }
    }
}

impl<B: Backend> Vae<B> {
    /// Encode the input images into latent means and log-variances.
    ///
    /// ## Shapes
    ///
    /// * `input` - `[B, dim_input]`
    /// * `output` - `([B, dim_latent], [B, dim_latent])`
    pub fn encode(
        &self,
        input: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let hidden = self.ac1.forward(self.fc1.forward(input));
        let mean = self.fc21.forward(hidden.to_owned());
        let log_var = self.fc22.forward(hidden);
        (mean, log_var)
    }

    /// Draw a latent code from the encoded distribution.
    ///
    /// `output = mean + eps * exp(0.5 * log_var), eps ~ N(0, 1)`
    pub fn reparameterize(
        &self,
        mean: Tensor<B, 2>,
        log_var: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let std_dev = log_var.mul_scalar(0.5).exp();
        let eps = std_dev.random_like(Distribution::Normal(0.0, 1.0));
        eps * std_dev + mean
    }

    /// Decode the latent codes into pixel probabilities.
    ///
    /// ## Shapes
    ///
    /// * `input` - `[B, dim_latent]`
    /// * `output` - `[B, dim_input]`
    pub fn decode(
        &self,
        input: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let hidden = self.ac2.forward(self.fc3.forward(input));
        activation::sigmoid(self.fc4.forward(hidden))
    }

    /// Applies the forward pass on the input tensor.
    ///
    /// ## Shapes
    ///
    /// * `input` - `[B, dim_input]`
    pub fn forward(
        &self,
        input: Tensor<B, 2>,
    ) -> VaeOutput<B> {
        let (mean, log_var) = self.encode(input);
        let latent = self.reparameterize(mean.to_owned(), log_var.to_owned());
        let reconstruction = self.decode(latent);
        VaeOutput {
            reconstruction,
            mean,
            log_var,
        }
    }
}

/// Attribute getters
impl<B: Backend> Vae<B> {
    /// The device where the model is located.
    #[inline]
    pub fn device(&self) -> B::Device {
        self.devices().first().expect("A device").to_owned()
    }

    /// Size of the parameters in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.num_params() * size_of::<B::FloatElem>()
    }

    /// Readable size of the parameters.
    #[inline]
    pub fn size_readable(&self) -> String {
        format_size(self.size(), BINARY.decimal_places(1))
    }
}

impl Default for VaeConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn encode_shapes() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = &Default::default();

        let model = VaeConfig::default().init::<B>(device);
        let input = Tensor::<B, 2>::zeros([4, 784], device);
        let (mean, log_var) = model.encode(input);
        assert_eq!(mean.dims(), [4, 20]);
        assert_eq!(log_var.dims(), [4, 20]);
    }

    #[test]
    fn round_trip_preserves_shape() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = &Default::default();

        let model = VaeConfig::default()
            .with_dim_hidden(16)
            .with_dim_latent(4)
            .init::<B>(device);
        let input = Tensor::<B, 2>::random(
            [3, 784],
            Distribution::Uniform(0.0, 1.0),
            device,
        );
        let output = model.forward(input);
        assert_eq!(output.reconstruction.dims(), [3, 784]);
        assert_eq!(output.mean.dims(), [3, 4]);
        assert_eq!(output.log_var.dims(), [3, 4]);

        let max = output.reconstruction.to_owned().max().into_scalar();
        let min = output.reconstruction.min().into_scalar();
        assert!(min >= 0.0);
        assert!(max <= 1.0);
    }

    #[test]
    fn reparameterize_scales_by_the_log_variance() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = &Default::default();

        let model = VaeConfig::default()
            .with_dim_hidden(8)
            .with_dim_latent(3)
            .init::<B>(device);

        let mean = Tensor::<B, 2>::full([2, 3], 5.0, device);
        let log_var = Tensor::<B, 2>::full([2, 3], -20.0, device);
        let latent = model.reparameterize(mean, log_var);
        latent.into_data().assert_approx_eq(
            &Tensor::<B, 2>::full([2, 3], 5.0, device).into_data(),
            3,
        );

        let zeros = Tensor::<B, 2>::zeros([4, 8], device);
        let first = model.reparameterize(zeros.to_owned(), zeros.to_owned());
        let second = model.reparameterize(zeros.to_owned(), zeros);
        let difference = (first - second).abs().max().into_scalar();
        assert!(difference > 0.0);
    }

    #[test]
    fn reparameterize_replays_under_a_fixed_seed() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = &Default::default();

        let model = VaeConfig::default()
            .with_dim_hidden(8)
            .with_dim_latent(3)
            .init::<B>(device);
        let mean = Tensor::<B, 2>::zeros([4, 3], device);
        let log_var = Tensor::<B, 2>::zeros([4, 3], device);

        B::seed(9);
        let first = model.reparameterize(mean.to_owned(), log_var.to_owned());
        B::seed(9);
        let second = model.reparameterize(mean, log_var);
        first.into_data().assert_eq(&second.into_data(), true);
    }

    #[test]
    fn relu6_bounds() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = &Default::default();

        let input = Tensor::<B, 2>::from_data([[-1.0, 0.5, 3.0, 9.0]], device);
        let output = Relu6::init().forward(input);
        output.into_data().assert_eq(
            &Tensor::<B, 2>::from_data([[0.0, 0.5, 3.0, 6.0]], device).into_data(),
            true,
        );
    }

    #[test]
    fn parameter_count() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = &Default::default();

        let model = VaeConfig::default().init::<B>(device);
        assert_eq!(model.num_params(), 652_824);
        assert_eq!(model.size(), 652_824 * size_of::<f32>());
    }
}
