//! Reconstruction loss.

pub use super::*;

/// Evidence lower bound loss for [`Vae`] outputs.
///
/// `loss = BCE(reconstruction, target) + KLD(mean, log_var)`
///
/// ## Details
///
/// Both terms are summed over all elements, not averaged.
#[derive(Clone, Copy, Debug, Default, Module)]
pub struct VaeLoss;

impl VaeLoss {
    /// Probability clamp bound keeping the logarithms finite.
    pub const EPSILON: f32 = 1e-7;

    /// Initialize the loss.
    #[inline]
    pub const fn init() -> Self {
        Self
    }

    /// Compute the summed loss over the batch.
    ///
    /// ## Shapes
    ///
    /// * `reconstruction`, `target` - `[B, dim_input]`
    /// * `mean`, `log_var` - `[B, dim_latent]`
    /// * `output` - `[1]`
    pub fn forward<B: Backend>(
        &self,
        reconstruction: Tensor<B, 2>,
        target: Tensor<B, 2>,
        mean: Tensor<B, 2>,
        log_var: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        self.bce(reconstruction, target) + self.kld(mean, log_var)
    }

    /// Binary cross-entropy summed over all elements.
    pub fn bce<B: Backend>(
        &self,
        reconstruction: Tensor<B, 2>,
        target: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let probability =
            reconstruction.clamp(Self::EPSILON, 1.0 - Self::EPSILON);
        let likelihood = target.to_owned() * probability.to_owned().log()
            + (-target + 1.0) * (-probability + 1.0).log();
        -likelihood.sum()
    }

    /// Kullback-Leibler divergence from the unit Gaussian, summed.
    ///
    /// `output = -0.5 * sum(1 + log_var - mean^2 - exp(log_var))`
    pub fn kld<B: Backend>(
        &self,
        mean: Tensor<B, 2>,
        log_var: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let inner =
            log_var.to_owned() + 1.0 - mean.powf_scalar(2.0) - log_var.exp();
        inner.sum().mul_scalar(-0.5)
    }
}
