//! Straight-through rounding.

pub use super::*;

/// Substitute the gradient of a quantized tensor with the identity.
///
/// `output = quantized, d output = d input`
pub fn straight_through<B: Backend, const D: usize>(
    quantized: Tensor<B, D>,
    input: Tensor<B, D>,
) -> Tensor<B, D> {
    (quantized - input.to_owned()).detach() + input
}

/// Binarize a tensor to `{-1, 1}` with a hard tanh estimator.
///
/// `output = sign(input), 1 at zero, d output = d input if |input| <= 1 else 0`
pub fn binarize<B: Backend, const D: usize>(input: Tensor<B, D>) -> Tensor<B, D> {
    let clipped = input.clamp(-1.0, 1.0);
    let signs = clipped.to_owned().sign();
    let signs = signs.to_owned().mask_fill(signs.equal_elem(0.0), 1.0);
    (signs - clipped.to_owned()).detach() + clipped
}

/// Fake-quantize a tensor on an affine integer grid.
///
/// `output = (clamp(round(input / scale + zero_point)) - zero_point) * scale`
///
/// ## Details
///
/// The gradient passes through unchanged inside the representable range
/// and vanishes where the rounded position saturates. Ties round up.
pub fn fake_quantize_affine<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    params: &AffineParams,
) -> Tensor<B, D> {
    let scaled = input
        .to_owned()
        .div_scalar(params.scale)
        .add_scalar(params.zero_point);
    let rounded = scaled.add_scalar(0.5).floor();
    let quantized = rounded
        .to_owned()
        .clamp(params.range_min, params.range_max)
        .sub_scalar(params.zero_point)
        .mul_scalar(params.scale);

    let position = rounded.detach();
    let mask = position.to_owned().greater_equal_elem(params.range_min).float()
        * position.lower_equal_elem(params.range_max).float();
    let passed = input * mask;
    (quantized - passed.to_owned()).detach() + passed
}

/// The number of unit steps on a `bits`-wide integer grid.
#[inline]
pub fn grid_levels(bits: usize) -> f32 {
    ((1_u64 << bits) - 1) as f32
}

#[cfg(test)]
mod tests {
    #[test]
    fn straight_through_keeps_the_gradient() {
        use super::*;
        use burn::backend::{Autodiff, NdArray};

        type B = Autodiff<NdArray<f32>>;
        let device = &Default::default();

        let input = Tensor::<B, 1>::from_floats([-1.6, -0.5, 0.4, 1.5], device)
            .require_grad();
        let rounded = input.to_owned().add_scalar(0.5).floor();
        let output = straight_through(rounded, input.to_owned());
        output
            .to_owned()
            .into_data()
            .assert_eq(&Tensor::<B, 1>::from_floats([-2.0, 0.0, 0.0, 2.0], device)
                .into_data(), true);

        let grads = output.sum().backward();
        let grad = input.grad(&grads).unwrap();
        grad.into_data().assert_eq(
            &Tensor::<NdArray<f32>, 1>::from_floats([1.0, 1.0, 1.0, 1.0], device)
                .into_data(),
            true,
        );
    }

    #[test]
    fn binarize_clips_the_gradient() {
        use super::*;
        use burn::backend::{Autodiff, NdArray};

        type B = Autodiff<NdArray<f32>>;
        let device = &Default::default();

        let input = Tensor::<B, 1>::from_floats([-2.0, -0.5, 0.5, 2.0], device)
            .require_grad();
        let output = binarize(input.to_owned());
        output
            .to_owned()
            .into_data()
            .assert_eq(&Tensor::<B, 1>::from_floats([-1.0, -1.0, 1.0, 1.0], device)
                .into_data(), true);

        let grads = output.sum().backward();
        let grad = input.grad(&grads).unwrap();
        grad.into_data().assert_eq(
            &Tensor::<NdArray<f32>, 1>::from_floats([0.0, 1.0, 1.0, 0.0], device)
                .into_data(),
            true,
        );
    }

    #[test]
    fn affine_masks_saturated_gradients() {
        use super::*;
        use burn::backend::{Autodiff, NdArray};

        type B = Autodiff<NdArray<f32>>;
        let device = &Default::default();

        let params = AffineParams {
            scale: 1.0,
            zero_point: 0.0,
            range_min: 0.0,
            range_max: 3.0,
        };
        let input = Tensor::<B, 1>::from_floats([-1.2, 0.4, 2.6, 4.1], device)
            .require_grad();
        let output = fake_quantize_affine(input.to_owned(), &params);
        output
            .to_owned()
            .into_data()
            .assert_eq(&Tensor::<B, 1>::from_floats([0.0, 0.0, 3.0, 3.0], device)
                .into_data(), true);

        let grads = output.sum().backward();
        let grad = input.grad(&grads).unwrap();
        grad.into_data().assert_eq(
            &Tensor::<NdArray<f32>, 1>::from_floats([0.0, 1.0, 1.0, 0.0], device)
                .into_data(),
            true,
        );
    }

    #[test]
    fn binarize_sends_zeros_positive() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = &Default::default();

        let input = Tensor::<B, 1>::from_floats([-2.0, 0.0, 0.5], device);
        binarize(input).into_data().assert_eq(
            &Tensor::<B, 1>::from_floats([-1.0, 1.0, 1.0], device).into_data(),
            true,
        );
    }

    #[test]
    fn grids_have_the_expected_levels() {
        use super::*;

        assert_eq!(grid_levels(1), 1.0);
        assert_eq!(grid_levels(2), 3.0);
        assert_eq!(grid_levels(8), 255.0);
    }
}
