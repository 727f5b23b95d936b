//! MNIST batching.

pub mod synthetic;

pub use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::vision::{MnistDataset, MnistItem},
    },
    tensor::{backend::Backend, Tensor, TensorData},
};

/// Flattened image dimension.
pub const IMAGE_DIM: usize = 28 * 28;
/// Largest raw pixel intensity.
pub const PIXEL_MAX: f32 = 255.0;

/// A batch of flattened grey images.
#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Pixel intensities in `[0.0, 1.0]`.
    ///
    /// The shape is `[B, 784]`.
    pub images: Tensor<B, 2>,
}

/// Collate MNIST items into flattened, rescaled batches.
#[derive(Clone, Debug)]
pub struct VaeBatcher<B: Backend> {
    /// Device receiving the batches.
    pub device: B::Device,
}

impl<B: Backend> VaeBatcher<B> {
    /// Initialize the batcher on the given device.
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<MnistItem, MnistBatch<B>> for VaeBatcher<B> {
    fn batch(
        &self,
        items: Vec<MnistItem>,
    ) -> MnistBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::from(item.image))
            .map(|data| {
                Tensor::<B, 2>::from_data(
                    data.convert::<B::FloatElem>(),
                    &self.device,
                )
            })
            .map(|tensor| tensor.reshape([1, IMAGE_DIM]))
            .map(|tensor| tensor / PIXEL_MAX)
            .collect();
        let images = Tensor::cat(images, 0);
        MnistBatch { images }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn batch_is_flattened_and_rescaled() {
        use super::*;
        use burn::backend::NdArray;

        type B = NdArray<f32>;
        let device = Default::default();

        let batcher = VaeBatcher::<B>::new(device);
        let batch = batcher.batch(synthetic::items(3, 9));
        assert_eq!(batch.images.dims(), [3, IMAGE_DIM]);

        let max = batch.images.to_owned().max().into_scalar();
        let min = batch.images.min().into_scalar();
        assert!(min >= 0.0);
        assert!(max <= 1.0);
    }
}
