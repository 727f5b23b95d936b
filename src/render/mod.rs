//! Image sheet rendering.

pub use crate::error::Error;
pub use image::GrayImage;

use burn::tensor::{backend::Backend, Tensor};
use std::{fs, path::Path};

/// Side length of one image cell.
pub const CELL_DIM: u32 = 28;
/// Padding between image cells.
pub const CELL_PAD: u32 = 2;

/// Arrange flattened grey images into a padded sheet.
///
/// ## Shapes
///
/// * `images` - `[N, 784]`
///
/// ## Details
///
/// Intensities in `[0.0, 1.0]` rescale onto the byte range. Padding
/// stays black.
pub fn image_grid<B: Backend>(
    images: Tensor<B, 2>,
    images_per_row: usize,
) -> GrayImage {
    let count = images.dims()[0];
    let columns = images_per_row.clamp(1, count.max(1));
    let rows = count.div_ceil(columns);
    let span = CELL_DIM + CELL_PAD;
    let mut sheet = GrayImage::new(
        columns as u32 * span + CELL_PAD,
        rows as u32 * span + CELL_PAD,
    );

    let cell_area = (CELL_DIM * CELL_DIM) as usize;
    let values = images.into_data().iter::<f32>().collect::<Vec<_>>();
    for (index, cell) in values.chunks(cell_area).enumerate() {
        let origin_x = (index % columns) as u32 * span + CELL_PAD;
        let origin_y = (index / columns) as u32 * span + CELL_PAD;
        for (offset, value) in cell.iter().enumerate() {
            let x = origin_x + offset as u32 % CELL_DIM;
            let y = origin_y + offset as u32 / CELL_DIM;
            let byte = (value * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
            sheet.put_pixel(x, y, image::Luma([byte]));
        }
    }
    sheet
}

/// Render an image sheet and save it as PNG.
pub fn save_grid<B: Backend>(
    images: Tensor<B, 2>,
    images_per_row: usize,
    path: &Path,
) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let sheet = image_grid(images, images_per_row);
    sheet.save(path)?;

    log::debug!(
        target: "vae_compress::render",
        "{} by {} sheet saved to {path:?}",
        sheet.width(),
        sheet.height(),
    );

    Ok(())
}

/// Save originals above their reconstructions, one column per image.
pub fn save_comparison<B: Backend>(
    originals: Tensor<B, 2>,
    reconstructions: Tensor<B, 2>,
    limit: usize,
    path: &Path,
) -> Result<(), Error> {
    let count = limit
        .min(originals.dims()[0])
        .min(reconstructions.dims()[0]);
    let dim = originals.dims()[1];
    let top = originals.slice([0..count, 0..dim]);
    let bottom = reconstructions.slice([0..count, 0..dim]);
    save_grid(Tensor::cat(vec![top, bottom], 0), count, path)
}
