pub use burn::record::RecorderError;
pub use image::ImageError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Image Error: {0}")]
    Image(#[from] ImageError),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recorder Error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Validation Error: {0} should be {1}")]
    Validation(String, String),
}
