use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Calibration data error: {0}")]
    CalibrationData(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
