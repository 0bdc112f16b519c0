use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Model load failed on {backend}: {reason}")]
    ModelLoad { backend: String, reason: String },

    #[error("Label list has {labels} entries but model produces {outputs} scores")]
    LabelMismatch { labels: usize, outputs: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model handle has been disposed")]
    HandleDisposed,

    #[error("Invalid quantity: {grams} g")]
    InvalidQuantity { grams: f64 },

    #[error("Invalid biometric {field}: {value}")]
    InvalidBiometric { field: &'static str, value: f64 },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Worker Error: {0}")]
    Worker(String),
}

/// Stable discriminant for callers that render their own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidImage,
    ModelLoadError,
    LabelMismatch,
    InferenceError,
    HandleDisposed,
    InvalidQuantity,
    InvalidBiometric,
    Io,
    Config,
    Worker,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidImage(_) | Self::Image(_) => ErrorKind::InvalidImage,
            Self::ModelLoad { .. } => ErrorKind::ModelLoadError,
            Self::LabelMismatch { .. } => ErrorKind::LabelMismatch,
            Self::Inference(_) => ErrorKind::InferenceError,
            Self::HandleDisposed => ErrorKind::HandleDisposed,
            Self::InvalidQuantity { .. } => ErrorKind::InvalidQuantity,
            Self::InvalidBiometric { .. } => ErrorKind::InvalidBiometric,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::Config(_) => ErrorKind::Config,
            Self::Worker(_) => ErrorKind::Worker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_for_core_errors() {
        assert_eq!(Error::HandleDisposed.kind(), ErrorKind::HandleDisposed);
        assert_eq!(
            Error::InvalidQuantity { grams: -1.0 }.kind(),
            ErrorKind::InvalidQuantity
        );
        assert_eq!(
            Error::LabelMismatch { labels: 3, outputs: 4 }.kind(),
            ErrorKind::LabelMismatch
        );
    }

    #[test]
    fn biometric_error_names_the_field() {
        let err = Error::InvalidBiometric {
            field: "age_years",
            value: 0.0,
        };
        assert_eq!(err.to_string(), "Invalid biometric age_years: 0");
    }
}
