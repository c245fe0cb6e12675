use std::pin::Pin;

use thiserror::Error;

pub mod models;
pub mod output;
pub mod replicate;

pub use replicate::{ModelSummary, ReplicateImageModel};

/// A generated image together with the locator it was downloaded from.
#[derive(Debug, Clone)]
pub struct Image {
    pub data: Vec<u8>,
    pub source: String,
}

/// Per-image failures. None of these are retried.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Unrecognized model output: {0}")]
    UnrecognizedOutputShape(String),

    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub trait ImageModel {
    /// Runs `model` on `prompt` and downloads the resulting image.
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Image, GenerateError>> + Send + 'a>>;

    fn clone(&self) -> Box<dyn ImageModel + Send + Sync + 'static>;
}
