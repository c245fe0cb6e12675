use crate::image_model::ImageModel;

pub mod batch;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod image_model;
pub mod prompt_file;
pub mod work;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};

pub type ImgModBox = Box<dyn ImageModel + Send + Sync>;
pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_IMAGE_EXTENSION: &str = "webp";
