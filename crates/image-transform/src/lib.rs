//! Image transformation
//!
//! Decodes a source image, shrinks it to fit the requested box and encodes
//! it in the requested output format.

mod error;
mod transformer;

pub use error::{Result, TransformError};
pub use transformer::{
    fit_inside, png_compression_level, ImageTransformer, RasterTransformer, TransformSettings,
    TransformedImage,
};
