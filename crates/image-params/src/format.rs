//! Supported output image formats

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output formats the transformer can encode
///
/// `Jpeg` and `Jpg` encode identically but stay distinct so that each
/// spelling gets its own cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Webp,
    Avif,
    Jpeg,
    Jpg,
    Png,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 5] = [
        ImageFormat::Webp,
        ImageFormat::Avif,
        ImageFormat::Jpeg,
        ImageFormat::Jpg,
        ImageFormat::Png,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Jpeg | ImageFormat::Jpg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive parse
impl FromStr for ImageFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ImageFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == lower)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PNG".parse::<ImageFormat>(), Ok(ImageFormat::Png));
        assert_eq!("WebP".parse::<ImageFormat>(), Ok(ImageFormat::Webp));
        assert_eq!("jpg".parse::<ImageFormat>(), Ok(ImageFormat::Jpg));
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!("tiff".parse::<ImageFormat>().is_err());
        assert!("".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_jpeg_spellings_share_content_type() {
        assert_eq!(ImageFormat::Jpeg.content_type(), "image/jpeg");
        assert_eq!(ImageFormat::Jpg.content_type(), "image/jpeg");
        assert_ne!(ImageFormat::Jpeg, ImageFormat::Jpg);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ImageFormat::Avif).unwrap(),
            "\"avif\""
        );
    }
}
