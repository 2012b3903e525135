//! Raw query shapes and validated image parameters

use crate::format::ImageFormat;
use serde::{Deserialize, Serialize};

/// Query string of an image request, short aliases take precedence
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageQuery {
    pub url: Option<String>,
    pub src: Option<String>,
    pub w: Option<String>,
    pub width: Option<String>,
    pub h: Option<String>,
    pub height: Option<String>,
    pub q: Option<String>,
    pub quality: Option<String>,
    pub f: Option<String>,
    pub format: Option<String>,
}

impl ImageQuery {
    /// Build from decoded query pairs; the first occurrence of a key wins
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "url" => &mut query.url,
                "src" => &mut query.src,
                "w" => &mut query.w,
                "width" => &mut query.width,
                "h" => &mut query.h,
                "height" => &mut query.height,
                "q" => &mut query.q,
                "quality" => &mut query.quality,
                "f" => &mut query.f,
                "format" => &mut query.format,
                _ => continue,
            };
            set_once(slot, value);
        }
        query
    }
}

/// Query string of a content request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContentQuery {
    pub src: Option<String>,
    pub url: Option<String>,
}

impl ContentQuery {
    /// Build from decoded query pairs; the first occurrence of a key wins
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "src" => set_once(&mut query.src, value),
                "url" => set_once(&mut query.url, value),
                _ => {}
            }
        }
        query
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

/// Validated transform parameters
///
/// Feeds the cache key, so any new field must also be added to the key
/// serialization in `image-cache-store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageParams {
    pub format: ImageFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
}

impl ImageParams {
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            width: None,
            height: None,
            quality: None,
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }
}
