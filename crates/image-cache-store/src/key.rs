//! Cache key derivation

use image_params::ImageParams;
use sha2::{Digest, Sha256};

/// Generate a cache key from a source path and transform parameters
///
/// Parameters are serialized as JSON in the fixed order width, height,
/// quality, format with absent fields left out, then hashed together with
/// the path. The hex digest is also the file name on disk.
pub fn cache_key(source_path: &str, params: &ImageParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", source_path, params_json(params)).as_bytes());
    hex::encode(hasher.finalize())
}

fn params_json(params: &ImageParams) -> String {
    let mut fields = Vec::with_capacity(4);
    if let Some(width) = params.width {
        fields.push(format!("\"width\":{}", width));
    }
    if let Some(height) = params.height {
        fields.push(format!("\"height\":{}", height));
    }
    if let Some(quality) = params.quality {
        fields.push(format!("\"quality\":{}", quality));
    }
    fields.push(format!("\"format\":\"{}\"", params.format));

    format!("{{{}}}", fields.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_params::ImageFormat;

    #[test]
    fn test_same_inputs_same_key() {
        let params = ImageParams::new(ImageFormat::Webp)
            .with_width(100)
            .with_height(200)
            .with_quality(80);

        let key1 = cache_key("/path/to/image.jpg", &params);
        let key2 = cache_key("/path/to/image.jpg", &params);

        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64);
    }

    #[test]
    fn test_construction_order_does_not_matter() {
        let a = ImageParams::new(ImageFormat::Png)
            .with_quality(50)
            .with_width(10);
        let b = ImageParams {
            width: Some(10),
            quality: Some(50),
            height: None,
            format: ImageFormat::Png,
        };

        assert_eq!(cache_key("img.jpg", &a), cache_key("img.jpg", &b));
    }

    #[test]
    fn test_different_paths_differ() {
        let params = ImageParams::new(ImageFormat::Png).with_width(100);
        assert_ne!(
            cache_key("/path1/image.jpg", &params),
            cache_key("/path2/image.jpg", &params)
        );
    }

    #[test]
    fn test_each_field_changes_the_key() {
        let path = "/path/to/image.jpg";
        let base = ImageParams::new(ImageFormat::Jpg)
            .with_width(100)
            .with_height(200);
        let key = cache_key(path, &base);

        assert_ne!(key, cache_key(path, &base.with_width(150)));
        assert_ne!(key, cache_key(path, &base.with_height(250)));
        assert_ne!(key, cache_key(path, &base.with_quality(90)));
        assert_ne!(
            key,
            cache_key(
                path,
                &ImageParams {
                    format: ImageFormat::Jpeg,
                    ..base
                }
            )
        );
    }

    #[test]
    fn test_params_serialization_omits_absent_fields() {
        assert_eq!(
            params_json(&ImageParams::new(ImageFormat::Png)),
            r#"{"format":"png"}"#
        );
        assert_eq!(
            params_json(&ImageParams::new(ImageFormat::Webp).with_quality(80).with_width(100)),
            r#"{"width":100,"quality":80,"format":"webp"}"#
        );
    }

    #[test]
    fn test_key_is_lowercase_hex() {
        let key = cache_key("/path", &ImageParams::new(ImageFormat::Png).with_width(100));
        assert!(key
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
