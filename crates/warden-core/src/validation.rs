//! Hashing and validation utility.
//!
//! Stateless helpers used by the store: SHA-256 digests, payload sniffing,
//! full image validation, and free-text hygiene for outbound requests.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};
use sha2::{Digest as _, Sha256};

use crate::config::StoreConfig;
use crate::domain::{Digest, MediaType, ValidationError};

/// Punctuation kept by [`sanitize_text_input`] besides word characters and whitespace.
const ALLOWED_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '(', ')', '-'];

/// SHA-256 over `bytes`, hex encoded.
pub fn digest(bytes: &[u8]) -> Digest {
    Digest::from_hex(hex::encode(Sha256::digest(bytes)))
}

/// Identify the payload from its magic bytes.
///
/// Returns the known media type, or the name of whatever else was found.
pub fn sniff(bytes: &[u8]) -> Result<MediaType, String> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok(MediaType::Png),
        Ok(ImageFormat::Jpeg) => Ok(MediaType::Jpeg),
        Ok(other) => Err(format!("{other:?}").to_lowercase()),
        Err(_) => Err("unknown".to_string()),
    }
}

/// Validated payload facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFacts {
    pub media_type: MediaType,
    pub width: u32,
    pub height: u32,
}

/// Run every check an untrusted upload must pass.
///
/// Order: empty, size, type, dimensions, full decode. The first failing
/// check decides the reason.
pub fn validate_image(bytes: &[u8], config: &StoreConfig) -> Result<ImageFacts, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }

    let size = bytes.len() as u64;
    if size > config.max_bytes {
        return Err(ValidationError::Oversize {
            size,
            max: config.max_bytes,
        });
    }

    let media_type = sniff(bytes).map_err(|found| ValidationError::DisallowedType { found })?;
    if !config.allowed.contains(&media_type) {
        return Err(ValidationError::DisallowedType {
            found: media_type.extension().to_string(),
        });
    }

    let corrupt = |e: image::ImageError| ValidationError::Corrupt {
        media: media_type,
        detail: e.to_string(),
    };

    // header only; cheap enough to run before allocating the full raster
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), media_type.image_format())
        .into_dimensions()
        .map_err(corrupt)?;
    let max = config.max_dimension;
    if width > max || height > max {
        return Err(ValidationError::BadDimensions { width, height, max });
    }

    ImageReader::with_format(Cursor::new(bytes), media_type.image_format())
        .decode()
        .map_err(corrupt)?;

    Ok(ImageFacts {
        media_type,
        width,
        height,
    })
}

/// Truncate to `max_len` characters and drop everything except word
/// characters, whitespace and `.,;:!?()-`.
pub fn sanitize_text_input(text: &str, max_len: usize) -> String {
    text.chars()
        .take(max_len)
        .filter(|c| {
            c.is_alphanumeric() || *c == '_' || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c)
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;
    use rstest::rstest;

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest(b"").as_str().len(), 64);
    }

    #[test]
    fn accepts_png_and_jpeg_within_limits() {
        let config = StoreConfig::in_memory();

        let facts = validate_image(&fixtures::png(32, 16), &config).unwrap();
        assert_eq!(facts.media_type, MediaType::Png);
        assert_eq!((facts.width, facts.height), (32, 16));

        let facts = validate_image(&fixtures::jpeg(20, 20), &config).unwrap();
        assert_eq!(facts.media_type, MediaType::Jpeg);
    }

    #[test]
    fn empty_payload_is_rejected_first() {
        let err = validate_image(&[], &StoreConfig::in_memory()).unwrap_err();
        assert_eq!(err, ValidationError::Empty);
    }

    #[test]
    fn size_is_checked_before_type() {
        let config = StoreConfig {
            max_bytes: 5 * 1024 * 1024,
            ..StoreConfig::in_memory()
        };
        // 6 MB of garbage: oversize wins over "not an image"
        let err = validate_image(&vec![0u8; 6 * 1024 * 1024], &config).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Oversize {
                size: 6 * 1024 * 1024,
                max: 5 * 1024 * 1024,
            }
        );
    }

    #[rstest]
    #[case(b"GIF89a\x01\x00\x01\x00".to_vec(), "gif")]
    #[case(b"plain text, not an image".to_vec(), "unknown")]
    fn non_images_are_disallowed(#[case] bytes: Vec<u8>, #[case] found: &str) {
        let err = validate_image(&bytes, &StoreConfig::in_memory()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DisallowedType {
                found: found.to_string()
            }
        );
    }

    #[test]
    fn type_outside_allow_list_is_disallowed() {
        let config = StoreConfig {
            allowed: vec![MediaType::Png],
            ..StoreConfig::in_memory()
        };
        let err = validate_image(&fixtures::jpeg(8, 8), &config).unwrap_err();
        assert!(matches!(err, ValidationError::DisallowedType { found } if found == "jpeg"));
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let config = StoreConfig {
            max_dimension: 64,
            ..StoreConfig::in_memory()
        };
        let err = validate_image(&fixtures::png(65, 10), &config).unwrap_err();
        assert_eq!(
            err,
            ValidationError::BadDimensions {
                width: 65,
                height: 10,
                max: 64
            }
        );
    }

    #[test]
    fn forged_header_is_corrupt() {
        let err = validate_image(&fixtures::forged_png(), &StoreConfig::in_memory()).unwrap_err();
        assert!(matches!(err, ValidationError::Corrupt { media: MediaType::Png, .. }));
    }

    #[test]
    fn truncated_body_fails_full_decode() {
        let mut bytes = fixtures::png(64, 64);
        let keep = bytes.len() / 2;
        bytes.truncate(keep);
        let err = validate_image(&bytes, &StoreConfig::in_memory()).unwrap_err();
        assert!(matches!(err, ValidationError::Corrupt { .. }));
    }

    #[rstest]
    #[case("hello, world!", 500, "hello, world!")]
    #[case("<script>alert('x')</script>", 500, "scriptalert(x)script")]
    #[case("a;b:c (d) - e?", 500, "a;b:c (d) - e?")]
    #[case("abcdef", 3, "abc")]
    #[case("日本語 ok", 500, "日本語 ok")]
    fn sanitize_keeps_safe_characters(
        #[case] input: &str,
        #[case] max: usize,
        #[case] expected: &str,
    ) {
        assert_eq!(sanitize_text_input(input, max), expected);
    }
}
