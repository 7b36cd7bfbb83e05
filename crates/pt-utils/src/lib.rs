//! Shared helpers and error types for Pantry.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Result type for shared helpers.
pub type UtilsResult<T> = Result<T, UtilsError>;

/// Shared error variants for cross-crate helpers.
#[derive(Debug, Error)]
pub enum UtilsError {
    /// A parsing error occurred.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Decoded image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// File extension derived from the data URL mime type.
    pub extension: String,
}

/// Decode base64 image data, with or without a `data:<mime>;base64,` prefix.
pub fn decode_image_data(input: &str) -> UtilsResult<ImageData> {
    let input = input.trim();
    let payload = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| UtilsError::Parse("data url is missing a payload".into()))?;
            if !header.ends_with(";base64") {
                return Err(UtilsError::Parse("data url is not base64 encoded".into()));
            }
            payload
        }
        None => input,
    };

    let bytes = STANDARD
        .decode(payload)
        .map_err(|err| UtilsError::Parse(err.to_string()))?;
    if bytes.is_empty() {
        return Err(UtilsError::Parse("image data is empty".into()));
    }
    Ok(ImageData {
        bytes,
        extension: image_extension(input).to_string(),
    })
}

/// Encode raw image bytes as a base64 data URL, picking the mime type from
/// the file extension of `file_name`.
pub fn encode_image_data(bytes: &[u8], file_name: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    };
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// File extension implied by a data URL's mime type, `png` when absent or unknown.
pub fn image_extension(input: &str) -> &'static str {
    let mime = input
        .trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split([';', ',']).next())
        .unwrap_or_default();
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    format!("{:x}", Sha256::digest(input.as_ref()))
}

/// File-safe key: a readable slug plus a digest prefix so distinct values never collide.
pub fn storage_key(value: &str) -> String {
    let slug = slugify(value);
    let slug = if slug.is_empty() { "item" } else { slug.as_str() };
    format!("{slug}-{}", &sha256_hex(value)[..8])
}

/// Collapse anything that is not ASCII alphanumeric into single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}
