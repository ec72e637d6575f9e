//! Image loading from `data:` URIs.
//!
//! Supports base64 and percent-encoded payloads. Decoded pixels are
//! premultiplied so they can be drawn by any [`trellis_core::Surface`].

use async_trait::async_trait;
use trellis_core::resource::display_src;
use trellis_core::{RasterBuffer, ResourceLoader, SceneError, SceneResult};

use crate::error::{RenderError, RenderResult};

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// WebP (alpha support).
    WebP,
    /// Unknown/other format.
    Unknown,
}

impl ImageFormat {
    /// Detect format from MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_lowercase().as_str() {
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/webp" => Self::WebP,
            _ => Self::Unknown,
        }
    }

    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() < 4 {
            return Self::Unknown;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Self::Png;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Self::WebP;
        }

        Self::Unknown
    }
}

/// Decode image bytes into premultiplied RGBA pixels.
///
/// # Errors
///
/// Returns an error if the image cannot be decoded.
pub fn decode_image(data: &[u8]) -> RenderResult<RasterBuffer> {
    let format = ImageFormat::from_magic_bytes(data);
    let img = image::load_from_memory(data)
        .map_err(|e| RenderError::Resource(format!("Failed to decode image: {e}")))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    tracing::debug!("Decoded {format:?} image {width}x{height}");

    let mut pixels = rgba.into_raw();
    for px in pixels.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        for channel in &mut px[..3] {
            *channel = premultiply(*channel, a);
        }
    }
    RasterBuffer::from_rgba(width, height, pixels)
        .ok_or_else(|| RenderError::Resource("Decoded pixel buffer has the wrong size".to_string()))
}

#[allow(clippy::cast_possible_truncation)]
fn premultiply(channel: u8, alpha: u16) -> u8 {
    ((u16::from(channel) * alpha + 127) / 255) as u8
}

/// Split a data URI into its format and decoded payload.
///
/// Supports formats like: `data:image/png;base64,iVBORw0KGgo...`
///
/// # Errors
///
/// Returns an error if the URI is malformed or does not carry an image.
pub fn parse_data_uri(uri: &str) -> RenderResult<(ImageFormat, Vec<u8>)> {
    let uri_data = uri
        .strip_prefix("data:")
        .ok_or_else(|| RenderError::Resource("Not a data URI".to_string()))?;

    let (metadata, encoded_data) = uri_data
        .split_once(',')
        .ok_or_else(|| RenderError::Resource("Invalid data URI: missing comma".to_string()))?;

    let mut params = metadata.split(';');
    let mime = params.next().unwrap_or_default();
    if !mime.is_empty() && !mime.to_ascii_lowercase().starts_with("image/") {
        return Err(RenderError::Resource(format!("Not an image: {mime}")));
    }
    let is_base64 = params.any(|p| p.eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(encoded_data)
            .map_err(|e| RenderError::Resource(format!("Failed to decode base64: {e}")))?
    } else {
        percent_decode(encoded_data)?
    };

    Ok((ImageFormat::from_mime(mime), bytes))
}

/// Load an image from a data URI.
///
/// # Errors
///
/// Returns an error if the data URI is malformed or the image cannot be decoded.
pub fn load_image_from_data_uri(uri: &str) -> RenderResult<RasterBuffer> {
    let (declared, bytes) = parse_data_uri(uri)?;
    let detected = ImageFormat::from_magic_bytes(&bytes);
    if declared != ImageFormat::Unknown && detected != ImageFormat::Unknown && declared != detected
    {
        tracing::warn!("Data URI declares {declared:?} but carries {detected:?}");
    }
    decode_image(&bytes)
}

/// Percent-decoding of a URI payload.
fn percent_decode(input: &str) -> RenderResult<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| RenderError::Resource("Invalid URL encoding".to_string()))?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    Ok(result)
}

/// A [`ResourceLoader`] resolving `data:` URIs without any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUriLoader;

impl DataUriLoader {
    /// Create a new loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceLoader for DataUriLoader {
    async fn load(&self, src: &str) -> SceneResult<RasterBuffer> {
        load_image_from_data_uri(src).map_err(|e| SceneError::ResourceLoad {
            src: display_src(src),
            reason: e.to_string(),
        })
    }
}
