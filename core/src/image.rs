//! Image references and asynchronous image decoding.
//!
//! Images arrive from external collaborators (upload, generation) as opaque,
//! already-resolved references: usually a `data:` URL, sometimes a plain URL
//! or a storage key. The engine never fetches anything. When it mounts an
//! image-backed node it asks an [`ImageDecoder`] for the pixel size so the
//! scene adapter can size the node; a failed decode is a diagnostic, not an
//! error, and the node falls back to the geometry stored on the object.

use std::fmt;
use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// An opaque reference to image content.
///
/// Cloning shares the underlying string, so two clones of one reference are
/// identical by pointer as well as by value (see [`ImageRef::same_source`]).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(Arc<str>);

impl ImageRef {
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is an inline `data:` URL.
    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Returns `true` if both references share the same allocation.
    pub fn same_source(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 48;
        if self.0.len() > PREVIEW {
            let end = self
                .0
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|&i| i <= PREVIEW)
                .last()
                .unwrap_or(0);
            write!(f, "ImageRef({}…, {} bytes)", &self.0[..end], self.0.len())
        } else {
            write!(f, "ImageRef({})", self.0)
        }
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Errors produced while decoding an image reference.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImageError {
    /// The reference is not something this decoder can resolve locally.
    #[error("unsupported image reference: {0}")]
    Unsupported(String),
    /// The `data:` URL payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(String),
    /// The bytes did not decode as a supported image format.
    #[error("image decode error: {0}")]
    Decode(String),
}

/// Pixel information for a resolved image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub source: ImageRef,
    pub width: u32,
    pub height: u32,
}

/// A boxed, `Send` future returned by [`ImageDecoder::decode`].
pub type ImageFuture = Pin<Box<dyn Future<Output = Result<DecodedImage, ImageError>> + Send>>;

/// Resolves image references into decoded image information.
///
/// The returned future may suspend (e.g. a decoder that hands work to a
/// thread pool). Callers must tolerate completions arriving out of order.
pub trait ImageDecoder: Send + Sync + 'static {
    fn decode(&self, source: &ImageRef) -> ImageFuture;
}

/// Decodes inline `data:` URLs with the `image` crate.
///
/// Only the header is read to obtain dimensions; pixels are not kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataUrlDecoder;

impl ImageDecoder for DataUrlDecoder {
    fn decode(&self, source: &ImageRef) -> ImageFuture {
        let source = source.clone();
        Box::pin(async move {
            let bytes = data_url_bytes(source.as_str())?;
            let (width, height) = image::io::Reader::new(Cursor::new(bytes))
                .with_guessed_format()
                .map_err(|e| ImageError::Decode(e.to_string()))?
                .into_dimensions()
                .map_err(|e| ImageError::Decode(e.to_string()))?;
            Ok(DecodedImage {
                source,
                width,
                height,
            })
        })
    }
}

/// Extracts the payload of a base64 `data:` URL.
pub fn data_url_bytes(url: &str) -> Result<Vec<u8>, ImageError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::Unsupported(truncate(url)))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::Unsupported(truncate(url)))?;
    if !header.ends_with(";base64") {
        return Err(ImageError::Unsupported(format!(
            "non-base64 data URL ({header})"
        )));
    }
    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageError::Base64(e.to_string()))
}

fn truncate(s: &str) -> String {
    s.chars().take(64).collect()
}
