//! Image encoding for transport.
//!
//! Every image is re-serialized as PNG and wrapped in standard base64 before
//! it is sent anywhere, whatever format it was uploaded in.

use std::borrow::Cow;
use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};

use crate::error::AnalysisError;

/// MIME type of the payload produced by [`encode`].
pub const PNG_MIME: &str = "image/png";

/// Base64 text of a PNG-serialized image.
///
/// Produced by [`encode`] and dropped once the request that carries it
/// completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Serialize `image` as PNG in memory and base64-encode the bytes.
///
/// Float pixel buffers are narrowed to 8 bits per channel first since PNG
/// cannot store them.
pub fn encode(image: &DynamicImage) -> Result<EncodedImage, AnalysisError> {
    let image: Cow<'_, DynamicImage> = match image {
        DynamicImage::ImageRgb32F(_) => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        DynamicImage::ImageRgba32F(_) => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        _ => Cow::Borrowed(image),
    };

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    log::debug!(
        "Encoded {}x{} image as {} PNG bytes",
        image.width(),
        image.height(),
        png.len()
    );

    Ok(EncodedImage(STANDARD.encode(&png)))
}

/// Decode an uploaded file into an image.
///
/// Only JPEG and PNG uploads are accepted; the format is sniffed from the
/// content, not taken from the file name.
pub fn decode_upload(bytes: &[u8]) -> Result<DynamicImage, AnalysisError> {
    let format = image::guess_format(bytes)
        .map_err(|_| AnalysisError::UnsupportedUpload("not a recognised image file".into()))?;

    match format {
        ImageFormat::Jpeg | ImageFormat::Png => image::load_from_memory_with_format(bytes, format)
            .map_err(|e| AnalysisError::UnsupportedUpload(format!("could not decode image: {e}"))),
        other => Err(AnalysisError::UnsupportedUpload(format!(
            "{other:?} images are not supported, upload a JPEG or PNG"
        ))),
    }
}
