// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode, fit-inside downscaling, and lossless re-encoding
// of page images. Operates on in-memory images using the `image` crate.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, instrument};

/// Image processing pipeline operating on a single in-memory image.
///
/// Each transformation consumes `self` and returns a new `ImageProcessor`,
/// enabling method chaining:
///
/// ```ignore
/// let png = ImageProcessor::from_bytes(&bytes)?
///     .fit_within(2400, 3358)
///     .to_png_bytes()?;
/// ```
///
/// Errors are returned as plain strings; the caller attributes them to a page
/// or an asset.
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Create a processor from raw encoded bytes (PNG, JPEG, ...).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let img = image::load_from_memory(data)
            .map_err(|err| format!("failed to decode image: {err}"))?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Convert to 8-bit RGBA.
    pub fn to_rgba8(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    // -- Transformations ------------------------------------------------------

    /// Shrink the image to fit inside `max_width` x `max_height`, preserving
    /// aspect ratio (Lanczos3).
    ///
    /// Images that already fit are returned untouched; this never upscales.
    #[instrument(skip(self), fields(max_width, max_height))]
    pub fn fit_within(self, max_width: u32, max_height: u32) -> Self {
        let (width, height) = (self.image.width(), self.image.height());
        if width <= max_width && height <= max_height {
            return self;
        }

        let resized = self
            .image
            .resize(max_width, max_height, FilterType::Lanczos3);
        debug!(
            from_w = width,
            from_h = height,
            new_w = resized.width(),
            new_h = resized.height(),
            "Downscaled to fit"
        );
        Self { image: resized }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes, keeping its colour type.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, String> {
        encode_png(&self.image)
    }
}

/// Encode a `DynamicImage` as PNG, returning the raw bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| format!("PNG encoding failed: {err}"))?;
    Ok(buffer)
}
