// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page compositor: turns one raw page image into a finished page.
//
// Cover page (ordinal 1): re-encoded losslessly, nothing else.
//
// Every other page, bottom to top:
//   1. opaque white canvas, template-sized
//   2. source page at (0, content_offset), shrunk to fit below the offset
//   3. template at (0, 0); its transparent middle lets the page show through
//      and its opaque bands cover the page's top and bottom
//   4. title text layer
//   5. page-number text layer ("Pág. NN")
// then flattened to an opaque RGB PNG.
//
// No timestamps or randomness enter the output: identical inputs give
// byte-identical PNGs.

use image::imageops;
use image::{DynamicImage, Rgba, RgbaImage};
use paginator_core::config::PageLayout;
use paginator_core::error::{PaginatorError, Result};
use paginator_core::types::{AssetRole, COVER_ORDINAL, CompositedPage};
use tracing::{debug, info, instrument};

use super::processor::{ImageProcessor, encode_png};
use super::text::TextOverlay;
use crate::assets::AssetBundle;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Footer label for a page: `"Pág. "` followed by the ordinal padded to two
/// digits.
pub fn page_label(ordinal: u32) -> String {
    format!("Pág. {ordinal:02}")
}

/// Composites pages for one job.
///
/// The template and fonts are decoded once, at construction, and reused for
/// every page.
pub struct PageCompositor {
    template: RgbaImage,
    title_font: TextOverlay,
    page_number_font: TextOverlay,
    layout: PageLayout,
}

impl PageCompositor {
    /// Decode the job's assets.
    ///
    /// An undecodable template or font fails with
    /// [`PaginatorError::InvalidAsset`] before any page is touched.
    #[instrument(skip_all)]
    pub fn new(assets: &AssetBundle, layout: PageLayout) -> Result<Self> {
        let template = ImageProcessor::from_bytes(&assets.template)
            .map_err(|detail| PaginatorError::InvalidAsset {
                role: AssetRole::Template,
                detail,
            })?
            .to_rgba8();

        if template.height() <= layout.content_offset {
            return Err(PaginatorError::InvalidAsset {
                role: AssetRole::Template,
                detail: format!(
                    "template is {} px tall, no room below the {} px content offset",
                    template.height(),
                    layout.content_offset
                ),
            });
        }

        let title_font = TextOverlay::from_font_bytes(assets.title_font.clone()).map_err(
            |detail| PaginatorError::InvalidAsset {
                role: AssetRole::TitleFont,
                detail,
            },
        )?;
        let page_number_font = TextOverlay::from_font_bytes(assets.page_number_font.clone())
            .map_err(|detail| PaginatorError::InvalidAsset {
                role: AssetRole::PageNumberFont,
                detail,
            })?;

        info!(
            width = template.width(),
            height = template.height(),
            content_offset = layout.content_offset,
            "Compositor ready"
        );

        Ok(Self {
            template,
            title_font,
            page_number_font,
            layout,
        })
    }

    /// Canvas size of every non-cover page.
    pub fn canvas_size(&self) -> (u32, u32) {
        self.template.dimensions()
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Composite one page. Errors are attributed to `ordinal`.
    #[instrument(skip(self, source, title), fields(source_len = source.len()))]
    pub fn compose(&self, source: &[u8], ordinal: u32, title: &str) -> Result<CompositedPage> {
        let processor =
            ImageProcessor::from_bytes(source).map_err(|e| PaginatorError::page(ordinal, e))?;

        if ordinal == COVER_ORDINAL {
            return cover_page(processor, ordinal);
        }

        let (final_width, final_height) = self.template.dimensions();
        let offset = self.layout.content_offset;

        let content = processor
            .fit_within(final_width, final_height - offset)
            .to_rgba8();
        debug!(
            content_w = content.width(),
            content_h = content.height(),
            final_width,
            final_height,
            "Content placed"
        );

        let mut canvas = RgbaImage::from_pixel(final_width, final_height, WHITE);
        imageops::overlay(&mut canvas, &content, 0, i64::from(offset));
        imageops::overlay(&mut canvas, &self.template, 0, 0);

        let title_layer =
            self.title_font
                .render(title, &self.layout.title, final_width, final_height);
        imageops::overlay(&mut canvas, &title_layer, 0, 0);

        let number_layer = self.page_number_font.render(
            &page_label(ordinal),
            &self.layout.page_number,
            final_width,
            final_height,
        );
        imageops::overlay(&mut canvas, &number_layer, 0, 0);

        // The white base makes every pixel opaque; drop the alpha channel.
        let flattened = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8());
        let png = encode_png(&flattened).map_err(|e| PaginatorError::page(ordinal, e))?;

        Ok(CompositedPage {
            ordinal,
            width: final_width,
            height: final_height,
            png,
        })
    }
}

/// The cover keeps its own size and pixels; only the container format changes.
fn cover_page(processor: ImageProcessor, ordinal: u32) -> Result<CompositedPage> {
    let png = processor
        .to_png_bytes()
        .map_err(|e| PaginatorError::page(ordinal, e))?;
    debug!(
        width = processor.width(),
        height = processor.height(),
        "Cover page passed through"
    );
    Ok(CompositedPage {
        ordinal,
        width: processor.width(),
        height: processor.height(),
        png,
    })
}

/// One-shot compositing from raw bytes.
///
/// Builds a compositor for this single call; any failure, including a bad
/// template or font, is reported as a [`PaginatorError::PageProcessing`] for
/// `ordinal`. The cover page never needs the template or fonts.
#[instrument(skip_all, fields(ordinal = ordinal))]
pub fn process_page(
    source: &[u8],
    template: &[u8],
    title: &str,
    ordinal: u32,
    title_font: &[u8],
    page_number_font: &[u8],
    layout: &PageLayout,
) -> Result<Vec<u8>> {
    if ordinal == COVER_ORDINAL {
        let processor =
            ImageProcessor::from_bytes(source).map_err(|e| PaginatorError::page(ordinal, e))?;
        return Ok(cover_page(processor, ordinal)?.png);
    }

    let assets = AssetBundle::from_bytes(
        template.to_vec(),
        title_font.to_vec(),
        page_number_font.to_vec(),
    );
    let compositor = PageCompositor::new(&assets, layout.clone())
        .map_err(|e| PaginatorError::page(ordinal, e))?;
    Ok(compositor.compose(source, ordinal, title)?.png)
}
