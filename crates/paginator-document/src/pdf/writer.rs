// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF assembler: one composited page image per PDF page, using `printpdf` 0.8.
//
// Every page is sized from its own raster: pixels x 0.75 = points (96 DPI
// source, 72 pt per inch). The image is placed at the origin at 96 DPI, so
// it covers the page exactly with no scaling.
//
// printpdf 0.8 is data-oriented: each `PdfPage` carries a `Vec<Op>` and the
// whole document is serialised once by `PdfDocument::save()`. It writes page
// boxes as whole points, so the boxes are rewritten afterwards with `lopdf`
// to carry the fractional sizes of pages whose pixels are not a multiple of 4.
//
// Pages with an alpha channel (an untouched cover) are flattened onto white
// before embedding; transparent areas show the paper, not black.

use std::io::Write;
use std::path::Path;

use ::image::imageops;
use ::image::{DynamicImage, Rgba, RgbImage, RgbaImage};
use lopdf::{Document, Object};
use paginator_core::error::{PaginatorError, Result};
use paginator_core::types::{CompositedPage, DocumentOutput};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

/// Points per source pixel.
pub const PX_TO_PT: f32 = 0.75;

/// Resolution at which placing an image yields exactly [`PX_TO_PT`] points
/// per pixel.
const SOURCE_DPI: f32 = 72.0 / PX_TO_PT;

/// Physical page size in points for a raster of the given pixel size.
pub fn page_size_pt(width_px: u32, height_px: u32) -> (f32, f32) {
    (width_px as f32 * PX_TO_PT, height_px as f32 * PX_TO_PT)
}

fn pt_to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

/// Page boundary boxes that printpdf may emit alongside /MediaBox.
const PAGE_BOXES: [&[u8]; 5] = [b"MediaBox", b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox"];

/// Drop any alpha channel by compositing over opaque white.
fn flatten_on_white(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut paper = RgbaImage::from_pixel(rgba.width(), rgba.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut paper, &rgba, 0, 0);
    DynamicImage::ImageRgba8(paper).to_rgb8()
}

/// Rewrite every page's boxes to `[0 0 w h]` with real-valued sizes.
fn set_exact_page_boxes(pdf: &[u8], sizes: &[(f32, f32)]) -> Result<Vec<u8>> {
    let write_err =
        |err: lopdf::Error| PaginatorError::DocumentWrite(format!("page box rewrite: {err}"));

    let mut document = Document::load_mem(pdf).map_err(write_err)?;
    let page_ids: Vec<_> = document.get_pages().into_values().collect();
    if page_ids.len() != sizes.len() {
        return Err(PaginatorError::DocumentWrite(format!(
            "expected {} pages in the assembled PDF, found {}",
            sizes.len(),
            page_ids.len()
        )));
    }

    for (page_id, &(width, height)) in page_ids.into_iter().zip(sizes) {
        let rect = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width),
            Object::Real(height),
        ];
        let page = document.get_dictionary_mut(page_id).map_err(write_err)?;
        for key in PAGE_BOXES {
            if key == b"MediaBox" || page.has(key) {
                page.set(key, rect.clone());
            }
        }
    }

    let mut output = Vec::with_capacity(pdf.len());
    document.save_to(&mut output).map_err(|err| {
        PaginatorError::DocumentWrite(format!("page box rewrite: {err}"))
    })?;
    Ok(output)
}

/// Assembles composited pages into a single PDF.
pub struct PdfWriter {
    /// Title metadata embedded in the PDF /Info dictionary.
    title: String,
}

impl PdfWriter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Build the PDF in memory, one page per input page, in input order.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub fn assemble(&self, pages: &[CompositedPage]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(PaginatorError::NoPages);
        }

        let mut doc = PdfDocument::new(&self.title);
        let mut pdf_pages = Vec::with_capacity(pages.len());
        let mut sizes = Vec::with_capacity(pages.len());

        for page in pages {
            let decoded = ::image::load_from_memory(&page.png).map_err(|err| {
                PaginatorError::DocumentWrite(format!(
                    "page {} could not be decoded for embedding: {err}",
                    page.ordinal
                ))
            })?;
            let rgb = flatten_on_white(decoded);
            let (width_px, height_px) = rgb.dimensions();

            let raw = RawImage {
                pixels: RawImageData::U8(rgb.into_raw()),
                width: width_px as usize,
                height: height_px as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let (w_pt, h_pt) = page_size_pt(width_px, height_px);
            sizes.push((w_pt, h_pt));
            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: None,
                    scale_y: None,
                    dpi: Some(SOURCE_DPI),
                    rotate: None,
                },
            }];

            debug!(ordinal = page.ordinal, w_pt, h_pt, "Page placed");
            pdf_pages.push(PdfPage::new(pt_to_mm(w_pt), pt_to_mm(h_pt), ops));
        }

        doc.with_pages(pdf_pages);

        // Keep page pixels lossless; printpdf would otherwise re-encode them.
        let options = PdfSaveOptions {
            image_optimization: None,
            ..Default::default()
        };
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let saved = doc.save(&options, &mut warnings);
        if !warnings.is_empty() {
            debug!(count = warnings.len(), "printpdf reported warnings");
        }
        let output = set_exact_page_boxes(&saved, &sizes)?;

        info!(pages = pages.len(), bytes = output.len(), "PDF assembled");
        Ok(output)
    }

    /// Assemble the PDF and write it to `destination`.
    ///
    /// The file only appears at `destination` once it is complete: bytes go
    /// to a temporary file in the same directory which is then renamed into
    /// place. On any failure nothing is left at `destination`.
    #[instrument(skip(self, pages), fields(destination = %destination.as_ref().display()))]
    pub fn write_document(
        &self,
        pages: &[CompositedPage],
        destination: impl AsRef<Path>,
    ) -> Result<DocumentOutput> {
        let destination = destination.as_ref();
        let bytes = self.assemble(pages)?;
        persist_atomically(&bytes, destination)?;

        let sha256 = hex::encode(Sha256::digest(&bytes));
        info!(sha256 = %sha256, "PDF written to {}", destination.display());

        Ok(DocumentOutput {
            path: destination.to_path_buf(),
            bytes,
            page_count: pages.len(),
            sha256,
        })
    }
}

/// Assemble `pages` into a PDF at `destination`, titled after the document.
pub fn generate_document(
    pages: &[CompositedPage],
    title: &str,
    destination: impl AsRef<Path>,
) -> Result<DocumentOutput> {
    PdfWriter::new(title).write_document(pages, destination)
}

fn persist_atomically(bytes: &[u8], destination: &Path) -> Result<()> {
    let write_err = |err: &dyn std::fmt::Display| {
        PaginatorError::DocumentWrite(format!("{}: {err}", destination.display()))
    };

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| write_err(&e))?;

    let mut staging = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_err(&e))?;
    staging.write_all(bytes).map_err(|e| write_err(&e))?;
    staging.as_file().sync_all().map_err(|e| write_err(&e))?;
    staging
        .persist(destination)
        .map_err(|e| write_err(&e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::processor::encode_png;
    use crate::pdf::PdfReader;
    use image::Rgb;

    fn page(ordinal: u32, width: u32, height: u32) -> CompositedPage {
        let img = RgbImage::from_pixel(width, height, Rgb([ordinal as u8 * 40, 10, 10]));
        CompositedPage {
            ordinal,
            width,
            height,
            png: encode_png(&DynamicImage::ImageRgb8(img)).expect("encode"),
        }
    }

    fn assert_close(actual: (f32, f32), expected: (f32, f32)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-3 && (actual.1 - expected.1).abs() < 1e-3,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn pixel_to_point_conversion() {
        assert_eq!(page_size_pt(800, 1200), (600.0, 900.0));
        assert_eq!(page_size_pt(2400, 3392), (1800.0, 2544.0));
    }

    #[test]
    fn one_pdf_page_per_image_sized_from_pixels() {
        let pages = vec![page(1, 80, 120), page(2, 240, 340), page(3, 240, 340)];
        let bytes = PdfWriter::new("SAMPLE").assemble(&pages).expect("assemble");

        let reader = PdfReader::from_bytes(&bytes).expect("parse");
        assert_eq!(reader.page_count(), 3);
        let sizes = reader.page_sizes().expect("sizes");
        assert_close(sizes[0], (60.0, 90.0));
        assert_close(sizes[1], (180.0, 255.0));
        assert_close(sizes[2], (180.0, 255.0));
    }

    #[test]
    fn page_boxes_keep_fractional_points() {
        for (width, height) in [(1801, 2501), (123, 457), (2400, 3392), (5, 7)] {
            let bytes = PdfWriter::new("T")
                .assemble(&[page(2, width, height)])
                .expect("assemble");
            let sizes = PdfReader::from_bytes(&bytes).expect("parse").page_sizes().expect("sizes");
            assert_close(sizes[0], page_size_pt(width, height));
        }
    }

    #[test]
    fn mixed_page_sizes_keep_their_order() {
        let pages = vec![page(1, 1801, 2501), page(2, 123, 457), page(3, 240, 340)];
        let bytes = PdfWriter::new("T").assemble(&pages).expect("assemble");
        let sizes = PdfReader::from_bytes(&bytes).expect("parse").page_sizes().expect("sizes");
        assert_close(sizes[0], (1350.75, 1875.75));
        assert_close(sizes[1], (92.25, 342.75));
        assert_close(sizes[2], (180.0, 255.0));
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let cover = RgbaImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([200, 0, 0, 255])
            }
        });
        let flat = flatten_on_white(DynamicImage::ImageRgba8(cover));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(3, 1), &Rgb([200, 0, 0]));

        let half = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let grey = flatten_on_white(DynamicImage::ImageRgba8(half)).get_pixel(0, 0).0[0];
        assert!((126..=128).contains(&grey), "half-transparent black gave {grey}");
    }

    #[test]
    fn transparent_cover_is_embedded_on_white() {
        let cover_image = RgbaImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([0, 0, 200, 255])
            }
        });
        let cover = CompositedPage {
            ordinal: 1,
            width: 40,
            height: 40,
            png: encode_png(&DynamicImage::ImageRgba8(cover_image)).expect("encode"),
        };
        let bytes = PdfWriter::new("T").assemble(&[cover]).expect("assemble");

        let document = Document::load_mem(&bytes).expect("parse");
        let image = document
            .objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .find(|stream| {
                stream
                    .dict
                    .get(b"Subtype")
                    .and_then(Object::as_name)
                    .is_ok_and(|name| name == b"Image")
            })
            .expect("embedded image");
        assert!(image.dict.get(b"SMask").is_err(), "no soft mask needed");

        let pixels = if image.dict.has(b"Filter") {
            image.decompressed_content().expect("inflate image")
        } else {
            image.content.clone()
        };
        assert_eq!(pixels.len(), 40 * 40 * 3);
        assert_eq!(&pixels[..6], &[255, 255, 255, 255, 255, 255]);
        let right = 3 * 30;
        assert_eq!(&pixels[right..right + 3], &[0, 0, 200]);
    }

    #[test]
    fn empty_page_set_is_rejected() {
        let err = PdfWriter::new("T").assemble(&[]).expect_err("no pages");
        assert!(matches!(err, PaginatorError::NoPages));
    }

    #[test]
    fn undecodable_page_is_a_write_error() {
        let mut bad = page(2, 10, 10);
        bad.png = b"broken".to_vec();
        let err = PdfWriter::new("T").assemble(&[bad]).expect_err("bad png");
        assert!(matches!(err, PaginatorError::DocumentWrite(_)));
    }

    #[test]
    fn write_document_persists_and_fingerprints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = dir.path().join("out/final_document.pdf");

        let output = generate_document(&[page(1, 40, 40), page(2, 40, 40)], "T", &destination)
            .expect("write");

        assert_eq!(output.path, destination);
        assert_eq!(output.page_count, 2);
        assert_eq!(std::fs::read(&destination).expect("read back"), output.bytes);
        assert_eq!(output.sha256.len(), 64);
        assert_eq!(output.sha256, hex::encode(Sha256::digest(&output.bytes)));

        // Only the finished file remains in the directory.
        let entries = std::fs::read_dir(dir.path().join("out")).expect("list").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn failed_write_leaves_no_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        // The destination's parent is a regular file, so nothing can be created.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").expect("write blocker");
        let destination = blocker.join("doc.pdf");

        let err = generate_document(&[page(1, 10, 10)], "T", &destination).expect_err("blocked");
        assert!(matches!(err, PaginatorError::DocumentWrite(_)));
        assert!(!destination.exists());
    }
}
