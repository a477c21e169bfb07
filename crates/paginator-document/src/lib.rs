// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// paginator-document: the page pipeline.
//
// Numbered page images are validated by name, composited onto the
// header/footer template with a title and page number, and assembled in page
// order into one PDF. Local directory discovery and a one-shot job runner sit
// on top.

pub mod assets;
pub mod discover;
pub mod image;
pub mod job;
pub mod page_name;
pub mod pdf;
pub mod sequencer;

// Re-export the primary items so callers can use `paginator_document::run_job` etc.
pub use assets::AssetBundle;
pub use discover::scan_pages;
pub use image::{ImageProcessor, PageCompositor, TextOverlay, page_label, process_page};
pub use job::{JobInput, run_job};
pub use page_name::{describe, describe_all, is_page_name, parse_ordinal};
pub use pdf::{PX_TO_PT, PdfReader, PdfWriter, generate_document, page_size_pt};
pub use sequencer::{
    CancellationToken, NoProgress, PageSequencer, ProgressObserver, SequencerOptions, order_pages,
};
