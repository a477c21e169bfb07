// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: decoding, fit-inside resizing, text overlays, and page
// compositing.

pub mod compositor;
pub mod processor;
pub mod text;

pub use compositor::{PageCompositor, page_label, process_page};
pub use processor::ImageProcessor;
pub use text::TextOverlay;
