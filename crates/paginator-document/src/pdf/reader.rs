// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: inspect generated documents with `lopdf`.

use std::path::Path;

use lopdf::{Document, Object, ObjectId};
use paginator_core::error::{PaginatorError, Result};
use tracing::{debug, info, instrument};

/// Read-only view of an existing PDF.
pub struct PdfReader {
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            PaginatorError::DocumentRead(format!("failed to open {}: {err}", path_ref.display()))
        })?;
        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Parse a PDF already held in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| PaginatorError::DocumentRead(format!("failed to parse PDF: {err}")))?;
        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// MediaBox width and height of every page, in points, in page order.
    pub fn page_sizes(&self) -> Result<Vec<(f32, f32)>> {
        self.document
            .get_pages()
            .into_values()
            .map(|page_id| self.media_box(page_id))
            .collect()
    }

    /// Size of one page, following /Parent for an inherited MediaBox.
    fn media_box(&self, page_id: ObjectId) -> Result<(f32, f32)> {
        let mut node = page_id;

        loop {
            let dict = self
                .document
                .get_dictionary(node)
                .map_err(|err| PaginatorError::DocumentRead(format!("page node {node:?}: {err}")))?;

            if let Ok(entry) = dict.get(b"MediaBox") {
                let array = match entry {
                    Object::Reference(id) => self
                        .document
                        .get_object(*id)
                        .and_then(Object::as_array)
                        .map_err(|err| PaginatorError::DocumentRead(format!("MediaBox: {err}")))?,
                    other => other
                        .as_array()
                        .map_err(|err| PaginatorError::DocumentRead(format!("MediaBox: {err}")))?,
                };
                let coords = array
                    .iter()
                    .map(Object::as_float)
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(|err| PaginatorError::DocumentRead(format!("MediaBox: {err}")))?;
                let [x0, y0, x1, y1] = coords[..] else {
                    return Err(PaginatorError::DocumentRead(format!(
                        "MediaBox has {} entries, expected 4",
                        coords.len()
                    )));
                };
                return Ok(((x1 - x0).abs(), (y1 - y0).abs()));
            }

            node = dict
                .get(b"Parent")
                .and_then(Object::as_reference)
                .map_err(|_| {
                    PaginatorError::DocumentRead(format!("page {page_id:?} has no MediaBox"))
                })?;
        }
    }
}
