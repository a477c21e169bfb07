// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One-shot job runner: pages in, PDF out.

use std::path::Path;

use paginator_core::config::PageLayout;
use paginator_core::error::{PaginatorError, Result};
use paginator_core::types::{DocumentOutput, PageDescriptor};
use tracing::{info, instrument};

use crate::assets::AssetBundle;
use crate::image::PageCompositor;
use crate::page_name::describe_all;
use crate::pdf::PdfWriter;
use crate::sequencer::{CancellationToken, PageSequencer, ProgressObserver, SequencerOptions};

/// Everything a job needs besides the shared assets.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub title: String,
    pub pages: Vec<PageDescriptor>,
    pub options: SequencerOptions,
}

impl JobInput {
    pub fn new(title: impl Into<String>, pages: Vec<PageDescriptor>) -> Self {
        Self {
            title: title.into(),
            pages,
            options: SequencerOptions::default(),
        }
    }

    /// Build a job from `(file name, bytes)` pairs.
    ///
    /// Every name is validated here, before anything is decoded; one bad name
    /// fails the whole job with [`PaginatorError::InvalidPageName`].
    pub fn from_files<I, S>(title: impl Into<String>, files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        Ok(Self::new(title, describe_all(files)?))
    }

    pub fn with_options(mut self, options: SequencerOptions) -> Self {
        self.options = options;
        self
    }
}

/// Composite every page and write the PDF to `destination`.
///
/// Fails fast: the first error (bad asset, bad page, cancellation, write
/// failure) ends the job and no document is written.
#[instrument(
    skip_all,
    fields(
        title = %input.title,
        pages = input.pages.len(),
        destination = %destination.as_ref().display()
    )
)]
pub fn run_job(
    input: JobInput,
    assets: &AssetBundle,
    layout: &PageLayout,
    destination: impl AsRef<Path>,
    observer: &mut dyn ProgressObserver,
    cancel: &CancellationToken,
) -> Result<DocumentOutput> {
    let JobInput {
        title,
        pages,
        options,
    } = input;

    let title = title.trim();
    if title.is_empty() {
        return Err(PaginatorError::InvalidRequest(
            "Document title is required".into(),
        ));
    }

    info!("Job started");
    let compositor = PageCompositor::new(assets, layout.clone())?;
    let composited = PageSequencer::new(&compositor)
        .with_options(options)
        .with_cancellation(cancel.clone())
        .run(pages, title, observer)?;

    if cancel.is_cancelled() {
        return Err(PaginatorError::Cancelled);
    }

    let output = PdfWriter::new(title).write_document(&composited, destination)?;
    info!(pages = output.page_count, "Job finished");
    Ok(output)
}
