// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page sequencer: orders a job's pages and drives the compositor over them,
// strictly one page at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use paginator_core::error::{PaginatorError, Result};
use paginator_core::types::{CompositedPage, PageDescriptor, Progress};
use tracing::{debug, info, instrument, warn};

use crate::image::PageCompositor;

// -- Progress -----------------------------------------------------------------

/// Receives one notification per page, in page order, after that page has
/// been composited.
pub trait ProgressObserver {
    fn on_page(&mut self, progress: Progress);
}

impl<F> ProgressObserver for F
where
    F: FnMut(Progress),
{
    fn on_page(&mut self, progress: Progress) {
        self(progress)
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_page(&mut self, _progress: Progress) {}
}

// -- Cancellation -------------------------------------------------------------

/// Cooperative cancellation flag shared between a job and whoever may stop it.
///
/// The sequencer checks it before starting each page; a page already being
/// composited always finishes.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// -- Ordering -----------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct SequencerOptions {
    /// Accept several pages with the same ordinal, keeping their input order.
    /// Off by default: a repeated ordinal fails the job with
    /// [`PaginatorError::DuplicatePage`].
    pub allow_duplicate_ordinals: bool,
}

/// Sort pages by ordinal (stable) and enforce the duplicate policy.
pub fn order_pages(
    mut pages: Vec<PageDescriptor>,
    options: SequencerOptions,
) -> Result<Vec<PageDescriptor>> {
    if pages.is_empty() {
        return Err(PaginatorError::NoPages);
    }

    pages.sort_by_key(|page| page.ordinal);

    if let Some(pair) = pages.windows(2).find(|w| w[0].ordinal == w[1].ordinal) {
        if !options.allow_duplicate_ordinals {
            return Err(PaginatorError::DuplicatePage {
                ordinal: pair[0].ordinal,
                first: pair[0].origin.clone(),
                second: pair[1].origin.clone(),
            });
        }
        warn!(
            ordinal = pair[0].ordinal,
            "Duplicate page ordinals kept in input order"
        );
    }

    Ok(pages)
}

// -- Sequencer ----------------------------------------------------------------

/// Drives a [`PageCompositor`] across a whole page set.
pub struct PageSequencer<'a> {
    compositor: &'a PageCompositor,
    options: SequencerOptions,
    cancel: CancellationToken,
}

impl<'a> PageSequencer<'a> {
    pub fn new(compositor: &'a PageCompositor) -> Self {
        Self {
            compositor,
            options: SequencerOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: SequencerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Composite every page in ascending ordinal order.
    ///
    /// The first failing page aborts the run; nothing after it is touched and
    /// no partial page set is returned. Each page's source bytes are dropped
    /// as soon as that page is done, on success and failure alike.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub fn run(
        &self,
        pages: Vec<PageDescriptor>,
        title: &str,
        observer: &mut dyn ProgressObserver,
    ) -> Result<Vec<CompositedPage>> {
        let ordered = order_pages(pages, self.options)?;
        let total = ordered.len();
        info!(total, title, "Sequencing pages");

        let mut composited = Vec::with_capacity(total);
        for (index, page) in ordered.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(completed = index, total, "Job cancelled between pages");
                return Err(PaginatorError::Cancelled);
            }

            let PageDescriptor {
                ordinal,
                source,
                origin,
            } = page;
            debug!(ordinal, origin = %origin, "Compositing page");

            let result = self.compositor.compose(&source, ordinal, title);
            drop(source);
            composited.push(result?);

            observer.on_page(Progress {
                current: index + 1,
                total,
                page: ordinal,
            });
        }

        info!(total, "All pages composited");
        Ok(composited)
    }
}
