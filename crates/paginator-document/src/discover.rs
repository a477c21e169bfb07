// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local page discovery: find numbered page images in a directory and its
// immediate subdirectories.

use std::fs;
use std::path::{Path, PathBuf};

use paginator_core::error::Result;
use paginator_core::types::PageDescriptor;
use tracing::{debug, info, instrument};

use crate::page_name::parse_ordinal;

/// Scan `root` and each of its immediate subdirectories for page images.
///
/// Unlike remote submissions, discovery filters: files whose names do not
/// follow the page convention are skipped silently. Entries are visited in
/// file-name order and the result is sorted stably by ordinal, so the same
/// tree always yields the same sequence.
#[instrument(skip_all, fields(root = %root.as_ref().display()))]
pub fn scan_pages(root: impl AsRef<Path>) -> Result<Vec<PageDescriptor>> {
    let root = root.as_ref();
    let mut pages = Vec::new();

    for entry in sorted_entries(root)? {
        if entry.is_dir() {
            let folder = file_name(&entry);
            for nested in sorted_entries(&entry)? {
                if nested.is_file() {
                    collect(&nested, Some(&folder), &mut pages)?;
                }
            }
        } else if entry.is_file() {
            collect(&entry, None, &mut pages)?;
        }
    }

    pages.sort_by_key(|page| page.ordinal);
    info!(found = pages.len(), "Page scan complete");
    Ok(pages)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn collect(path: &Path, folder: Option<&str>, pages: &mut Vec<PageDescriptor>) -> Result<()> {
    let name = file_name(path);
    let Ok(ordinal) = parse_ordinal(&name) else {
        debug!(file = %name, "Skipping non-page file");
        return Ok(());
    };

    let origin = match folder {
        Some(folder) => format!("{folder}/{name}"),
        None => name,
    };
    debug!(ordinal, origin = %origin, "Found page");

    pages.push(PageDescriptor {
        ordinal,
        source: fs::read(path)?,
        origin,
    });
    Ok(())
}
