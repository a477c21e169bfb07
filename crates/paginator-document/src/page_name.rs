// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page file naming convention: `{number}_{anything}.png`, extension matched
// case-insensitively. The leading digit run is the page ordinal.

use std::sync::LazyLock;

use paginator_core::error::{PaginatorError, Result};
use paginator_core::types::PageDescriptor;
use regex::Regex;

static PAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    // ASCII digits only; `\d` would also accept other Unicode digit scripts.
    Regex::new(r"(?i)^([0-9]+)_.*\.png$").expect("page name pattern is valid")
});

/// Extract the page ordinal from `file_name`.
///
/// Fails with [`PaginatorError::InvalidPageName`] when the name does not follow
/// the convention, including when the digit run does not fit in a `u32`.
pub fn parse_ordinal(file_name: &str) -> Result<u32> {
    let invalid = || PaginatorError::InvalidPageName {
        name: file_name.to_owned(),
    };

    let captures = PAGE_NAME.captures(file_name).ok_or_else(invalid)?;
    captures[1].parse::<u32>().map_err(|_| invalid())
}

/// Whether `file_name` follows the page naming convention.
pub fn is_page_name(file_name: &str) -> bool {
    parse_ordinal(file_name).is_ok()
}

/// Build a descriptor from an uploaded or scanned file.
pub fn describe(file_name: &str, source: Vec<u8>) -> Result<PageDescriptor> {
    Ok(PageDescriptor {
        ordinal: parse_ordinal(file_name)?,
        source,
        origin: file_name.to_owned(),
    })
}

/// Validate every name up front, before any page is decoded.
///
/// The first invalid name fails the whole batch; input order is preserved.
pub fn describe_all<I, S>(files: I) -> Result<Vec<PageDescriptor>>
where
    I: IntoIterator<Item = (S, Vec<u8>)>,
    S: AsRef<str>,
{
    files
        .into_iter()
        .map(|(name, bytes)| describe(name.as_ref(), bytes))
        .collect()
}
