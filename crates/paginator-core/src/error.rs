// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Paginator.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::AssetRole;

/// Top-level error type for all Paginator operations.
///
/// Every variant is terminal for the job that raised it; nothing here is
/// retried automatically.
#[derive(Debug, Error)]
pub enum PaginatorError {
    // -- Input validation --
    #[error("invalid page file name {name:?}: expected {{number}}_*.png")]
    InvalidPageName { name: String },

    #[error("page {ordinal} appears twice ({first} and {second})")]
    DuplicatePage {
        ordinal: u32,
        first: String,
        second: String,
    },

    #[error("no numbered page files found (format: {{number}}_*.png)")]
    NoPages,

    // -- Assets --
    #[error("{role} not found: {}", path.display())]
    MissingAsset { role: AssetRole, path: PathBuf },

    #[error("{role} could not be used: {detail}")]
    InvalidAsset { role: AssetRole, detail: String },

    // -- Pipeline --
    #[error("failed to process page {ordinal}: {detail}")]
    PageProcessing { ordinal: u32, detail: String },

    #[error("failed to write PDF document: {0}")]
    DocumentWrite(String),

    #[error("failed to read PDF document: {0}")]
    DocumentRead(String),

    #[error("job was cancelled")]
    Cancelled,

    // -- Remote agent --
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: invalid API key")]
    Unauthorized,

    #[error("agent server error: {0}")]
    Server(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PaginatorError {
    /// Build a [`PaginatorError::PageProcessing`] for `ordinal`.
    pub fn page(ordinal: u32, detail: impl std::fmt::Display) -> Self {
        Self::PageProcessing {
            ordinal,
            detail: detail.to_string(),
        }
    }

    /// The page ordinal this error is attributed to, if any.
    pub fn ordinal(&self) -> Option<u32> {
        match self {
            Self::PageProcessing { ordinal, .. } | Self::DuplicatePage { ordinal, .. } => {
                Some(*ordinal)
            }
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaginatorError>;
