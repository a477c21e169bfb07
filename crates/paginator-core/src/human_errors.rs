// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages.
//
// Every technical error is mapped to a plain sentence plus something the user
// can actually do about it. The CLI prints these; the agent sends the
// suggestion alongside the raw error so the web page can show it.

use crate::error::PaginatorError;
use crate::types::AssetRole;

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What the user should try next.
    pub suggestion: String,
    /// Whether resubmitting the same job unchanged could succeed.
    pub retriable: bool,
}

/// Convert a `PaginatorError` into a `HumanError`.
pub fn humanize_error(err: &PaginatorError) -> HumanError {
    match err {
        PaginatorError::InvalidPageName { name } => HumanError {
            message: format!("\"{name}\" is not a page file."),
            suggestion: "Name every page like 3_chapter.png: the page number, an underscore, any text, then .png."
                .into(),
            retriable: false,
        },

        PaginatorError::DuplicatePage {
            ordinal,
            first,
            second,
        } => HumanError {
            message: format!("Two files claim to be page {ordinal}."),
            suggestion: format!(
                "Rename either \"{first}\" or \"{second}\" so each page number is used once."
            ),
            retriable: false,
        },

        PaginatorError::NoPages => HumanError {
            message: "No page images were found.".into(),
            suggestion: "Put files named like 1_cover.png, 2_intro.png in the folder (or one subfolder deep)."
                .into(),
            retriable: false,
        },

        PaginatorError::MissingAsset { role, path } => HumanError {
            message: format!("The {role} is missing."),
            suggestion: match role {
                AssetRole::Template => format!(
                    "Place the header/footer template at {} and try again.",
                    path.display()
                ),
                AssetRole::TitleFont | AssetRole::PageNumberFont => format!(
                    "Install the font file at {} and try again.",
                    path.display()
                ),
            },
            retriable: false,
        },

        PaginatorError::InvalidAsset { role, .. } => HumanError {
            message: format!("The {role} could not be read."),
            suggestion: "Replace it with a valid file (PNG for the template, TrueType/OpenType for fonts)."
                .into(),
            retriable: false,
        },

        PaginatorError::PageProcessing { ordinal, .. } => HumanError {
            message: format!("Page {ordinal} could not be processed."),
            suggestion: format!(
                "Check that page {ordinal} is a valid PNG image and re-export it if needed."
            ),
            retriable: false,
        },

        PaginatorError::DocumentWrite(_) => HumanError {
            message: "The PDF could not be saved.".into(),
            suggestion: "Check free disk space and that the output folder is writable.".into(),
            retriable: true,
        },

        PaginatorError::DocumentRead(_) => HumanError {
            message: "That file is not a readable PDF.".into(),
            suggestion: "Check the path, or regenerate the document.".into(),
            retriable: false,
        },

        PaginatorError::Cancelled => HumanError {
            message: "The job was cancelled.".into(),
            suggestion: "Submit it again when you are ready.".into(),
            retriable: true,
        },

        PaginatorError::InvalidRequest(detail) => HumanError {
            message: "The request was incomplete.".into(),
            suggestion: detail.clone(),
            retriable: false,
        },

        PaginatorError::Unauthorized => HumanError {
            message: "The agent refused the API key.".into(),
            suggestion: "Copy the key printed when the agent started (also saved in .api-key)."
                .into(),
            retriable: false,
        },

        PaginatorError::Server(_) => HumanError {
            message: "The agent could not start or lost its connection.".into(),
            suggestion: "Make sure the port is free, then restart the agent.".into(),
            retriable: true,
        },

        PaginatorError::Io(_) => HumanError {
            message: "A file could not be read or written.".into(),
            suggestion: "Check that the files exist and that you have permission to use them."
                .into(),
            retriable: true,
        },

        PaginatorError::Serialization(_) => HumanError {
            message: "A settings or message file is malformed.".into(),
            suggestion: "Fix the JSON (or delete the config file to use defaults).".into(),
            retriable: false,
        },
    }
}
