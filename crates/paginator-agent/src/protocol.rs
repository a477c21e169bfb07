// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON messages exchanged with the web client, over HTTP bodies and the
// WebSocket channel.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use paginator_core::error::{PaginatorError, Result};
use paginator_core::human_errors::humanize_error;
use paginator_core::types::{JobId, JobStatus, Progress};
use paginator_document::{JobInput, parse_ordinal};
use serde::{Deserialize, Serialize};

/// Version reported by `/health`; the web client checks it.
pub const AGENT_VERSION: &str = "2.0.0";

pub const CAPABILITIES: [&str; 2] = ["pdf-generation", "batch-upload"];

// ---------------------------------------------------------------------------
// Job submission
// ---------------------------------------------------------------------------

/// One uploaded page: file name plus base64 content, optionally as a data URL.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub data: String,
}

impl UploadedFile {
    /// Decode the content, dropping a `data:...;base64,` prefix if present.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let encoded = match self.data.split_once(',') {
            Some((_, rest)) => rest,
            None => self.data.as_str(),
        };
        STANDARD.decode(encoded.trim()).map_err(|err| {
            PaginatorError::InvalidRequest(format!("{} is not valid base64: {err}", self.name))
        })
    }
}

/// Body of `POST /process`, and the payload of a WebSocket `process` message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

impl ProcessRequest {
    /// Reject requests that cannot start a job.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(PaginatorError::InvalidRequest(
                "Document title is required".into(),
            ));
        }
        if self.files.is_empty() {
            return Err(PaginatorError::InvalidRequest(
                "At least one file is required".into(),
            ));
        }
        Ok(())
    }

    /// Validate, check every file name, then decode every upload.
    ///
    /// Names are checked before any content is decoded, so a badly named file
    /// fails the request without decoding the rest.
    pub fn into_job_input(self) -> Result<JobInput> {
        self.validate()?;
        for file in &self.files {
            parse_ordinal(&file.name)?;
        }

        let files = self
            .files
            .iter()
            .map(|file| Ok((file.name.clone(), file.decode()?)))
            .collect::<Result<Vec<_>>>()?;
        JobInput::from_files(self.title.trim(), files)
    }
}

// ---------------------------------------------------------------------------
// WebSocket messages
// ---------------------------------------------------------------------------

/// Messages the client sends over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Authenticate {
        #[serde(rename = "apiKey", default)]
        api_key: String,
    },
    Process {
        #[serde(flatten)]
        request: ProcessRequest,
        #[serde(rename = "returnPdf", default)]
        return_pdf: bool,
    },
    /// Any other `type`; ignored once authenticated.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Messages the agent sends over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Authenticated {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Status {
        status: JobStatus,
        message: String,
    },
    Progress {
        progress: Progress,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        job_id: JobId,
        saved_path: PathBuf,
        /// Base64 PDF when the client asked for it, `null` otherwise.
        pdf_data: Option<String>,
        sha256: String,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            hint: None,
        }
    }

    /// Error message for a failed job, with a human hint.
    pub fn job_error(err: &PaginatorError) -> Self {
        Self::Error {
            error: error_text(err),
            hint: Some(humanize_error(err).suggestion),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"type":"error","error":"failed to encode message: {err}"}}"#)
        })
    }
}

/// The `error` string shown to clients.
///
/// Request validation messages go out verbatim; everything else uses the
/// error's display form.
pub fn error_text(err: &PaginatorError) -> String {
    match err {
        PaginatorError::InvalidRequest(message) => message.clone(),
        PaginatorError::Unauthorized => "Unauthorized: Invalid API key".into(),
        other => other.to_string(),
    }
}

/// Base64 encoding for returned PDFs.
pub fn encode_pdf(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn data_url_prefix_is_stripped() {
        let file = UploadedFile {
            name: "1_a.png".into(),
            data: "data:image/png;base64,aGVsbG8=".into(),
        };
        assert_eq!(file.decode().expect("decode"), b"hello");

        let bare = UploadedFile {
            name: "1_a.png".into(),
            data: "aGVsbG8=".into(),
        };
        assert_eq!(bare.decode().expect("decode"), b"hello");
    }

    #[test]
    fn bad_base64_is_an_invalid_request() {
        let file = UploadedFile {
            name: "1_a.png".into(),
            data: "!!!".into(),
        };
        assert!(matches!(file.decode(), Err(PaginatorError::InvalidRequest(_))));
    }

    #[test]
    fn validation_messages_match_the_web_client() {
        let blank: ProcessRequest =
            serde_json::from_value(json!({"title": "  ", "files": []})).expect("parse");
        let err = blank.validate().expect_err("blank title");
        assert_eq!(error_text(&err), "Document title is required");

        let no_files: ProcessRequest =
            serde_json::from_value(json!({"title": "Doc"})).expect("parse");
        let err = no_files.validate().expect_err("no files");
        assert_eq!(error_text(&err), "At least one file is required");
    }

    #[test]
    fn bad_name_fails_before_decoding() {
        let request: ProcessRequest = serde_json::from_value(json!({
            "title": "Doc",
            "files": [
                {"name": "1_a.png", "data": "not base64 !!"},
                {"name": "cover.png", "data": "aGVsbG8="}
            ]
        }))
        .expect("parse");
        assert!(matches!(
            request.into_job_input(),
            Err(PaginatorError::InvalidPageName { .. })
        ));
    }

    #[test]
    fn job_input_carries_decoded_pages() {
        let request: ProcessRequest = serde_json::from_value(json!({
            "title": " Doc ",
            "files": [
                {"name": "2_b.png", "data": "Yg=="},
                {"name": "1_a.png", "data": "YQ=="}
            ]
        }))
        .expect("parse");
        let input = request.into_job_input().expect("input");
        assert_eq!(input.title, "Doc");
        assert_eq!(input.pages.len(), 2);
        assert_eq!(input.pages[0].ordinal, 2);
        assert_eq!(input.pages[1].source, b"a");
    }

    #[test]
    fn client_messages_parse_by_type() {
        match ClientMessage::parse(r#"{"type":"authenticate","apiKey":"k"}"#).expect("parse") {
            ClientMessage::Authenticate { api_key } => assert_eq!(api_key, "k"),
            other => panic!("unexpected {other:?}"),
        }

        let text = concat!(
            r#"{"type":"process","title":"T","#,
            r#""files":[{"name":"1_a.png","data":""}],"returnPdf":true}"#
        );
        let process = ClientMessage::parse(text).expect("parse");
        match process {
            ClientMessage::Process {
                request,
                return_pdf,
            } => {
                assert_eq!(request.title, "T");
                assert_eq!(request.files.len(), 1);
                assert!(return_pdf);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            ClientMessage::parse(r#"{"type":"subscribe"}"#).expect("parse"),
            ClientMessage::Unknown
        ));
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"no":"type"}"#).is_err());
    }

    #[test]
    fn server_messages_use_wire_names() {
        let progress: Value = serde_json::from_str(
            &ServerMessage::Progress {
                progress: Progress {
                    current: 2,
                    total: 3,
                    page: 2,
                },
            }
            .to_json(),
        )
        .expect("json");
        assert_eq!(
            progress,
            json!({"type": "progress", "progress": {"current": 2, "total": 3, "page": 2}})
        );

        let status: Value = serde_json::from_str(
            &ServerMessage::Status {
                status: JobStatus::Processing,
                message: "Starting PDF generation...".into(),
            }
            .to_json(),
        )
        .expect("json");
        assert_eq!(status["status"], "processing");

        let completed: Value = serde_json::from_str(
            &ServerMessage::Completed {
                job_id: JobId::new(),
                saved_path: PathBuf::from("output/x.pdf"),
                pdf_data: None,
                sha256: "ab".into(),
            }
            .to_json(),
        )
        .expect("json");
        assert_eq!(completed["type"], "completed");
        assert_eq!(completed["savedPath"], "output/x.pdf");
        assert!(completed["pdfData"].is_null());
        assert!(completed["jobId"].is_string());

        let auth: Value = serde_json::from_str(
            &ServerMessage::Authenticated {
                success: true,
                error: None,
            }
            .to_json(),
        )
        .expect("json");
        assert_eq!(auth, json!({"type": "authenticated", "success": true}));
    }
}
