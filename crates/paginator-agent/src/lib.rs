// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// paginator-agent: runs the page pipeline for a remote web client. Jobs are
// submitted over HTTP or a WebSocket channel, authenticated with a shared API
// key, and written to the agent's output directory.

pub mod auth;
pub mod http;
pub mod jobs;
pub mod protocol;
pub mod server;
pub mod websocket;

pub use auth::ApiKey;
pub use jobs::{JobContext, JobRegistry};
pub use protocol::{AGENT_VERSION, ClientMessage, ProcessRequest, ServerMessage};
pub use server::{AgentServer, AgentSettings};
