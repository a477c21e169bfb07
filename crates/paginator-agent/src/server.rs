// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paginator job agent: lets the web client run the page pipeline remotely.
//
// The agent listens on a raw TCP port (default 3838) and speaks just enough
// HTTP/1.1 for a handful of JSON endpoints, plus an RFC 6455 WebSocket
// channel for live progress. Each connection is served by its own task;
// pipeline work runs on the blocking pool so a long job never stalls the
// accept loop or other connections.
//
// # Endpoints
//
//   GET    /health     liveness + capabilities (no key needed)
//   POST   /process    submit a job; `X-Return-PDF: true` waits for the PDF
//   GET    /job/{id}   job snapshot
//   DELETE /job/{id}   cooperative cancellation
//   OPTIONS *          CORS preflight
//
// Any request carrying `Upgrade: websocket` switches to the WebSocket channel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use paginator_core::config::PageLayout;
use paginator_core::error::{PaginatorError, Result};
use paginator_core::human_errors::humanize_error;
use paginator_core::types::{DocumentOutput, JobId, JobStatus, Progress, ServerStatus};
use paginator_document::{AssetBundle, JobInput, run_job};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::ApiKey;
use crate::http::{self, HttpError, HttpRequest, HttpResponse};
use crate::jobs::{JobContext, JobProgress, JobRegistry};
use crate::protocol::{
    AGENT_VERSION, CAPABILITIES, ClientMessage, ProcessRequest, ServerMessage, encode_pdf,
    error_text,
};
use crate::websocket::{Message, WebSocket, WsError};

// ---------------------------------------------------------------------------
// Settings and shared state
// ---------------------------------------------------------------------------

/// Everything the agent needs to run jobs.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// TCP port; 0 picks a free one.
    pub port: u16,
    /// Where each job's `<job-id>.pdf` is written.
    pub output_dir: PathBuf,
    pub api_key: ApiKey,
    pub assets: AssetBundle,
    pub layout: PageLayout,
}

/// State shared across all connection-handling tasks.
struct SharedState {
    api_key: ApiKey,
    assets: AssetBundle,
    layout: PageLayout,
    output_dir: PathBuf,
    jobs: JobRegistry,
    active_connections: AtomicU32,
}

// ---------------------------------------------------------------------------
// AgentServer
// ---------------------------------------------------------------------------

pub struct AgentServer {
    /// Requested port, replaced by the bound port once running.
    port: u16,
    status: ServerStatus,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    shared: Arc<SharedState>,
}

impl AgentServer {
    /// Create a server in the `Stopped` state. Call [`AgentServer::start`]
    /// to begin accepting connections.
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            port: settings.port,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            local_addr: None,
            shared: Arc::new(SharedState {
                api_key: settings.api_key,
                assets: settings.assets,
                layout: settings.layout,
                output_dir: settings.output_dir,
                jobs: JobRegistry::new(),
                active_connections: AtomicU32::new(0),
            }),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn active_connections(&self) -> u32 {
        self.shared.active_connections.load(Ordering::Relaxed)
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.shared.jobs
    }

    /// Bind `0.0.0.0:{port}` and spawn the accept loop.
    ///
    /// # Errors
    ///
    /// Fails if the output directory cannot be created or the port cannot be
    /// bound.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let (ServerStatus::Running, Some(addr)) = (self.status, self.local_addr) {
            debug!(port = self.port, "agent already running");
            return Ok(addr);
        }

        self.status = ServerStatus::Starting;
        if let Err(e) = std::fs::create_dir_all(&self.shared.output_dir) {
            self.status = ServerStatus::Error;
            return Err(e.into());
        }

        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(PaginatorError::Server(format!("bind {bind_addr}: {e}")));
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| PaginatorError::Server(format!("local address: {e}")))?;
        self.port = local_addr.port();
        self.local_addr = Some(local_addr);

        info!(port = self.port, output_dir = %self.shared.output_dir.display(), "agent listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let shared = Arc::clone(&self.shared);
        let port = self.port;
        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, port, shared).await;
        });

        self.task_handle = Some(handle);
        self.status = ServerStatus::Running;
        Ok(local_addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Connections already being served and jobs already running finish on
    /// their own.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }

        info!(port = self.port, "stopping agent");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| PaginatorError::Server(format!("task join: {e}")))?;
        }

        self.status = ServerStatus::Stopped;
        self.local_addr = None;
        info!(port = self.port, "agent stopped");
        Ok(())
    }

    /// Runs until the shutdown signal; every connection gets its own task.
    async fn accept_loop(
        listener: TcpListener,
        shutdown: Arc<Notify>,
        port: u16,
        shared: Arc<SharedState>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!(port, "accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming connection");
                            let state = Arc::clone(&shared);
                            tokio::spawn(async move {
                                state.active_connections.fetch_add(1, Ordering::Relaxed);
                                let result =
                                    Self::handle_connection(stream, peer_addr, Arc::clone(&state))
                                        .await;
                                if let Err(e) = result {
                                    warn!(
                                        peer = %peer_addr,
                                        error = %e,
                                        "connection handler error"
                                    );
                                }
                                state.active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    /// Serve one connection: a single HTTP request, or a WebSocket session.
    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        shared: Arc<SharedState>,
    ) -> Result<()> {
        let mut reader = BufReader::new(stream);

        let request = match http::read_request(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(peer = %peer_addr, "connection closed without a request");
                return Ok(());
            }
            Err(HttpError::Io(e)) => {
                return Err(PaginatorError::Server(format!("read from {peer_addr}: {e}")));
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "rejected request");
                let response = HttpResponse::error(e.status(), &e.to_string());
                return send_response(reader.get_mut(), &response).await;
            }
        };

        debug!(
            peer = %peer_addr,
            method = %request.method,
            path = %request.path,
            body_bytes = request.body.len(),
            "parsed request"
        );

        if request.is_websocket_upgrade() {
            return handle_websocket(reader, &request, peer_addr, &shared).await;
        }

        let response = route(&request, &shared).await;
        info!(
            peer = %peer_addr,
            method = %request.method,
            path = %request.path,
            status = response.status,
            "request served"
        );
        send_response(reader.get_mut(), &response).await
    }
}

async fn send_response(stream: &mut TcpStream, response: &HttpResponse) -> Result<()> {
    stream
        .write_all(&response.to_bytes())
        .await
        .map_err(|e| PaginatorError::Server(format!("write response: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| PaginatorError::Server(format!("flush response: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP routing
// ---------------------------------------------------------------------------

async fn route(request: &HttpRequest, shared: &Arc<SharedState>) -> HttpResponse {
    let method = request.method.as_str();
    let path = request.path.as_str();

    if method == "OPTIONS" {
        return HttpResponse::empty(204);
    }
    if path == "/health" {
        return match method {
            "GET" => health(),
            _ => HttpResponse::error(405, "Method not allowed"),
        };
    }

    let job_id = path.strip_prefix("/job/");
    if path != "/process" && job_id.is_none() {
        return HttpResponse::error(404, "Not found");
    }

    if !shared.api_key.verify(request.header("x-api-key")) {
        warn!(path, "request with invalid API key");
        return HttpResponse::error(401, &error_text(&PaginatorError::Unauthorized));
    }

    match (method, job_id) {
        ("POST", None) => process(request, shared).await,
        ("GET", Some(id)) => job_status(id, shared),
        ("DELETE", Some(id)) => cancel_job(id, shared),
        _ => HttpResponse::error(405, "Method not allowed"),
    }
}

fn health() -> HttpResponse {
    HttpResponse::json(
        200,
        &json!({
            "status": "online",
            "version": AGENT_VERSION,
            "capabilities": CAPABILITIES,
        }),
    )
}

/// `{error, hint}` for a failed request or job.
fn error_response(status: u16, err: &PaginatorError) -> HttpResponse {
    HttpResponse::json(
        status,
        &json!({
            "error": error_text(err),
            "hint": humanize_error(err).suggestion,
        }),
    )
}

async fn process(request: &HttpRequest, shared: &Arc<SharedState>) -> HttpResponse {
    let submission: ProcessRequest = match serde_json::from_slice(&request.body) {
        Ok(submission) => submission,
        Err(e) => return HttpResponse::error(400, &format!("Invalid JSON body: {e}")),
    };

    let title = submission.title.trim().to_owned();
    let input = match submission.into_job_input() {
        Ok(input) => input,
        Err(err) => return error_response(400, &err),
    };

    let context = shared.jobs.create(&title);
    info!(job = %context.id(), title = %title, pages = input.pages.len(), "job accepted");
    let handle = spawn_job(shared, Arc::clone(&context), input, None);

    let return_pdf = request
        .header("x-return-pdf")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    if return_pdf {
        return match join_job(&context, handle).await {
            Ok(output) => HttpResponse::json(
                200,
                &json!({
                    "jobId": context.id(),
                    "status": JobStatus::Completed,
                    "pdfData": encode_pdf(&output.bytes),
                    "savedPath": output.path,
                    "sha256": output.sha256,
                }),
            ),
            Err(err) => error_response(500, &err),
        };
    }

    let job_id = context.id();
    tokio::spawn(async move {
        // Outcome is recorded on the context; nothing waits for it here.
        let _ = join_job(&context, handle).await;
    });

    HttpResponse::json(
        200,
        &json!({
            "jobId": job_id,
            "status": JobStatus::Processing,
            "message": "PDF generation started",
        }),
    )
}

fn find_job(id: &str, shared: &SharedState) -> Option<Arc<JobContext>> {
    JobId::parse(id).and_then(|id| shared.jobs.get(&id))
}

fn job_status(id: &str, shared: &SharedState) -> HttpResponse {
    let Some(context) = find_job(id, shared) else {
        return HttpResponse::error(404, "Job not found");
    };
    match serde_json::to_value(context.snapshot()) {
        Ok(value) => HttpResponse::json(200, &value),
        Err(e) => HttpResponse::error(500, &e.to_string()),
    }
}

fn cancel_job(id: &str, shared: &SharedState) -> HttpResponse {
    let Some(context) = find_job(id, shared) else {
        return HttpResponse::error(404, "Job not found");
    };
    if !context.request_cancel() {
        return HttpResponse::error(409, "Job already finished");
    }
    info!(job = %context.id(), "cancellation requested");
    HttpResponse::json(
        202,
        &json!({
            "jobId": context.id(),
            "status": context.status(),
            "message": "Cancellation requested",
        }),
    )
}

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

/// Run a job on the blocking pool. The context is updated with the outcome
/// before the handle resolves.
fn spawn_job(
    shared: &Arc<SharedState>,
    context: Arc<JobContext>,
    input: JobInput,
    forward: Option<UnboundedSender<Progress>>,
) -> JoinHandle<Result<DocumentOutput>> {
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || {
        let destination = shared.output_dir.join(format!("{}.pdf", context.id()));
        let mut observer = JobProgress::new(Arc::clone(&context), forward);
        let result = run_job(
            input,
            &shared.assets,
            &shared.layout,
            &destination,
            &mut observer,
            context.cancel_token(),
        );
        match &result {
            Ok(output) => context.complete(output),
            Err(err) => context.fail(err),
        }
        result
    })
}

async fn join_job(
    context: &JobContext,
    handle: JoinHandle<Result<DocumentOutput>>,
) -> Result<DocumentOutput> {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            let err = PaginatorError::Server(format!("job task failed: {e}"));
            context.fail(&err);
            Err(err)
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket channel
// ---------------------------------------------------------------------------

async fn handle_websocket(
    mut reader: BufReader<TcpStream>,
    request: &HttpRequest,
    peer_addr: SocketAddr,
    shared: &Arc<SharedState>,
) -> Result<()> {
    let Some(key) = request.header("sec-websocket-key") else {
        let response = HttpResponse::error(400, "Missing Sec-WebSocket-Key");
        return send_response(reader.get_mut(), &response).await;
    };

    reader
        .get_mut()
        .write_all(crate::websocket::handshake_response(key).as_bytes())
        .await
        .map_err(|e| PaginatorError::Server(format!("websocket handshake: {e}")))?;
    info!(peer = %peer_addr, "websocket client connected");

    let mut ws = WebSocket::new(reader);
    let result = websocket_session(&mut ws, shared).await;
    info!(peer = %peer_addr, "websocket client disconnected");
    result.map_err(|e| PaginatorError::Server(e.to_string()))
}

async fn websocket_session<S>(
    ws: &mut WebSocket<S>,
    shared: &Arc<SharedState>,
) -> std::result::Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut authenticated = false;

    while let Some(message) = ws.recv().await? {
        match message {
            Message::Text(text) => {
                if !websocket_text(ws, &text, &mut authenticated, shared).await? {
                    break;
                }
            }
            Message::Binary(_) => send(ws, &ServerMessage::error("Invalid message format")).await?,
            Message::Ping(payload) => ws.send_pong(&payload).await?,
            Message::Pong(_) => {}
            Message::Close => {
                ws.close().await?;
                break;
            }
        }
    }
    Ok(())
}

async fn send<S>(ws: &mut WebSocket<S>, message: &ServerMessage) -> std::result::Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.send_text(&message.to_json()).await
}

/// Handle one text message. Returns `false` when the session should end.
async fn websocket_text<S>(
    ws: &mut WebSocket<S>,
    text: &str,
    authenticated: &mut bool,
    shared: &Arc<SharedState>,
) -> std::result::Result<bool, WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Ok(message) = ClientMessage::parse(text) else {
        send(ws, &ServerMessage::error("Invalid message format")).await?;
        return Ok(true);
    };

    match message {
        ClientMessage::Authenticate { api_key } => {
            if shared.api_key.verify(Some(&api_key)) {
                *authenticated = true;
                debug!("websocket client authenticated");
                send(
                    ws,
                    &ServerMessage::Authenticated {
                        success: true,
                        error: None,
                    },
                )
                .await?;
                Ok(true)
            } else {
                warn!("websocket client sent an invalid API key");
                send(
                    ws,
                    &ServerMessage::Authenticated {
                        success: false,
                        error: Some("Invalid API key".into()),
                    },
                )
                .await?;
                ws.close().await?;
                Ok(false)
            }
        }
        _ if !*authenticated => {
            send(ws, &ServerMessage::error("Not authenticated")).await?;
            Ok(true)
        }
        ClientMessage::Process {
            request,
            return_pdf,
        } => {
            websocket_process(ws, request, return_pdf, shared).await?;
            Ok(true)
        }
        ClientMessage::Unknown => {
            debug!("ignoring unknown websocket message type");
            Ok(true)
        }
    }
}

/// Run a job for a WebSocket client: `status`, one `progress` per page in
/// order, then `completed` or `error`.
async fn websocket_process<S>(
    ws: &mut WebSocket<S>,
    request: ProcessRequest,
    return_pdf: bool,
    shared: &Arc<SharedState>,
) -> std::result::Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let title = request.title.trim().to_owned();
    let input = match request.into_job_input() {
        Ok(input) => input,
        Err(err) => return send(ws, &ServerMessage::job_error(&err)).await,
    };

    let context = shared.jobs.create(&title);
    info!(job = %context.id(), title = %title, pages = input.pages.len(), "websocket job accepted");
    send(
        ws,
        &ServerMessage::Status {
            status: JobStatus::Processing,
            message: "Starting PDF generation...".into(),
        },
    )
    .await?;

    let (tx, mut rx) = unbounded_channel();
    let handle = spawn_job(shared, Arc::clone(&context), input, Some(tx));

    // The sender lives in the job's observer; the channel closes when the
    // job returns, after its last page.
    while let Some(progress) = rx.recv().await {
        send(ws, &ServerMessage::Progress { progress }).await?;
    }

    let message = match join_job(&context, handle).await {
        Ok(output) => ServerMessage::Completed {
            job_id: context.id(),
            saved_path: output.path.clone(),
            pdf_data: return_pdf.then(|| encode_pdf(&output.bytes)),
            sha256: output.sha256,
        },
        Err(err) => ServerMessage::job_error(&err),
    };
    send(ws, &message).await
}
