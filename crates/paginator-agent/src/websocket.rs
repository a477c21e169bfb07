// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Server side of RFC 6455, just enough for the agent's JSON channel.
//
// Handshake: Sec-WebSocket-Accept = base64(SHA-1(key + GUID)).
//
// Frame layout (RFC 6455 SS5.2):
//
//   byte 0   FIN | RSV1-3 | opcode
//   byte 1   MASK | payload len (7 bits; 126 => u16 follows, 127 => u64)
//   [4]      masking key, client-to-server frames only
//   payload
//
// Client frames must be masked; server frames never are. Fragmented
// messages are reassembled, control frames may arrive between fragments.
// No extensions are negotiated.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::digest;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Fixed GUID appended to the client key (RFC 6455 SS1.3).
const HANDSHAKE_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest reassembled message accepted. Uploads travel as base64 in JSON.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

const OP_CONTINUATION: u8 = 0x0;
const OP_TEXT: u8 = 0x1;
const OP_BINARY: u8 = 0x2;
const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;
const OP_PONG: u8 = 0xA;

/// Close status: normal closure.
const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("websocket protocol violation: {0}")]
    Protocol(String),

    #[error("websocket message of {0} bytes exceeds {MAX_MESSAGE_BYTES} bytes")]
    TooLarge(usize),

    #[error("websocket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A complete message as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// `Sec-WebSocket-Accept` value for a client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(client_key.trim().as_bytes());
    ctx.update(HANDSHAKE_GUID.as_bytes());
    STANDARD.encode(ctx.finish().as_ref())
}

/// The `101 Switching Protocols` response completing the handshake.
pub fn handshake_response(client_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(client_key)
    )
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

struct Frame {
    fin: bool,
    opcode: u8,
    payload: Vec<u8>,
}

/// Read one client frame. `Ok(None)` means the peer closed the TCP stream
/// cleanly between frames.
async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<Option<Frame>, WsError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    match reader.read_exact(&mut head).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let fin = head[0] & 0x80 != 0;
    if head[0] & 0x70 != 0 {
        return Err(WsError::Protocol("reserved bits set".into()));
    }
    let opcode = head[0] & 0x0F;
    let masked = head[1] & 0x80 != 0;
    if !masked {
        return Err(WsError::Protocol("client frame is not masked".into()));
    }

    let len = match head[1] & 0x7F {
        126 => u64::from(reader.read_u16().await?),
        127 => reader.read_u64().await?,
        n => u64::from(n),
    };

    if opcode >= OP_CLOSE && (!fin || len > 125) {
        return Err(WsError::Protocol(
            "control frames must be unfragmented and at most 125 bytes".into(),
        ));
    }
    let len = usize::try_from(len).map_err(|_| WsError::TooLarge(usize::MAX))?;
    if len > max_payload {
        return Err(WsError::TooLarge(len));
    }

    let mut mask = [0u8; 4];
    reader.read_exact(&mut mask).await?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }

    Ok(Some(Frame {
        fin,
        opcode,
        payload,
    }))
}

/// Write one unmasked, unfragmented server frame.
async fn write_frame<W>(writer: &mut W, opcode: u8, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = Vec::with_capacity(10);
    head.push(0x80 | opcode);
    match payload.len() {
        n if n < 126 => head.push(n as u8),
        n if n <= usize::from(u16::MAX) => {
            head.push(126);
            head.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            head.push(127);
            head.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
    writer.write_all(&head).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An upgraded connection.
pub struct WebSocket<S> {
    stream: S,
    max_message: usize,
    /// Opcode and payload of a fragmented message still being received.
    partial: Option<(u8, Vec<u8>)>,
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream whose handshake has already been answered.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            max_message: MAX_MESSAGE_BYTES,
            partial: None,
        }
    }

    pub fn with_max_message(mut self, max_message: usize) -> Self {
        self.max_message = max_message;
        self
    }

    /// Next complete message, or `None` once the peer has gone away.
    pub async fn recv(&mut self) -> Result<Option<Message>, WsError> {
        loop {
            let buffered = self.partial.as_ref().map_or(0, |(_, buf)| buf.len());
            let remaining = self.max_message - buffered;
            let Some(frame) = read_frame(&mut self.stream, remaining).await? else {
                return Ok(None);
            };

            match frame.opcode {
                OP_CLOSE => return Ok(Some(Message::Close)),
                OP_PING => return Ok(Some(Message::Ping(frame.payload))),
                OP_PONG => return Ok(Some(Message::Pong(frame.payload))),
                OP_TEXT | OP_BINARY => {
                    if self.partial.is_some() {
                        return Err(WsError::Protocol(
                            "new message started before the previous one finished".into(),
                        ));
                    }
                    if frame.fin {
                        return finish(frame.opcode, frame.payload).map(Some);
                    }
                    self.partial = Some((frame.opcode, frame.payload));
                }
                OP_CONTINUATION => {
                    let Some((opcode, mut buffer)) = self.partial.take() else {
                        return Err(WsError::Protocol("continuation without a message".into()));
                    };
                    buffer.extend_from_slice(&frame.payload);
                    if frame.fin {
                        return finish(opcode, buffer).map(Some);
                    }
                    self.partial = Some((opcode, buffer));
                }
                other => {
                    return Err(WsError::Protocol(format!("unknown opcode 0x{other:X}")));
                }
            }
        }
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        Ok(write_frame(&mut self.stream, OP_TEXT, text.as_bytes()).await?)
    }

    pub async fn send_pong(&mut self, payload: &[u8]) -> Result<(), WsError> {
        Ok(write_frame(&mut self.stream, OP_PONG, payload).await?)
    }

    /// Send a normal-closure frame and shut the write side down.
    pub async fn close(&mut self) -> Result<(), WsError> {
        write_frame(&mut self.stream, OP_CLOSE, &CLOSE_NORMAL.to_be_bytes()).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn finish(opcode: u8, payload: Vec<u8>) -> Result<Message, WsError> {
    if opcode == OP_TEXT {
        String::from_utf8(payload)
            .map(Message::Text)
            .map_err(|_| WsError::Protocol("text message is not valid UTF-8".into()))
    } else {
        Ok(Message::Binary(payload))
    }
}
