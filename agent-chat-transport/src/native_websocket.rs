/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Native chat connections using `tokio-tungstenite`.
//!
//! [`ChatRepository::connect`] spawns one driver task per conversation turn.
//! The task owns the socket and the [`ChatSession`]; the returned
//! [`ChatConnection`] only posts commands to it, so every callback runs on the
//! driver task in the order the socket delivered the events.
//!
//! # Example
//!
//! ```no_run
//! use agent_chat_transport::{
//!     ChatConnectOptions, ChatHandlers, ChatRepository, ChatRepositoryConfig,
//! };
//! use agent_chat_types::{AragAnswer, Callback};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let repository = ChatRepository::new(ChatRepositoryConfig {
//!     backend_url: "https://europe-1.rag.progress.cloud".into(),
//!     knowledge_box_id: Some("my-kb".into()),
//! })?;
//!
//! let connection = repository.connect(ChatConnectOptions {
//!     session_id: "ephemeral".into(),
//!     token: "eph-token".into(),
//!     question: Some("What is the refund policy?".into()),
//!     handlers: ChatHandlers {
//!         on_answer: Some(Callback::from(|answer: AragAnswer| println!("{answer:?}"))),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! })?;
//!
//! connection.closed().await;
//! # Ok(())
//! # }
//! ```

use agent_chat_types::Headers;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::MaybeTlsStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::endpoint::{redact_token, ChatRepository};
use crate::error::{ChatError, ConfigError};
use crate::session::{ChatChannel, ChatHandlers, ChatSession, CloseEvent, Frame, ReadyState};

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the peer to answer our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported when the peer's close frame carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Error type for WebSocket connection attempts.
///
/// Preserves the HTTP status code when the server rejects the upgrade, which
/// is how an expired or invalid `eph-token` shows up (401, 403).
#[derive(Debug, thiserror::Error)]
pub enum WebSocketConnectError {
    /// The server rejected the upgrade with an HTTP error status.
    #[error("HTTP {status}: WebSocket upgrade rejected")]
    HttpError {
        /// The HTTP status code returned by the server.
        status: u16,
    },
    /// A transport-level or protocol-level error occurred.
    #[error("WebSocket connection failed: {0}")]
    Other(String),
}

impl WebSocketConnectError {
    /// Returns the HTTP status code if this was an HTTP rejection, else `None`.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpError { status } => Some(*status),
            Self::Other(_) => None,
        }
    }

    fn from_tungstenite(error: WsError, target: &str) -> Self {
        match error {
            WsError::Http(response) => Self::HttpError {
                status: response.status().as_u16(),
            },
            other => Self::Other(format!("connection to '{target}' failed: {other}")),
        }
    }
}

impl From<WebSocketConnectError> for ChatError {
    fn from(error: WebSocketConnectError) -> Self {
        match error.http_status() {
            Some(status) => ChatError::upgrade_rejected(status),
            None => ChatError::websocket(error),
        }
    }
}

/// Everything [`ChatRepository::connect`] needs for one conversation turn.
#[derive(Debug, Default)]
pub struct ChatConnectOptions {
    /// Persisted session id, or `"ephemeral"`.
    pub session_id: String,
    /// Short-lived credential, sent as the `eph-token` query parameter.
    pub token: String,
    /// Sent as soon as possible; queued until the socket opens.
    pub question: Option<String>,
    /// Headers for the initial question.
    pub headers: Option<Headers>,
    /// Replay frames from this cursor instead of only new ones.
    pub from_cursor: Option<u64>,
    /// Cancelling this token ends the conversation with close code 1000 and
    /// reason `"aborted"`.
    pub signal: Option<CancellationToken>,
    /// Overrides the repository's default knowledge box.
    pub knowledge_box_id: Option<String>,
    pub handlers: ChatHandlers,
}

#[derive(Debug)]
enum Command {
    Question {
        text: String,
        headers: Option<Headers>,
    },
    Quit,
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Handle to a live chat connection.
///
/// Clones share the same connection. The conversation is closed when the
/// last clone is dropped.
#[derive(Debug, Clone)]
#[must_use = "the chat connection is closed when every handle is dropped"]
pub struct ChatConnection {
    url: Url,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ReadyState>,
}

impl ChatConnection {
    pub fn send_question(&self, question: impl Into<String>, headers: Option<Headers>) {
        self.post(Command::Question {
            text: question.into(),
            headers,
        });
    }

    pub fn send_quit(&self) {
        self.post(Command::Quit);
    }

    /// Close with `code` (default 1000). Sends `quit` first if the socket is
    /// open. Later calls are ignored.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.post(Command::Close {
            code,
            reason: reason.map(str::to_string),
        });
    }

    /// The endpoint this connection was opened against.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }

    /// Resolves once the socket is closed and `on_close` has run.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // The driver publishes `Closed` before it exits, so a dropped sender
        // also means closed.
        let _ = state.wait_for(|state| *state == ReadyState::Closed).await;
    }

    fn post(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!("chat connection already finished, dropping {:?}", e.0);
        }
    }
}

impl ChatRepository {
    /// Open a chat connection.
    ///
    /// Returns immediately with the socket in [`ReadyState::Connecting`];
    /// sends issued before the handshake completes are queued. Only
    /// configuration problems are returned as errors, everything else goes to
    /// `on_error`. Must be called from within a tokio runtime.
    ///
    /// Besides `close`, the abort signal and a channel close, dropping every
    /// clone of the returned [`ChatConnection`] also closes the conversation,
    /// exactly as `close(None, None)` would.
    pub fn connect(&self, options: ChatConnectOptions) -> Result<ChatConnection, ConfigError> {
        let ChatConnectOptions {
            session_id,
            token,
            question,
            headers,
            from_cursor,
            signal,
            knowledge_box_id,
            handlers,
        } = options;

        let url = self.build_socket_url(
            &session_id,
            &token,
            knowledge_box_id.as_deref(),
            from_cursor,
        )?;

        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::new(NativeChannel::new(state_tx), handlers);

        let signal = signal.unwrap_or_default();
        if signal.is_cancelled() {
            session.abort();
        }
        if let Some(question) = question {
            session.send_question(&question, headers);
        }

        info!("chat session '{session_id}' connecting");
        tokio::spawn(drive(session, url.clone(), command_rx, signal));

        Ok(ChatConnection {
            url,
            commands: command_tx,
            state: state_rx,
        })
    }
}

/// The socket as the session sees it. Outbound frames are buffered and
/// written by the driver after every session call.
struct NativeChannel {
    state: ReadyState,
    state_tx: watch::Sender<ReadyState>,
    outbox: VecDeque<Message>,
    close_request: Option<CloseEvent>,
}

impl NativeChannel {
    fn new(state_tx: watch::Sender<ReadyState>) -> Self {
        Self {
            state: ReadyState::Connecting,
            state_tx,
            outbox: VecDeque::new(),
            close_request: None,
        }
    }

    fn set_state(&mut self, state: ReadyState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn requested_close_event(&mut self) -> CloseEvent {
        self.close_request.take().unwrap_or_else(CloseEvent::abnormal)
    }
}

impl ChatChannel for NativeChannel {
    fn ready_state(&self) -> ReadyState {
        self.state
    }

    fn send_text(&mut self, frame: String) {
        self.outbox.push_back(Message::Text(frame));
    }

    fn close(&mut self, code: u16, reason: Option<&str>) {
        if !matches!(self.state, ReadyState::Connecting | ReadyState::Open) {
            return;
        }
        let reason = reason.unwrap_or_default().to_string();
        if self.state == ReadyState::Open {
            self.outbox.push_back(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.clone().into(),
            })));
        }
        self.close_request = Some(CloseEvent {
            code,
            reason,
            was_clean: false,
        });
        self.set_state(ReadyState::Closing);
    }
}

async fn drive(
    mut session: ChatSession<NativeChannel>,
    url: Url,
    mut commands: mpsc::UnboundedReceiver<Command>,
    signal: CancellationToken,
) {
    let target = redact_token(&url);
    let mut commands_open = true;

    let connect = tokio_tungstenite::connect_async(url.to_string());
    tokio::pin!(connect);

    let mut ws: WsStream = loop {
        if session.channel().ready_state() == ReadyState::Closing {
            debug!("chat socket closed before the handshake completed");
            let event = session.channel_mut().requested_close_event();
            finish(&mut session, event);
            return;
        }
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws, response)) => {
                    info!("chat socket connected to {target} (HTTP {})", response.status());
                    break ws;
                }
                Err(e) => {
                    let e = WebSocketConnectError::from_tungstenite(e, &target);
                    error!("{e}");
                    session.handle_error(ChatError::from(e));
                    finish(&mut session, CloseEvent::abnormal());
                    return;
                }
            },
            command = commands.recv(), if commands_open => {
                apply(&mut session, command, &mut commands_open);
            }
            _ = signal.cancelled(), if !session.is_closing() => session.abort(),
        }
    };

    session.channel_mut().set_state(ReadyState::Open);
    session.handle_open();

    let mut peer_close: Option<CloseEvent> = None;
    let mut close_deadline: Option<Instant> = None;
    loop {
        if let Err(e) = flush(&mut ws, session.channel_mut()).await {
            error!("chat socket write error: {e}");
            session.handle_error(ChatError::websocket(e));
            finish(&mut session, CloseEvent::abnormal());
            return;
        }
        if close_deadline.is_none() && session.channel().ready_state() == ReadyState::Closing {
            close_deadline = Some(Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
        }
        let close_timer = async move {
            match close_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => session.handle_frame(Frame::Text(text)),
                Some(Ok(Message::Binary(data))) => session.handle_frame(Frame::Binary(data)),
                Some(Ok(Message::Ping(payload))) => {
                    debug!("chat socket ping received ({} bytes)", payload.len());
                }
                Some(Ok(Message::Pong(_))) => debug!("chat socket pong received"),
                Some(Ok(Message::Frame(frame))) => {
                    session.handle_frame(Frame::Unsupported(frame.into_data()));
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("chat socket received close frame");
                    peer_close = Some(close_event(frame));
                    session.channel_mut().set_state(ReadyState::Closing);
                }
                None | Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    let event = match peer_close.take() {
                        Some(event) => event,
                        None => session.channel_mut().requested_close_event(),
                    };
                    finish(&mut session, event);
                    return;
                }
                Some(Err(e)) => {
                    error!("chat socket read error: {e}");
                    session.handle_error(ChatError::websocket(e));
                    finish(&mut session, CloseEvent::abnormal());
                    return;
                }
            },
            command = commands.recv(), if commands_open => {
                apply(&mut session, command, &mut commands_open);
            }
            _ = signal.cancelled(), if !session.is_closing() => session.abort(),
            _ = close_timer => {
                warn!("chat socket close handshake timed out");
                let event = match peer_close.take() {
                    Some(event) => event,
                    None => session.channel_mut().requested_close_event(),
                };
                finish(&mut session, event);
                return;
            }
        }
    }
}

fn apply(
    session: &mut ChatSession<NativeChannel>,
    command: Option<Command>,
    commands_open: &mut bool,
) {
    match command {
        Some(Command::Question { text, headers }) => session.send_question(&text, headers),
        Some(Command::Quit) => session.send_quit(),
        Some(Command::Close { code, reason }) => session.close(code, reason.as_deref()),
        None => {
            debug!("every chat connection handle was dropped, closing");
            *commands_open = false;
            session.close(None, None);
        }
    }
}

async fn flush(ws: &mut WsStream, channel: &mut NativeChannel) -> Result<(), WsError> {
    while let Some(message) = channel.outbox.pop_front() {
        ws.send(message).await?;
    }
    Ok(())
}

fn close_event(frame: Option<CloseFrame<'static>>) -> CloseEvent {
    match frame {
        Some(frame) => CloseEvent {
            code: u16::from(frame.code),
            reason: frame.reason.into_owned(),
            was_clean: true,
        },
        None => CloseEvent {
            code: NO_STATUS_RECEIVED,
            reason: String::new(),
            was_clean: true,
        },
    }
}

/// `Closed` is published after `on_close` so that `ChatConnection::closed`
/// never resolves ahead of the callback.
fn finish(session: &mut ChatSession<NativeChannel>, event: CloseEvent) {
    session.channel_mut().outbox.clear();
    session.handle_close(event);
    session.channel_mut().set_state(ReadyState::Closed);
}
