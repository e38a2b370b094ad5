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

//! Per-connection chat state machine.
//!
//! [`ChatSession`] knows nothing about sockets. A driver owns it together with
//! a [`ChatChannel`], forwards channel events (`handle_open`, `handle_frame`,
//! `handle_error`, `handle_close`) and caller requests (`send_question`,
//! `send_quit`, `close`, `abort`) from a single task, and the session decides
//! what gets sent, queued, dropped or reported.
//!
//! ```text
//! connecting ──► open ──► closing ──► closed
//!     │            │                    ▲
//!     └──► errored ◄┘────────────────────┘
//! ```
//!
//! `close`, `abort` and a remote close all converge on the same teardown in
//! [`handle_close`](ChatSession::handle_close), which runs at most once.

use agent_chat_types::{
    AnswerDecodeError, AragAnswer, Callback, Headers, Interaction, ABORTED_REASON, NORMAL_CLOSURE,
};
use log::{debug, info, warn};
use std::collections::VecDeque;

use crate::error::{ChatError, ErrorCause};

/// State of the underlying channel, as the channel reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Lifecycle of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Connecting,
    Open,
    /// The channel reported a transport fault; a close always follows.
    Errored,
    /// Close was requested locally; waiting for the channel to close.
    Closing,
    Closed,
}

/// The socket seen from the session.
pub trait ChatChannel {
    fn ready_state(&self) -> ReadyState;

    /// Send one text frame. Only called while the channel is open.
    fn send_text(&mut self, frame: String);

    /// Ask the channel to close. The channel answers later through
    /// [`ChatSession::handle_close`].
    fn close(&mut self, code: u16, reason: Option<&str>);
}

/// An inbound payload before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Anything else the channel delivered.
    Unsupported(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    /// Close without a close handshake (1006).
    pub fn abnormal() -> Self {
        Self {
            code: 1006,
            reason: String::new(),
            was_clean: false,
        }
    }
}

/// Lifecycle callbacks. All optional.
#[derive(Clone, Debug, Default)]
pub struct ChatHandlers {
    pub on_open: Option<Callback<()>>,
    pub on_answer: Option<Callback<AragAnswer>>,
    pub on_done: Option<Callback<AragAnswer>>,
    pub on_error: Option<Callback<ChatError>>,
    pub on_close: Option<Callback<CloseEvent>>,
}

pub struct ChatSession<C: ChatChannel> {
    channel: C,
    handlers: ChatHandlers,
    pending: VecDeque<String>,
    phase: SessionPhase,
}

impl<C: ChatChannel> std::fmt::Debug for ChatSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("phase", &self.phase)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<C: ChatChannel> ChatSession<C> {
    pub fn new(channel: C, handlers: ChatHandlers) -> Self {
        Self {
            channel,
            handlers,
            pending: VecDeque::new(),
            phase: SessionPhase::Connecting,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True once `close`, `abort` or a channel close has happened.
    pub fn is_closing(&self) -> bool {
        matches!(self.phase, SessionPhase::Closing | SessionPhase::Closed)
    }

    /// Serialized frames waiting for the channel to open, oldest first.
    pub fn pending(&self) -> impl ExactSizeIterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    // ── Caller requests ──────────────────────────────────────────────────────

    pub fn send_question(&mut self, text: &str, headers: Option<Headers>) {
        self.enqueue(Interaction::question(text, headers));
    }

    /// Only queues a quit while the channel can still carry it.
    pub fn send_quit(&mut self) {
        if matches!(
            self.channel.ready_state(),
            ReadyState::Connecting | ReadyState::Open
        ) {
            self.enqueue(Interaction::quit());
        }
    }

    /// Close the conversation: send `quit` if the channel is open, then ask
    /// the channel to close. No-op once closing.
    pub fn close(&mut self, code: Option<u16>, reason: Option<&str>) {
        self.shut_down(code.unwrap_or(NORMAL_CLOSURE), reason);
    }

    /// Cancellation signal fired. Same as `close(1000, "aborted")`.
    pub fn abort(&mut self) {
        if !self.is_closing() {
            info!("chat session aborted");
        }
        self.shut_down(NORMAL_CLOSURE, Some(ABORTED_REASON));
    }

    fn shut_down(&mut self, code: u16, reason: Option<&str>) {
        if self.is_closing() {
            return;
        }
        self.phase = SessionPhase::Closing;
        if self.channel.ready_state() == ReadyState::Open {
            // The latch is already set, so this bypasses `enqueue`.
            self.transmit(Interaction::quit());
        }
        self.channel.close(code, reason);
    }

    fn enqueue(&mut self, interaction: Interaction) {
        if self.is_closing() {
            debug!("dropping {:?} frame: session is closing", interaction.operation);
            return;
        }
        let frame = match interaction.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to serialize chat interaction: {e}");
                return;
            }
        };
        match self.channel.ready_state() {
            ReadyState::Open => self.channel.send_text(frame),
            ReadyState::Connecting => {
                debug!("queueing chat frame until the socket opens");
                self.pending.push_back(frame);
            }
            state => debug!("dropping chat frame: socket is {state:?}"),
        }
    }

    fn transmit(&mut self, interaction: Interaction) {
        match interaction.to_frame() {
            Ok(frame) => self.channel.send_text(frame),
            Err(e) => warn!("failed to serialize chat interaction: {e}"),
        }
    }

    // ── Channel events ───────────────────────────────────────────────────────

    /// Flush queued frames in order, then notify `on_open`.
    pub fn handle_open(&mut self) {
        if self.phase != SessionPhase::Connecting {
            debug!("ignoring open in phase {:?}", self.phase);
            return;
        }
        self.phase = SessionPhase::Open;
        info!("chat socket open, flushing {} queued frame(s)", self.pending.len());
        while let Some(frame) = self.pending.pop_front() {
            self.channel.send_text(frame);
        }
        if let Some(on_open) = &self.handlers.on_open {
            on_open.emit(());
        }
    }

    pub fn handle_frame(&mut self, frame: Frame) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    let error = e.utf8_error().to_string();
                    self.dispatch_error(ChatError::parse(
                        "unable to decode binary chat payload",
                        ErrorCause::Encoding {
                            raw: e.into_bytes(),
                            error,
                        },
                    ));
                    return;
                }
            },
            Frame::Unsupported(raw) => {
                self.dispatch_error(ChatError::parse(
                    "unsupported chat payload type",
                    ErrorCause::Unsupported(raw),
                ));
                return;
            }
        };

        match AragAnswer::decode(&text) {
            Ok(answer) => self.process_answer(answer),
            Err(AnswerDecodeError::Syntax(e)) => self.dispatch_error(ChatError::parse(
                "unable to parse chat message payload",
                ErrorCause::Syntax {
                    raw: text,
                    error: e.to_string(),
                },
            )),
            Err(AnswerDecodeError::Shape(value)) => self.dispatch_error(ChatError::parse(
                "received unexpected chat payload structure",
                ErrorCause::Shape(value),
            )),
        }
    }

    fn process_answer(&mut self, answer: AragAnswer) {
        debug!("chat answer with operation {:?}", answer.operation);
        if let Some(on_answer) = &self.handlers.on_answer {
            on_answer.emit(answer.clone());
        }
        if answer.is_error() {
            self.dispatch_error(ChatError::agent(answer));
        } else if answer.is_done() {
            if let Some(on_done) = &self.handlers.on_done {
                on_done.emit(answer);
            }
        }
    }

    /// Transport-level fault.
    pub fn handle_error(&mut self, error: ChatError) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        if matches!(self.phase, SessionPhase::Connecting | SessionPhase::Open) {
            self.phase = SessionPhase::Errored;
        }
        self.dispatch_error(error);
    }

    /// The channel closed. Tears the session down exactly once.
    pub fn handle_close(&mut self, event: CloseEvent) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        info!(
            "chat socket closed (code {}, reason '{}')",
            event.code, event.reason
        );
        self.phase = SessionPhase::Closed;
        self.pending.clear();
        let handlers = std::mem::take(&mut self.handlers);
        if let Some(on_close) = handlers.on_close {
            on_close.emit(event);
        }
    }

    fn dispatch_error(&self, error: ChatError) {
        debug!("chat error ({}): {}", error.kind(), error.message());
        if let Some(on_error) = &self.handlers.on_error {
            on_error.emit(error);
        }
    }
}
