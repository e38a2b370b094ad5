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

//! Real-time chat session transport for conversational agents.
//!
//! Opens one WebSocket per conversation turn, queues questions until the
//! socket is ready, decodes the agent's answer stream and reports failures as
//! one of three [`ChatErrorKind`]s.
//!
//! # Features
//!
//! - **`native`** (default): tokio + `tokio-tungstenite` driver exposing
//!   [`ChatRepository::connect`]

pub mod endpoint;
pub mod error;
pub mod session;

// ── Native transport ──────────────────────────────────────────────────────────

#[cfg(feature = "native")]
pub mod native_websocket;

pub use endpoint::{ChatRepository, ChatRepositoryConfig};
pub use error::{ChatError, ChatErrorKind, ConfigError, ErrorCause};
pub use session::{
    ChatChannel, ChatHandlers, ChatSession, CloseEvent, Frame, ReadyState, SessionPhase,
};

#[cfg(feature = "native")]
pub use native_websocket::{ChatConnectOptions, ChatConnection, WebSocketConnectError};
#[cfg(feature = "native")]
pub use tokio_util::sync::CancellationToken;
