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

//! Error types for the chat transport.
//!
//! [`ConfigError`] is returned synchronously from construction and from
//! [`ChatRepository::connect`](crate::ChatRepository). Everything that goes
//! wrong after a connection exists is a [`ChatError`] delivered through the
//! `on_error` handler.

use agent_chat_types::AragAnswer;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Misconfiguration detected before any socket is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("chat repository requires a backend URL")]
    MissingBackendUrl,

    #[error("invalid backend URL '{url}': {source}")]
    InvalidBackendUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("knowledge box identifier is required to start a chat session")]
    MissingKnowledgeBox,

    #[error("cannot switch '{url}' to the {scheme} scheme")]
    SchemeRewrite { url: String, scheme: &'static str },
}

/// The three kinds of post-connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatErrorKind {
    WebSocket,
    Parse,
    Agent,
}

impl fmt::Display for ChatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatErrorKind::WebSocket => write!(f, "websocket"),
            ChatErrorKind::Parse => write!(f, "parse"),
            ChatErrorKind::Agent => write!(f, "agent"),
        }
    }
}

/// The offending value behind a [`ChatError`].
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCause {
    /// Text frame that is not valid JSON.
    Syntax { raw: String, error: String },
    /// Binary frame that is not valid UTF-8.
    Encoding { raw: Vec<u8>, error: String },
    /// Valid JSON that is not an answer record.
    Shape(Value),
    /// A frame kind the protocol does not use.
    Unsupported(Vec<u8>),
    /// The server refused the WebSocket upgrade with this HTTP status, e.g.
    /// 401 or 403 for an expired token.
    Upgrade { status: u16 },
    /// Description of a transport fault.
    Transport(String),
}

/// A failure reported through `on_error`. Never returned from a call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    #[error("{message}")]
    WebSocket {
        message: String,
        cause: Option<ErrorCause>,
    },

    #[error("{message}")]
    Parse { message: String, cause: ErrorCause },

    #[error("{message}")]
    Agent {
        message: String,
        answer: Box<AragAnswer>,
    },
}

impl ChatError {
    pub(crate) fn websocket(error: impl fmt::Display) -> Self {
        ChatError::WebSocket {
            message: "chat websocket emitted an error".to_string(),
            cause: Some(ErrorCause::Transport(error.to_string())),
        }
    }

    #[cfg_attr(not(feature = "native"), allow(dead_code))]
    pub(crate) fn upgrade_rejected(status: u16) -> Self {
        ChatError::WebSocket {
            message: format!("chat websocket upgrade rejected with HTTP {status}"),
            cause: Some(ErrorCause::Upgrade { status }),
        }
    }

    pub(crate) fn parse(message: &str, cause: ErrorCause) -> Self {
        ChatError::Parse {
            message: message.to_string(),
            cause,
        }
    }

    pub(crate) fn agent(answer: AragAnswer) -> Self {
        let message = answer
            .exception_detail()
            .unwrap_or("agent returned an error")
            .to_string();
        ChatError::Agent {
            message,
            answer: Box::new(answer),
        }
    }

    pub fn kind(&self) -> ChatErrorKind {
        match self {
            ChatError::WebSocket { .. } => ChatErrorKind::WebSocket,
            ChatError::Parse { .. } => ChatErrorKind::Parse,
            ChatError::Agent { .. } => ChatErrorKind::Agent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ChatError::WebSocket { message, .. }
            | ChatError::Parse { message, .. }
            | ChatError::Agent { message, .. } => message,
        }
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        match self {
            ChatError::WebSocket { cause, .. } => cause.as_ref(),
            ChatError::Parse { cause, .. } => Some(cause),
            ChatError::Agent { .. } => None,
        }
    }

    pub fn answer(&self) -> Option<&AragAnswer> {
        match self {
            ChatError::Agent { answer, .. } => Some(&**answer),
            _ => None,
        }
    }

    /// HTTP status of a rejected upgrade. `None` for every other error.
    pub fn http_status(&self) -> Option<u16> {
        match self.cause() {
            Some(ErrorCause::Upgrade { status }) => Some(*status),
            _ => None,
        }
    }

    /// Text suitable for showing to a user: the agent's exception detail when
    /// there is one, otherwise the error message.
    pub fn detail(&self) -> &str {
        self.answer()
            .and_then(AragAnswer::exception_detail)
            .unwrap_or_else(|| self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_chat_types::AnswerOperation;

    #[test]
    fn agent_error_uses_exception_detail() {
        let answer = AragAnswer::decode(r#"{"operation":4,"exception":{"detail":"quota"}}"#)
            .unwrap();
        let err = ChatError::agent(answer.clone());
        assert_eq!(err.kind(), ChatErrorKind::Agent);
        assert_eq!(err.message(), "quota");
        assert_eq!(err.detail(), "quota");
        assert_eq!(err.answer(), Some(&answer));
        assert!(err.cause().is_none());
    }

    #[test]
    fn agent_error_falls_back_to_generic_message() {
        let err = ChatError::agent(AragAnswer::new(AnswerOperation::Error));
        assert_eq!(err.message(), "agent returned an error");
        assert_eq!(format!("{err}"), "agent returned an error");
    }

    #[test]
    fn websocket_error_carries_transport_cause() {
        let err = ChatError::websocket("connection reset");
        assert_eq!(err.kind(), ChatErrorKind::WebSocket);
        assert_eq!(
            err.cause(),
            Some(&ErrorCause::Transport("connection reset".into()))
        );
        assert!(err.answer().is_none());
    }

    #[test]
    fn rejected_upgrade_keeps_http_status() {
        let err = ChatError::upgrade_rejected(403);
        assert_eq!(err.kind(), ChatErrorKind::WebSocket);
        assert_eq!(err.http_status(), Some(403));
        assert_eq!(err.cause(), Some(&ErrorCause::Upgrade { status: 403 }));
        assert!(err.message().contains("403"));
        assert_eq!(ChatError::websocket("reset").http_status(), None);
    }

    #[test]
    fn kind_display_matches_wire_names() {
        assert_eq!(ChatErrorKind::WebSocket.to_string(), "websocket");
        assert_eq!(ChatErrorKind::Parse.to_string(), "parse");
        assert_eq!(ChatErrorKind::Agent.to_string(), "agent");
    }

    #[test]
    fn config_error_messages_are_descriptive() {
        let err = ConfigError::InvalidBackendUrl {
            url: "nope".into(),
            source: url::ParseError::RelativeUrlWithoutBase,
        };
        assert!(format!("{err}").contains("nope"));
        assert!(format!("{}", ConfigError::MissingKnowledgeBox).contains("knowledge box"));
    }
}
