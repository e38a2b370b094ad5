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

use std::path::PathBuf;
use std::str::FromStr;

use agent_chat_types::EPHEMERAL_SESSION;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use url::Url;

/// Agent Chat CLI
///
/// Opens a chat session against a retrieval agent backend, sends one question
/// and streams the answers to stdout until the agent is done.
#[derive(Parser, Debug)]
#[clap(name = "agent-chat")]
pub struct Opt {
    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Ask a question and print the agent's answers.
    Ask(Ask),

    /// Print the socket URL a session would connect to.
    Url(Connection),
}

#[derive(Args, Debug, Clone)]
pub struct Ask {
    #[clap(flatten)]
    pub connection: Connection,

    /// The question to send once the socket opens.
    pub question: String,

    /// Print every answer frame as JSON instead of only the answer text.
    #[clap(long = "raw")]
    pub raw: bool,
}

#[derive(Args, Debug, Clone)]
pub struct Connection {
    /// YAML file with defaults for the flags below. Flags win.
    #[clap(long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Backend origin, e.g. https://europe-1.rag.progress.cloud
    #[clap(long = "backend-url")]
    pub backend_url: Option<Url>,

    #[clap(long = "knowledge-box", short = 'k')]
    pub knowledge_box: Option<String>,

    /// Persisted session id. Omit for a throwaway conversation.
    #[clap(long = "session", short = 's', default_value = EPHEMERAL_SESSION)]
    pub session: String,

    /// Short-lived session token.
    #[clap(long = "token", short = 't')]
    pub token: Option<String>,

    /// Replay the session from this cursor.
    #[clap(long = "from-cursor")]
    pub from_cursor: Option<u64>,

    /// Extra header sent with the question, as KEY=VALUE. Repeatable.
    #[clap(long = "header", short = 'H')]
    pub headers: Vec<HeaderArg>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderArg {
    pub key: String,
    pub value: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseHeaderError {
    #[error("header '{0}' must look like KEY=VALUE")]
    MissingSeparator(String),
    #[error("header '{0}' has an empty key")]
    EmptyKey(String),
}

impl FromStr for HeaderArg {
    type Err = ParseHeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| ParseHeaderError::MissingSeparator(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseHeaderError::EmptyKey(s.to_string()));
        }
        Ok(HeaderArg {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
