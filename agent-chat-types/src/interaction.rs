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

//! Outbound interaction frames (client → agent).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller-supplied headers merged into a question frame.
pub type Headers = BTreeMap<String, String>;

/// Operation code carried by every outbound frame.
///
/// Serialized as its integer code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteractionOperation {
    Question,
    Quit,
}

impl InteractionOperation {
    pub fn code(self) -> u8 {
        match self {
            InteractionOperation::Question => 0,
            InteractionOperation::Quit => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(InteractionOperation::Question),
            1 => Some(InteractionOperation::Quit),
            _ => None,
        }
    }
}

impl Serialize for InteractionOperation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for InteractionOperation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        InteractionOperation::from_code(code).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown interaction operation {code}"))
        })
    }
}

/// A single outbound unit of conversation input.
///
/// `headers` is never serialized as an empty object: the constructors run the
/// map through [`sanitize_headers`] and leave the field out when nothing
/// survives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub question: String,
    pub operation: InteractionOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
}

impl Interaction {
    pub fn question(text: impl Into<String>, headers: Option<Headers>) -> Self {
        Self {
            question: text.into(),
            operation: InteractionOperation::Question,
            headers: sanitize_headers(headers),
        }
    }

    pub fn quit() -> Self {
        Self {
            question: String::new(),
            operation: InteractionOperation::Quit,
            headers: None,
        }
    }

    /// Serialize to the JSON text frame sent on the wire.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Drop entries with an empty key. Returns `None` when the result is empty.
pub fn sanitize_headers(headers: Option<Headers>) -> Option<Headers> {
    let headers: Headers = headers?
        .into_iter()
        .filter(|(key, _)| !key.is_empty())
        .collect();
    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}
