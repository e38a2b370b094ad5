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

//! Inbound answer records (agent → client).
//!
//! The agent owns the record schema. Only `operation` is interpreted here;
//! every other field is kept verbatim so the record reaches the caller
//! unmodified.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Discriminant of an inbound answer frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerOperation {
    /// In-progress answer content.
    Answer,
    Quit,
    /// The agent started working on a question.
    Start,
    /// The turn is complete.
    Done,
    /// The agent failed; details live in `exception.detail`.
    Error,
    /// The agent asks the user for feedback before continuing.
    AgentRequest,
    /// A numeric code this client does not know about.
    Unknown(Number),
}

impl AnswerOperation {
    pub fn code(&self) -> Option<u8> {
        match self {
            AnswerOperation::Answer => Some(0),
            AnswerOperation::Quit => Some(1),
            AnswerOperation::Start => Some(2),
            AnswerOperation::Done => Some(3),
            AnswerOperation::Error => Some(4),
            AnswerOperation::AgentRequest => Some(5),
            AnswerOperation::Unknown(_) => None,
        }
    }

    pub fn from_number(number: &Number) -> Self {
        // JSON has one number type; `3.0` names the same operation as `3`.
        let code = number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        });
        match code {
            Some(0) => AnswerOperation::Answer,
            Some(1) => AnswerOperation::Quit,
            Some(2) => AnswerOperation::Start,
            Some(3) => AnswerOperation::Done,
            Some(4) => AnswerOperation::Error,
            Some(5) => AnswerOperation::AgentRequest,
            _ => AnswerOperation::Unknown(number.clone()),
        }
    }
}

impl From<u8> for AnswerOperation {
    fn from(code: u8) -> Self {
        AnswerOperation::from_number(&Number::from(code))
    }
}

impl Serialize for AnswerOperation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnswerOperation::Unknown(number) => number.serialize(serializer),
            known => serializer.serialize_u8(known.code().unwrap_or_default()),
        }
    }
}

impl<'de> Deserialize<'de> for AnswerOperation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = Number::deserialize(deserializer)?;
        Ok(AnswerOperation::from_number(&number))
    }
}

/// An inbound answer record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AragAnswer {
    pub operation: AnswerOperation,
    /// Every field other than `operation`, untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Why an inbound payload could not become an [`AragAnswer`].
#[derive(Debug, Error)]
pub enum AnswerDecodeError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    /// Valid JSON, but not an object with a numeric `operation`.
    #[error("payload is not an answer record")]
    Shape(Value),
}

impl AragAnswer {
    pub fn new(operation: AnswerOperation) -> Self {
        Self {
            operation,
            fields: Map::new(),
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, AnswerDecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Shape-check an already parsed value.
    pub fn from_value(value: Value) -> Result<Self, AnswerDecodeError> {
        let Value::Object(mut fields) = value else {
            return Err(AnswerDecodeError::Shape(value));
        };
        let operation = match fields.get("operation") {
            Some(Value::Number(number)) => AnswerOperation::from_number(number),
            _ => return Err(AnswerDecodeError::Shape(Value::Object(fields))),
        };
        fields.remove("operation");
        Ok(Self { operation, fields })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// `exception.detail`, when the agent sent one as a string.
    pub fn exception_detail(&self) -> Option<&str> {
        self.fields
            .get("exception")
            .and_then(|exception| exception.get("detail"))
            .and_then(Value::as_str)
    }

    pub fn is_done(&self) -> bool {
        self.operation == AnswerOperation::Done
    }

    pub fn is_error(&self) -> bool {
        self.operation == AnswerOperation::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_operation_and_keeps_other_fields() {
        let answer =
            AragAnswer::decode(r#"{"operation":0,"answer":"hello","step":{"module":"ask"}}"#)
                .unwrap();
        assert_eq!(answer.operation, AnswerOperation::Answer);
        assert_eq!(answer.get("answer"), Some(&json!("hello")));
        assert_eq!(answer.get("step"), Some(&json!({"module": "ask"})));
        assert!(answer.get("operation").is_none());
    }

    #[test]
    fn unknown_numeric_code_still_decodes() {
        let answer = AragAnswer::decode(r#"{"operation":42}"#).unwrap();
        assert_eq!(answer.operation, AnswerOperation::Unknown(Number::from(42)));
        assert_eq!(answer.operation.code(), None);
    }

    #[test]
    fn integral_float_code_maps_to_known_operation() {
        let answer = AragAnswer::decode(r#"{"operation":3.0}"#).unwrap();
        assert!(answer.is_done());
    }

    #[test]
    fn non_json_is_a_syntax_error() {
        let err = AragAnswer::decode("not json").unwrap_err();
        assert!(matches!(err, AnswerDecodeError::Syntax(_)));
    }

    #[test]
    fn missing_or_non_numeric_operation_is_a_shape_error() {
        for raw in [
            r#"{"answer":"x"}"#,
            r#"{"operation":"3"}"#,
            r#"[1,2,3]"#,
            r#"null"#,
        ] {
            match AragAnswer::decode(raw) {
                Err(AnswerDecodeError::Shape(value)) => {
                    assert_eq!(value, serde_json::from_str::<Value>(raw).unwrap());
                }
                other => panic!("expected shape error for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn exception_detail_is_read_leniently() {
        let answer =
            AragAnswer::decode(r#"{"operation":4,"exception":{"detail":"boom"}}"#).unwrap();
        assert!(answer.is_error());
        assert_eq!(answer.exception_detail(), Some("boom"));

        let answer = AragAnswer::decode(r#"{"operation":4,"exception":"boom"}"#).unwrap();
        assert_eq!(answer.exception_detail(), None);
    }

    #[test]
    fn serializes_back_to_the_same_record() {
        let raw = json!({"operation": 3, "context": {"id": 1}});
        let answer = AragAnswer::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&answer).unwrap(), raw);
    }
}
