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

pub mod answer;
pub mod callback;
pub mod interaction;

pub use answer::{AnswerDecodeError, AnswerOperation, AragAnswer};
pub use callback::Callback;
pub use interaction::{sanitize_headers, Headers, Interaction, InteractionOperation};

/// Session identifier for conversations not bound to a persisted session.
pub const EPHEMERAL_SESSION: &str = "ephemeral";

/// Close code used for every client-initiated close unless the caller picks one.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close reason sent when a cancellation signal ends the conversation.
pub const ABORTED_REASON: &str = "aborted";
