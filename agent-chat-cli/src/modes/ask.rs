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

use std::sync::{Arc, Mutex};

use agent_chat_cli::cli_args::Ask;
use agent_chat_cli::config::Settings;
use agent_chat_transport::{
    CancellationToken, ChatConnectOptions, ChatError, ChatHandlers, ChatRepository, CloseEvent,
};
use agent_chat_types::{AragAnswer, Callback};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Send one question and print answers until the agent reports `done`, the
/// socket closes, or the user hits ctrl-c.
pub async fn ask(args: Ask) -> anyhow::Result<()> {
    let settings = Settings::load(&args.connection)?;
    let repository = ChatRepository::new(settings.repository)?;

    let signal = CancellationToken::new();
    let done = Arc::new(Notify::new());
    let failure: Arc<Mutex<Option<ChatError>>> = Arc::new(Mutex::new(None));

    let handlers = ChatHandlers {
        on_open: Some(Callback::from(|_| info!("connected, waiting for the agent"))),
        on_answer: Some(Callback::from(move |answer: AragAnswer| {
            print_answer(&answer, args.raw)
        })),
        on_done: Some(Callback::from({
            let done = done.clone();
            move |_| done.notify_one()
        })),
        on_error: Some(Callback::from({
            let failure = failure.clone();
            move |error: ChatError| {
                eprintln!("{} error: {}", error.kind(), error.detail());
                if let Some(401 | 403) = error.http_status() {
                    eprintln!("the session token was rejected; request a fresh --token");
                }
                if let Ok(mut slot) = failure.lock() {
                    slot.get_or_insert(error);
                }
            }
        })),
        on_close: Some(Callback::from(|event: CloseEvent| {
            info!(
                "connection closed (code {}, reason '{}')",
                event.code, event.reason
            )
        })),
    };

    let connection = repository.connect(ChatConnectOptions {
        session_id: settings.session_id,
        token: settings.token,
        question: Some(args.question),
        headers: settings.headers,
        from_cursor: settings.from_cursor,
        signal: Some(signal.clone()),
        handlers,
        ..Default::default()
    })?;

    tokio::select! {
        _ = connection.closed() => {}
        _ = done.notified() => {
            connection.close(None, None);
            connection.closed().await;
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, aborting the conversation");
            signal.cancel();
            connection.closed().await;
        }
    }

    let failure = failure.lock().ok().and_then(|mut slot| slot.take());
    match failure {
        Some(error) => Err(anyhow::anyhow!(error)),
        None => Ok(()),
    }
}

fn print_answer(answer: &AragAnswer, raw: bool) {
    if raw {
        match serde_json::to_string(answer) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("failed to encode answer: {e}"),
        }
        return;
    }
    match answer.get("answer").and_then(|value| value.as_str()) {
        Some(text) if !text.is_empty() => println!("{text}"),
        _ => debug!("{:?} frame without answer text", answer.operation),
    }
}
