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

use agent_chat_cli::cli_args::Connection;
use agent_chat_cli::config::Settings;
use agent_chat_transport::ChatRepository;

pub fn print_url(args: Connection) -> anyhow::Result<()> {
    let settings = Settings::load(&args)?;
    let repository = ChatRepository::new(settings.repository)?;
    let url = repository.build_socket_url(
        &settings.session_id,
        &settings.token,
        None,
        settings.from_cursor,
    )?;
    println!("{url}");
    Ok(())
}
