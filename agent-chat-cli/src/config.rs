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

use agent_chat_transport::ChatRepositoryConfig;
use agent_chat_types::Headers;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::cli_args::Connection;

/// Defaults read from `--config`.
///
/// ```yaml
/// backend_url: https://europe-1.rag.progress.cloud
/// knowledge_box_id: my-kb
/// token: eph-...
/// headers:
///   x-ndb-client: cli
/// ```
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub backend_url: Option<String>,
    pub knowledge_box_id: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub headers: Headers,
}

/// Everything needed to open one connection, after flags and file are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub repository: ChatRepositoryConfig,
    pub session_id: String,
    pub token: String,
    pub from_cursor: Option<u64>,
    pub headers: Option<Headers>,
}

impl ChatConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ChatConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }
}

impl Settings {
    pub fn load(args: &Connection) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => ChatConfig::from_file(path)?,
            None => ChatConfig::default(),
        };
        Self::merge(file, args)
    }

    /// Flags override the file. Headers are merged key by key.
    pub fn merge(file: ChatConfig, args: &Connection) -> anyhow::Result<Self> {
        let backend_url = args
            .backend_url
            .as_ref()
            .map(|url| url.to_string())
            .or(file.backend_url)
            .context("no backend URL: pass --backend-url or set backend_url in the config")?;
        let token = args
            .token
            .clone()
            .or(file.token)
            .context("no session token: pass --token or set token in the config")?;

        let mut headers = file.headers;
        for header in &args.headers {
            headers.insert(header.key.clone(), header.value.clone());
        }

        Ok(Settings {
            repository: ChatRepositoryConfig {
                backend_url,
                knowledge_box_id: args.knowledge_box.clone().or(file.knowledge_box_id),
            },
            session_id: args.session.clone(),
            token,
            from_cursor: args.from_cursor,
            headers: (!headers.is_empty()).then_some(headers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli_args::HeaderArg;

    fn args() -> Connection {
        Connection {
            config: None,
            backend_url: None,
            knowledge_box: None,
            session: "ephemeral".into(),
            token: None,
            from_cursor: None,
            headers: Vec::new(),
        }
    }

    fn file() -> ChatConfig {
        serde_yaml::from_str(
            "backend_url: https://file.example\nknowledge_box_id: kb-file\ntoken: file-token\nheaders:\n  a: from-file\n  b: from-file\n",
        )
        .unwrap()
    }

    #[test]
    fn file_supplies_defaults() {
        let settings = Settings::merge(file(), &args()).unwrap();
        assert_eq!(settings.repository.backend_url, "https://file.example");
        assert_eq!(
            settings.repository.knowledge_box_id.as_deref(),
            Some("kb-file")
        );
        assert_eq!(settings.token, "file-token");
        assert_eq!(settings.headers.unwrap().len(), 2);
    }

    #[test]
    fn flags_override_file() {
        let mut args = args();
        args.backend_url = Some("https://flag.example".parse().unwrap());
        args.knowledge_box = Some("kb-flag".into());
        args.token = Some("flag-token".into());
        args.headers = vec![HeaderArg {
            key: "a".into(),
            value: "from-flag".into(),
        }];

        let settings = Settings::merge(file(), &args).unwrap();
        assert_eq!(settings.repository.backend_url, "https://flag.example/");
        assert_eq!(
            settings.repository.knowledge_box_id.as_deref(),
            Some("kb-flag")
        );
        assert_eq!(settings.token, "flag-token");
        let headers = settings.headers.unwrap();
        assert_eq!(headers["a"], "from-flag");
        assert_eq!(headers["b"], "from-file");
    }

    #[test]
    fn missing_backend_or_token_is_an_error() {
        assert!(Settings::merge(ChatConfig::default(), &args()).is_err());

        let mut args = args();
        args.backend_url = Some("https://flag.example".parse().unwrap());
        let err = Settings::merge(ChatConfig::default(), &args).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn no_headers_means_none() {
        let mut args = args();
        args.backend_url = Some("https://flag.example".parse().unwrap());
        args.token = Some("t".into());
        let settings = Settings::merge(ChatConfig::default(), &args).unwrap();
        assert_eq!(settings.headers, None);
    }
}
