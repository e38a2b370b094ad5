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

//! Chat repository configuration and socket URL construction.

use agent_chat_types::EPHEMERAL_SESSION;
use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Characters left alone when encoding a single path segment. Everything
/// else outside `[A-Za-z0-9]` is percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Query parameter carrying the short-lived session credential.
pub const TOKEN_PARAM: &str = "eph-token";

/// Query parameter carrying the replay cursor.
pub const CURSOR_PARAM: &str = "from_cursor";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRepositoryConfig {
    /// Backend origin, e.g. `https://europe-1.rag.progress.cloud`.
    pub backend_url: String,
    /// Knowledge box used when `connect` does not name one.
    #[serde(default)]
    pub knowledge_box_id: Option<String>,
}

/// Entry point for opening chat sessions against one backend.
///
/// Cheap to clone. Each [`connect`](Self::connect) call owns its own socket.
#[derive(Debug, Clone)]
pub struct ChatRepository {
    backend_url: Url,
    knowledge_box_id: Option<String>,
}

impl ChatRepository {
    /// Validate the configuration.
    ///
    /// Fails when the backend URL is empty or does not parse; these are
    /// programmer errors and are never deferred to connection time.
    pub fn new(config: ChatRepositoryConfig) -> Result<Self, ConfigError> {
        let raw = config.backend_url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingBackendUrl);
        }
        let backend_url = Url::parse(raw).map_err(|source| ConfigError::InvalidBackendUrl {
            url: raw.to_string(),
            source,
        })?;
        Ok(Self {
            backend_url,
            knowledge_box_id: config.knowledge_box_id,
        })
    }

    pub fn backend_url(&self) -> &Url {
        &self.backend_url
    }

    pub fn knowledge_box_id(&self) -> Option<&str> {
        self.knowledge_box_id.as_deref()
    }

    /// An explicit override wins over the configured default. An empty
    /// identifier counts as missing.
    fn resolve_knowledge_box<'a>(
        &'a self,
        requested: Option<&'a str>,
    ) -> Result<&'a str, ConfigError> {
        match requested.or(self.knowledge_box_id.as_deref()) {
            Some(kb) if !kb.is_empty() => Ok(kb),
            _ => Err(ConfigError::MissingKnowledgeBox),
        }
    }

    /// Build the WebSocket endpoint for a session:
    ///
    /// `{origin}/api/v1/kb/{kb}/agent/session/{session|ephemeral}/ws?eph-token={token}[&from_cursor={n}]`
    ///
    /// `http` becomes `ws` and `https` becomes `wss`; other schemes are kept.
    /// `from_cursor` is only added when a cursor is given, so `Some(0)` and
    /// `None` produce different URLs.
    pub fn build_socket_url(
        &self,
        session_id: &str,
        token: &str,
        knowledge_box_id: Option<&str>,
        from_cursor: Option<u64>,
    ) -> Result<Url, ConfigError> {
        let knowledge_box = self.resolve_knowledge_box(knowledge_box_id)?;
        let session = if session_id == EPHEMERAL_SESSION {
            EPHEMERAL_SESSION.to_string()
        } else {
            encode_segment(session_id)
        };
        let path = format!(
            "/api/v1/kb/{}/agent/session/{session}/ws",
            encode_segment(knowledge_box)
        );

        let mut url =
            self.backend_url
                .join(&path)
                .map_err(|source| ConfigError::InvalidBackendUrl {
                    url: self.backend_url.to_string(),
                    source,
                })?;

        rewrite_scheme(&mut url)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair(TOKEN_PARAM, token);
            if let Some(cursor) = from_cursor {
                query.append_pair(CURSOR_PARAM, &cursor.to_string());
            }
        }

        debug!(
            "chat socket url for session '{session_id}' in kb '{knowledge_box}': {}",
            redact_token(&url)
        );
        Ok(url)
    }
}

/// `http` becomes `ws` and `https` becomes `wss`; other schemes are kept.
fn rewrite_scheme(url: &mut Url) -> Result<(), ConfigError> {
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return Ok(()),
    };
    url.set_scheme(scheme)
        .map_err(|()| ConfigError::SchemeRewrite {
            url: url.to_string(),
            scheme,
        })
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// The URL with the credential value hidden, for logs.
pub(crate) fn redact_token(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == TOKEN_PARAM {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(origin: &str) -> ChatRepository {
        ChatRepository::new(ChatRepositoryConfig {
            backend_url: origin.into(),
            knowledge_box_id: Some("kb-1".into()),
        })
        .unwrap()
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn rejects_missing_backend_url() {
        for backend_url in ["", "   "] {
            let err = ChatRepository::new(ChatRepositoryConfig {
                backend_url: backend_url.into(),
                knowledge_box_id: None,
            })
            .unwrap_err();
            assert_eq!(err, ConfigError::MissingBackendUrl);
        }
    }

    #[test]
    fn rejects_unparseable_backend_url() {
        let err = ChatRepository::new(ChatRepositoryConfig {
            backend_url: "not a url".into(),
            knowledge_box_id: None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBackendUrl { .. }));
    }

    #[test]
    fn builds_full_url_shape() {
        let url = repo("https://x.example")
            .build_socket_url("abc", "t", None, None)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://x.example/api/v1/kb/kb-1/agent/session/abc/ws?eph-token=t"
        );
    }

    #[test]
    fn rewrites_scheme() {
        let secure = repo("https://x").build_socket_url("s", "t", None, None).unwrap();
        assert_eq!(secure.scheme(), "wss");
        let plain = repo("http://x").build_socket_url("s", "t", None, None).unwrap();
        assert_eq!(plain.scheme(), "ws");
        let other = repo("ws://x").build_socket_url("s", "t", None, None).unwrap();
        assert_eq!(other.scheme(), "ws");
    }

    #[test]
    fn rewrite_scheme_maps_http_family_only() {
        let mut secure = Url::parse("https://x/a?b=1").unwrap();
        rewrite_scheme(&mut secure).unwrap();
        assert_eq!(secure.as_str(), "wss://x/a?b=1");

        let mut plain = Url::parse("http://x:8080/").unwrap();
        rewrite_scheme(&mut plain).unwrap();
        assert_eq!(plain.as_str(), "ws://x:8080/");

        let mut other = Url::parse("ftp://x/").unwrap();
        rewrite_scheme(&mut other).unwrap();
        assert_eq!(other.scheme(), "ftp");
    }

    #[test]
    fn percent_encodes_session_and_knowledge_box() {
        let url = repo("https://x")
            .build_socket_url("a b/c?d", "t", Some("kb/é"), None)
            .unwrap();
        assert_eq!(
            url.path(),
            "/api/v1/kb/kb%2F%C3%A9/agent/session/a%20b%2Fc%3Fd/ws"
        );
    }

    #[test]
    fn session_segment_equals_component_encoding() {
        for session in ["abc", "7f3c-11ee", "with space", "x+y=z", "it's(ok)!*~"] {
            let url = repo("https://x")
                .build_socket_url(session, "t", None, None)
                .unwrap();
            let segments: Vec<&str> = url.path_segments().unwrap().collect();
            assert_eq!(segments[6], encode_segment(session), "session {session}");
        }
    }

    #[test]
    fn ephemeral_session_uses_literal_segment() {
        let url = repo("https://x")
            .build_socket_url(EPHEMERAL_SESSION, "t", None, None)
            .unwrap();
        assert_eq!(url.path(), "/api/v1/kb/kb-1/agent/session/ephemeral/ws");
    }

    #[test]
    fn cursor_absent_vs_zero() {
        let repo = repo("https://x");
        let without = repo.build_socket_url("abc", "tok", None, None).unwrap();
        assert_eq!(query(&without, CURSOR_PARAM), None);

        let zero = repo.build_socket_url("abc", "tok", None, Some(0)).unwrap();
        assert_eq!(query(&zero, CURSOR_PARAM).as_deref(), Some("0"));

        let later = repo.build_socket_url("abc", "tok", None, Some(42)).unwrap();
        assert_eq!(query(&later, CURSOR_PARAM).as_deref(), Some("42"));
    }

    #[test]
    fn token_travels_in_query() {
        let url = repo("https://x")
            .build_socket_url("abc", "a+b/c=", None, None)
            .unwrap();
        assert_eq!(query(&url, TOKEN_PARAM).as_deref(), Some("a+b/c="));
    }

    #[test]
    fn override_wins_over_default_knowledge_box() {
        let url = repo("https://x")
            .build_socket_url("abc", "t", Some("other"), None)
            .unwrap();
        assert!(url.path().starts_with("/api/v1/kb/other/"));
    }

    #[test]
    fn missing_knowledge_box_is_an_error() {
        let repo = ChatRepository::new(ChatRepositoryConfig {
            backend_url: "https://x".into(),
            knowledge_box_id: None,
        })
        .unwrap();
        assert_eq!(
            repo.build_socket_url("abc", "t", None, None).unwrap_err(),
            ConfigError::MissingKnowledgeBox
        );
        assert_eq!(
            repo.build_socket_url("abc", "t", Some(""), None).unwrap_err(),
            ConfigError::MissingKnowledgeBox
        );
    }

    #[test]
    fn origin_path_and_query_are_replaced() {
        let url = repo("https://x/some/prefix?debug=1")
            .build_socket_url("abc", "t", None, None)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://x/api/v1/kb/kb-1/agent/session/abc/ws?eph-token=t"
        );
    }

    #[test]
    fn redacts_token_for_logging() {
        let url = repo("https://x")
            .build_socket_url("abc", "secret", None, Some(3))
            .unwrap();
        let redacted = redact_token(&url);
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("from_cursor=3"));
    }

    #[test]
    fn config_deserializes_without_knowledge_box() {
        let config: ChatRepositoryConfig =
            serde_json::from_str(r#"{"backend_url":"https://x"}"#).unwrap();
        assert_eq!(config.knowledge_box_id, None);
    }
}
