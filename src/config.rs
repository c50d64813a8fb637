//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use session_store::default_data_dir;

use crate::reconciler::PartialReplyPolicy;

pub const DATA_DIR_ENV: &str = "CHAT_DATA_DIR";
pub const STREAM_ENV: &str = "CHAT_STREAM";
pub const PARTIAL_REPLIES_ENV: &str = "CHAT_PARTIAL_REPLIES";
pub const REQUEST_TIMEOUT_ENV: &str = "CHAT_REQUEST_TIMEOUT_SEC";

/// How replies are requested from the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    #[default]
    Streaming,
    SingleShot,
}

/// Session behaviour that does not belong in the persisted settings record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub response_mode: ResponseMode,
    pub partial_replies: PartialReplyPolicy,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub data_dir: PathBuf,
    pub response_mode: ResponseMode,
    pub partial_replies: PartialReplyPolicy,
    pub request_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let data_dir = env_string_opt(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env_string_opt("HOME").map(PathBuf::from);
                default_data_dir(home.as_deref())
            });

        let response_mode = match env_string_opt(STREAM_ENV).as_deref() {
            Some("0") => ResponseMode::SingleShot,
            _ => ResponseMode::Streaming,
        };

        let partial_replies = env_string_opt(PARTIAL_REPLIES_ENV)
            .and_then(|value| {
                let parsed = PartialReplyPolicy::parse(&value);
                if parsed.is_none() {
                    tracing::warn!(%value, "ignoring unknown {PARTIAL_REPLIES_ENV} value");
                }
                parsed
            })
            .unwrap_or_default();

        let request_timeout = env_string_opt(REQUEST_TIMEOUT_ENV)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs);

        Self {
            data_dir,
            response_mode,
            partial_replies,
            request_timeout,
        }
    }

    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            response_mode: self.response_mode,
            partial_replies: self.partial_replies,
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
