//! Twitter stream configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TwitterError, TwitterResult};

/// Configuration for a filter stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// OAuth 1.0a Consumer Key (API Key)
    pub consumer_key: String,

    /// OAuth 1.0a Consumer Secret (API Secret)
    pub consumer_secret: String,

    /// OAuth 1.0a Access Token
    pub access_token: String,

    /// OAuth 1.0a Access Token Secret
    pub access_token_secret: String,

    /// Comma-separated phrases to filter the stream by
    #[serde(default)]
    pub track: String,

    /// Base URL of the streaming API (default: https://stream.twitter.com)
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Path of the filter endpoint
    #[serde(default = "default_filter_path")]
    pub filter_path: String,

    /// TCP/TLS connect timeout. The stream itself has no read timeout.
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,
}

fn default_stream_url() -> String {
    "https://stream.twitter.com".into()
}

fn default_filter_path() -> String {
    "/1.1/statuses/filter.json".into()
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
            track: String::new(),
            stream_url: default_stream_url(),
            filter_path: default_filter_path(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl TwitterConfig {
    /// Full URL of the filter endpoint.
    #[must_use]
    pub fn filter_url(&self) -> String {
        format!("{}{}", self.stream_url.trim_end_matches('/'), self.filter_path)
    }

    /// Check that every credential is present.
    pub fn validate(&self) -> TwitterResult<()> {
        let required = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("access_token", &self.access_token),
            ("access_token_secret", &self.access_token_secret),
        ];

        for (name, value) in required {
            if value.is_empty() {
                return Err(TwitterError::Config(format!("{name} is required")));
            }
        }
        Ok(())
    }

    /// Merge a partial update.
    ///
    /// Consumer credentials are bound to the transport when the stream is
    /// built and stay as they are; the names of ignored fields are returned.
    pub fn merge(&mut self, update: ParamsUpdate) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if update.consumer_key.is_some() {
            ignored.push("consumer_key");
        }
        if update.consumer_secret.is_some() {
            ignored.push("consumer_secret");
        }

        if let Some(token) = update.access_token {
            self.access_token = token;
        }
        if let Some(secret) = update.access_token_secret {
            self.access_token_secret = secret;
        }
        if let Some(track) = update.track {
            self.track = track;
        }
        ignored
    }
}

/// Partial parameter update for [`crate::TwitterStream::change_params`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsUpdate {
    /// Ignored after construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_key: Option<String>,

    /// Ignored after construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

impl ParamsUpdate {
    /// Update only the track filter.
    #[must_use]
    pub fn track(track: impl Into<String>) -> Self {
        Self {
            track: Some(track.into()),
            ..Self::default()
        }
    }
}
