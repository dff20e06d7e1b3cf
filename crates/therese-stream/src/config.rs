use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Configuration for reaching the THÉRÈSE backend.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Base URL of the backend (scheme, host and port, no trailing path).
    pub base_url: String,
    /// Overall request timeout, including the time spent streaming.
    pub timeout: Duration,
    /// Timeout for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Bounded frame buffer between the pump task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            stream_buffer_capacity: 128,
        }
    }
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().base_url(base_url)
    }

    /// Builds a config from the environment.
    ///
    /// - `THERESE_BACKEND_URL` (default `http://127.0.0.1:8000`)
    /// - `THERESE_TIMEOUT_SECS` (default 600)
    /// - `THERESE_CONNECT_TIMEOUT_SECS` (default 10)
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(url) = lookup("THERESE_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(secs) = parse_secs(&lookup, "THERESE_TIMEOUT_SECS")? {
            config.timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "THERESE_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = secs;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "backend url must start with http:// or https://, got {url:?}"
            )));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ClientError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|e| ClientError::Config(format!("invalid {key}={raw:?}: {e}")))
}
