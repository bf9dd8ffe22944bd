//! Client configuration.

use std::time::Duration;

use reqwest::Url;

use crate::error::{OverleafError, Result};

/// Default Overleaf instance.
pub const DEFAULT_BASE_URL: &str = "https://www.overleaf.com";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(16);

/// Connection settings shared by every request of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the Overleaf instance, without trailing slash.
    pub base_url: String,
    /// Timeout applied to each HTTP request and each socket read.
    pub timeout: Duration,
    /// Optional proxy URL (e.g. "http://proxy:8080").
    pub proxy: Option<String>,
    /// Verify TLS certificates. Only disable for self-hosted test instances.
    pub ssl_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            ssl_verify: true,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from `OVERLEAF_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// - `OVERLEAF_URL` - base URL
    /// - `OVERLEAF_PROXY` - proxy URL
    /// - `OVERLEAF_TIMEOUT_SECS` - timeout in seconds
    /// - `OVERLEAF_INSECURE` - `1`/`true` disables TLS verification
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup("OVERLEAF_URL") {
            config = config.with_base_url(&url);
        }
        if let Some(proxy) = lookup("OVERLEAF_PROXY") {
            if !proxy.is_empty() {
                config.proxy = Some(proxy);
            }
        }
        if let Some(secs) = lookup("OVERLEAF_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                OverleafError::Custom(format!("Invalid OVERLEAF_TIMEOUT_SECS: {}", secs))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("OVERLEAF_INSECURE") {
            config.ssl_verify = !matches!(flag.trim(), "1" | "true" | "yes");
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the base URL (trailing slashes are stripped).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_string());
        self
    }

    pub fn with_ssl_verify(mut self, verify: bool) -> Self {
        self.ssl_verify = verify;
        self
    }

    /// Check that the base URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| OverleafError::Custom(format!("Invalid base URL: {}", e)))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(OverleafError::Custom(format!(
                    "Unsupported URL scheme: {}",
                    other
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(OverleafError::Custom("Base URL has no host".to_string()));
        }
        Ok(())
    }

    /// Host name of the instance, used to filter cookies.
    pub fn host(&self) -> Result<String> {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .ok_or_else(|| OverleafError::Custom(format!("Invalid base URL: {}", self.base_url)))
    }

    /// Base URL with the WebSocket scheme (`wss://` for https).
    pub(crate) fn websocket_base(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        }
    }
}
