//! Provider configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const ACCESS_TOKEN_ENV: &str = "MEROXA_ACCESS_TOKEN";
pub const REFRESH_TOKEN_ENV: &str = "MEROXA_REFRESH_TOKEN";
pub const API_URL_ENV: &str = "MEROXA_API_URL";
pub const TIMEOUT_ENV: &str = "MEROXA_TIMEOUT";
pub const DEBUG_ENV: &str = "MEROXA_DEBUG";

/// Bounds of one asynchronous-readiness wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Overall wait budget.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Wait before the first read.
    #[serde(with = "duration_secs")]
    pub delay: Duration,
    /// Lower bound between two reads.
    #[serde(with = "duration_secs")]
    pub min_interval: Duration,
    /// Upper bound of random time added to each interval.
    #[serde(with = "duration_secs")]
    pub jitter: Duration,
    /// Retry transient read failures inside the wait budget. Ignored when
    /// the client already retries on its own.
    pub retry_transient: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::resource()
    }
}

impl PollSettings {
    /// Data resources take minutes to provision.
    #[must_use]
    pub const fn resource() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            delay: Duration::from_secs(30),
            min_interval: Duration::from_secs(30),
            jitter: Duration::ZERO,
            retry_transient: true,
        }
    }

    /// Connectors start faster and are polled more often.
    #[must_use]
    pub const fn connector() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            delay: Duration::from_secs(5),
            min_interval: Duration::from_secs(5),
            jitter: Duration::ZERO,
            retry_transient: true,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub const fn with_retry_transient(mut self, retry: bool) -> Self {
        self.retry_transient = retry;
        self
    }

    /// Check the bounds are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero interval or a timeout
    /// shorter than the initial delay.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.min_interval.is_zero() {
            return Err(Error::invalid_config(format!(
                "{name}.min_interval must be greater than zero"
            )));
        }
        if self.timeout < self.delay {
            return Err(Error::invalid_config(format!(
                "{name}.timeout ({:?}) is shorter than {name}.delay ({:?})",
                self.timeout, self.delay
            )));
        }
        Ok(())
    }
}

/// Configuration of the provider: API credentials and poll bounds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub api_url: Option<String>,
    /// Log observed state (sensitive attributes redacted).
    pub debug: bool,
    /// HTTP client timeout in seconds.
    pub timeout: Option<u64>,
    pub resource_poll: PollSettings,
    pub connector_poll: PollSettings,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            refresh_token: None,
            api_url: None,
            debug: false,
            timeout: None,
            resource_poll: PollSettings::resource(),
            connector_poll: PollSettings::connector(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .field("resource_poll", &self.resource_poll)
            .field("connector_poll", &self.connector_poll)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a config with the given access token.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: token.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn resource_poll(mut self, settings: PollSettings) -> Self {
        self.resource_poll = settings;
        self
    }

    #[must_use]
    pub fn connector_poll(mut self, settings: PollSettings) -> Self {
        self.connector_poll = settings;
        self
    }

    /// Enable debug mode.
    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Load configuration from `MEROXA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `MEROXA_TIMEOUT` is not a
    /// number of seconds.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the timeout is not a number of
    /// seconds.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(token) = lookup(ACCESS_TOKEN_ENV) {
            config.access_token = token;
        }
        config.refresh_token = lookup(REFRESH_TOKEN_ENV).filter(|t| !t.is_empty());
        config.api_url = lookup(API_URL_ENV).filter(|u| !u.is_empty());

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let secs = raw.trim().parse().map_err(|_| {
                Error::invalid_config(format!("{TIMEOUT_ENV} must be a number of seconds, got '{raw}'"))
            })?;
            config.timeout = Some(secs);
        }

        if let Some(flag) = lookup(DEBUG_ENV) {
            config.debug = matches!(flag.to_lowercase().as_str(), "1" | "true" | "on");
        }

        Ok(config)
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the document does not parse.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::invalid_config(format!("failed to parse config: {e}")))
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty access token, an API URL
    /// without scheme, or unusable poll bounds.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(Error::invalid_config(format!(
                "access_token is required (set {ACCESS_TOKEN_ENV})"
            )));
        }
        if let Some(api_url) = &self.api_url {
            Url::parse(api_url)
                .map_err(|e| Error::invalid_config(format!("api_url '{api_url}': {e}")))?;
        }
        self.resource_poll.validate("resource_poll")?;
        self.connector_poll.validate("connector_poll")
    }
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_poll_bounds() {
        let config = ProviderConfig::default();
        assert_eq!(config.resource_poll.timeout, Duration::from_secs(600));
        assert_eq!(config.resource_poll.min_interval, Duration::from_secs(30));
        assert_eq!(config.connector_poll.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_from_lookup_reads_meroxa_variables() {
        let config = ProviderConfig::from_lookup(env(&[
            (ACCESS_TOKEN_ENV, "tok"),
            (REFRESH_TOKEN_ENV, "refresh"),
            (API_URL_ENV, "https://api.meroxa.io/v1"),
            (TIMEOUT_ENV, "15"),
            (DEBUG_ENV, "ON"),
        ]))
        .unwrap();

        assert_eq!(config.access_token, "tok");
        assert_eq!(config.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(config.timeout, Some(15));
        assert!(config.debug);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_lookup_rejects_bad_timeout() {
        let err = ProviderConfig::from_lookup(env(&[(TIMEOUT_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_validate_requires_access_token() {
        assert!(ProviderConfig::default().validate().is_err());
        assert!(ProviderConfig::with_access_token("t").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_url_without_scheme() {
        let mut config = ProviderConfig::with_access_token("t");
        config.api_url = Some("api.meroxa.io".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = ProviderConfig::with_access_token("t")
            .connector_poll(PollSettings::connector().with_min_interval(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_str_overrides_poll_bounds() {
        let config = ProviderConfig::from_toml_str(
            r#"
            access_token = "tok"
            debug = true

            [resource_poll]
            timeout = 120
            delay = 10
            min_interval = 10
            "#,
        )
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.resource_poll.timeout, Duration::from_secs(120));
        assert!(config.resource_poll.retry_transient);
        assert_eq!(config.connector_poll, PollSettings::connector());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let config = ProviderConfig::with_access_token("super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
