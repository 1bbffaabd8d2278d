//! Client configuration and credentials.
//!
//! # Design
//! `ClientConfig` is plain data consumed once when the [`ApiClient`] is
//! built. The base URL is fixed from then on; only the credential may
//! change afterwards, through the client's own rotation methods.
//!
//! Environment loading goes through `from_lookup` so tests can feed a map
//! instead of mutating the process environment.
//!
//! [`ApiClient`]: crate::client::ApiClient

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const ENV_API_URL: &str = "ERP_API_URL";
pub const ENV_API_KEY: &str = "ERP_API_KEY";
pub const ENV_TIMEOUT_SECS: &str = "ERP_API_TIMEOUT_SECS";

const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid value {value:?} for {var}: expected whole seconds")]
    InvalidTimeout { var: &'static str, value: String },

    #[error("failed to build HTTP engine: {0}")]
    Engine(#[from] reqwest::Error),
}

/// Authentication attached as a default header on every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// A key sent in a named header, e.g. `X-Api-Key`.
    ApiKey { header: String, key: String },
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential::Bearer(token.into())
    }

    pub fn api_key(header: impl Into<String>, key: impl Into<String>) -> Self {
        Credential::ApiKey {
            header: header.into(),
            key: key.into(),
        }
    }

    /// The header this credential contributes to a request.
    pub fn header(&self) -> (String, String) {
        match self {
            Credential::Bearer(token) => ("authorization".to_string(), format!("Bearer {token}")),
            Credential::ApiKey { header, key } => (header.to_ascii_lowercase(), key.clone()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Credential::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything needed to construct an API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub credential: Option<Credential>,
    /// Per-request timeout enforced by the transport. `None` waits forever.
    pub timeout: Option<Duration>,
    pub user_agent: String,
    /// Extra headers sent on every request. Per-call headers override them.
    pub default_headers: Vec<(String, String)>,
}

impl ClientConfig {
    /// Validate `base_url` and start from defaults.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            credential: None,
            timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: Vec::new(),
        })
    }

    /// Read `ERP_API_URL`, `ERP_API_KEY` and `ERP_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_API_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar(ENV_API_URL))?;
        let mut config = Self::new(&url)?;

        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            config.credential = Some(Credential::Bearer(key));
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidTimeout {
                var: ENV_TIMEOUT_SECS,
                value: raw.clone(),
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be used as a base".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("base URL must not carry a query or fragment".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_reads_all_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://erp.example.com"),
            (ENV_API_KEY, "secret"),
            (ENV_TIMEOUT_SECS, "15"),
        ]))
        .unwrap();
        assert_eq!(config.base_url.as_str(), "https://erp.example.com/");
        assert_eq!(config.credential, Some(Credential::bearer("secret")));
        assert_eq!(config.timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn from_lookup_requires_url() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_API_KEY, "secret")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ENV_API_URL)));
    }

    #[test]
    fn from_lookup_rejects_bad_timeout() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://erp.example.com"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));
    }

    #[test]
    fn base_url_must_be_http() {
        assert!(matches!(
            ClientConfig::new("ftp://erp.example.com"),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::new("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::new("https://erp.example.com/?tenant=1"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn credential_headers() {
        assert_eq!(
            Credential::bearer("abc").header(),
            ("authorization".to_string(), "Bearer abc".to_string())
        );
        assert_eq!(
            Credential::api_key("X-Api-Key", "k1").header(),
            ("x-api-key".to_string(), "k1".to_string())
        );
    }

    #[test]
    fn credential_debug_is_redacted() {
        let rendered = format!("{:?}", Credential::bearer("top-secret"));
        assert!(!rendered.contains("top-secret"));
        let rendered = format!("{:?}", Credential::api_key("X-Api-Key", "top-secret"));
        assert!(!rendered.contains("top-secret"));
    }
}
