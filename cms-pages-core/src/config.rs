use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigurationError;

/// Default Content Delivery API host.
pub const DEFAULT_HOST: &str = "https://cdn.contentful.com";

/// Global plugin options, shared by every source file of a build.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PluginOptions {
    /// Delivery API access token. Required.
    #[serde(default)]
    pub access_token: Option<String>,
    /// API host, e.g. the preview API or a local mirror. Defaults to [`DEFAULT_HOST`].
    #[serde(default)]
    pub host: Option<String>,
    /// Upper bound on simultaneous fetches. `None` fetches every file at once.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl PluginOptions {
    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::default()
        }
    }

    /// The access token, or a [`ConfigurationError`] when absent or blank.
    pub fn require_access_token(&self) -> Result<&str, ConfigurationError> {
        match self.access_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(ConfigurationError::MissingAccessToken),
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn trace_loaded(&self) {
        info!(
            host = self.host(),
            has_access_token = self.access_token.is_some(),
            concurrency = ?self.concurrency,
            "Loaded PluginOptions"
        );
        debug!(?self, "PluginOptions loaded (full debug)");
    }
}

// The token never ends up in logs.
impl std::fmt::Debug for PluginOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginOptions")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}
