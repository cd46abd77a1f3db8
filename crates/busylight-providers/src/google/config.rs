//! Google free/busy source configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};

/// OAuth 2.0 client credentials from the Google Cloud Console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Shape of the credentials JSON: either nested under `installed`/`web`, or
/// flat with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a downloaded client JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read credentials file {}",
                path.display()
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration("failed to parse credentials JSON").with_source(e)
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(ProviderError::configuration(
            "credentials file must contain an 'installed'/'web' section or root-level 'client_id'/'client_secret'",
        ))
    }

    /// Checks that neither field is empty.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.client_id.is_empty() {
            return Err(ProviderError::configuration("client_id is required"));
        }
        if self.client_secret.is_empty() {
            return Err(ProviderError::configuration("client_secret is required"));
        }
        Ok(())
    }
}

/// Configuration for [`GoogleFreeBusySource`](super::GoogleFreeBusySource).
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,
    /// Cached token JSON, produced out of band and refreshed in place.
    pub token_path: PathBuf,
    /// HTTP timeout per request.
    pub timeout: Duration,
    pub api_base: String,
    pub token_url: String,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";
    pub const DEFAULT_TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    pub fn new(credentials: OAuthCredentials, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            token_path: token_path.into(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            token_url: Self::DEFAULT_TOKEN_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn validate(&self) -> ProviderResult<()> {
        self.credentials.validate()?;
        if self.timeout.is_zero() {
            return Err(ProviderError::configuration("timeout must be non-zero"));
        }
        Ok(())
    }
}
