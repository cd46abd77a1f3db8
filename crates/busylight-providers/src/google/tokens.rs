//! OAuth token file handling.
//!
//! The token file is written by whatever performed the original consent flow.
//! This module only reads it and writes back refreshed access tokens.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Seconds shaved off a reported lifetime so a token is refreshed before the
/// server starts rejecting it.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A cached OAuth token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(alias = "token")]
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default, alias = "expiry", deserialize_with = "deserialize_expiry")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenInfo {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    /// Returns true if the access token is expired at `now`.
    ///
    /// A token without an expiry is treated as valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Replaces the access token after a refresh at `now`.
    pub fn update_access_token(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        now: DateTime<Utc>,
    ) {
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs
            .map(|secs| now + Duration::seconds(secs) - Duration::seconds(EXPIRY_MARGIN_SECS));
    }
}

/// Reads an expiry, mapping Go's zero time (year 1) to "never expires".
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|at| at.year() > 1))
}

/// File-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the token file.
    pub fn load(&self) -> ProviderResult<TokenInfo> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read token file {}",
                self.path.display()
            ))
            .with_source(e)
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to parse token file {}",
                self.path.display()
            ))
            .with_source(e)
        })
    }

    /// Writes `tokens` atomically with owner-only permissions.
    pub fn save(&self, tokens: &TokenInfo) -> ProviderResult<()> {
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| ProviderError::internal("failed to serialize tokens").with_source(e))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(|e| {
            ProviderError::configuration("failed to write token file").with_source(e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::configuration("failed to replace token file").with_source(e)
        })?;

        debug!(path = %self.path.display(), "Saved refreshed token");
        Ok(())
    }
}
