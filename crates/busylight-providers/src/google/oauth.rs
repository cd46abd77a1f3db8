//! Access token refresh.

use serde::Deserialize;
use tracing::info;

use super::client::{read_body, send_error};
use super::config::OAuthCredentials;
use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges refresh tokens for new access tokens.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http_client: reqwest::Client,
    credentials: OAuthCredentials,
    token_url: String,
}

impl OAuthClient {
    pub fn new(
        http_client: reqwest::Client,
        credentials: OAuthCredentials,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            credentials,
            token_url: token_url.into(),
        }
    }

    /// Refreshes an access token.
    ///
    /// Returns the new access token and its lifetime in seconds, if reported.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| send_error("token refresh", e))?;

        let status = response.status();
        let body = read_body(response).await?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "token refresh failed ({status}): {body}"
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response("invalid token response").with_source(e)
        })?;

        info!(expires_in = ?token.expires_in, "Refreshed access token");
        Ok((token.access_token, token.expires_in))
    }
}
