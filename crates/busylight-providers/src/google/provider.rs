//! [`CalendarSource`] implementation backed by the Google freeBusy API.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::client::FreeBusyClient;
use super::config::GoogleConfig;
use super::oauth::OAuthClient;
use super::tokens::{TokenInfo, TokenStorage};
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{BoxFuture, CalendarSource, FreeBusyQuery, FreeBusyResponse};

const NAME: &str = "google";

/// Google free/busy source.
///
/// The token file is re-read on every query, so a token replaced on disk by
/// another tool is picked up without restarting the daemon.
#[derive(Debug)]
pub struct GoogleFreeBusySource {
    tokens: TokenStorage,
    oauth: OAuthClient,
    client: FreeBusyClient,
}

impl GoogleFreeBusySource {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("busylight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::internal("failed to create HTTP client").with_source(e))?;

        Ok(Self {
            tokens: TokenStorage::new(&config.token_path),
            oauth: OAuthClient::new(http_client.clone(), config.credentials, &config.token_url),
            client: FreeBusyClient::new(http_client, &config.api_base),
        })
    }

    /// Loads the token, refreshing it first if it has expired.
    async fn current_token(&self) -> ProviderResult<TokenInfo> {
        let token = self.tokens.load()?;
        if token.is_expired_at(Utc::now()) {
            debug!("Access token expired, refreshing");
            return self.refresh(token).await;
        }
        Ok(token)
    }

    async fn refresh(&self, mut token: TokenInfo) -> ProviderResult<TokenInfo> {
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            ProviderError::authentication("access token expired and no refresh token is stored")
        })?;

        let (access_token, expires_in) = self.oauth.refresh_token(&refresh_token).await?;
        token.update_access_token(access_token, expires_in, Utc::now());

        if let Err(e) = self.tokens.save(&token) {
            warn!(error = %e, "Could not persist refreshed token");
        }
        Ok(token)
    }

    async fn query(&self, query: FreeBusyQuery) -> ProviderResult<FreeBusyResponse> {
        let token = self.current_token().await?;

        match self.client.query(&token.access_token, &query).await {
            Err(e)
                if e.code() == ProviderErrorCode::AuthenticationFailed
                    && token.refresh_token.is_some() =>
            {
                info!("Access token rejected, refreshing once");
                let token = self.refresh(token).await?;
                self.client.query(&token.access_token, &query).await
            }
            result => result,
        }
    }
}

impl CalendarSource for GoogleFreeBusySource {
    fn name(&self) -> &str {
        NAME
    }

    fn query_free_busy(&self, query: FreeBusyQuery) -> BoxFuture<'_, ProviderResult<FreeBusyResponse>> {
        Box::pin(async move { self.query(query).await.map_err(|e| e.with_provider(NAME)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::OAuthCredentials;
    use busylight_core::TimeWindow;
    use chrono::Duration;

    fn config(dir: &tempfile::TempDir) -> GoogleConfig {
        GoogleConfig::new(
            OAuthCredentials::new("id", "secret"),
            dir.path().join("token.json"),
        )
    }

    #[test]
    fn rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = config(&dir);
        bad.credentials.client_secret.clear();
        assert!(GoogleFreeBusySource::new(bad).is_err());
    }

    #[tokio::test]
    async fn missing_token_file_fails_query() {
        let dir = tempfile::tempdir().unwrap();
        let source = GoogleFreeBusySource::new(config(&dir)).unwrap();
        let window = TimeWindow::from_now(Utc::now(), Duration::hours(8));

        let err = source
            .query_free_busy(FreeBusyQuery::new(["primary"], window))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
        assert_eq!(err.provider(), Some("google"));
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut token = TokenInfo::new("stale", None);
        token.expires_at = Some(Utc::now() - Duration::minutes(5));
        TokenStorage::new(dir.path().join("token.json")).save(&token).unwrap();

        let source = GoogleFreeBusySource::new(config(&dir)).unwrap();
        let err = source.current_token().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn valid_token_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let mut token = TokenInfo::new("fresh", Some("r".into()));
        token.expires_at = Some(Utc::now() + Duration::hours(1));
        TokenStorage::new(dir.path().join("token.json")).save(&token).unwrap();

        let source = GoogleFreeBusySource::new(config(&dir)).unwrap();
        assert_eq!(source.current_token().await.unwrap(), token);
    }
}
