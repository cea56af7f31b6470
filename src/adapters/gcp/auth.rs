//! OAuth access tokens for the Google APIs
//!
//! A token is taken from configuration when one is set. Otherwise the
//! default service account token is fetched from the instance metadata
//! server and cached until shortly before it expires.

use crate::config::{GcpConfig, SecretString};
use crate::domain::{ExporterError, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Tokens are refreshed this long before the server-reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    valid_until: Instant,
}

/// Source of bearer tokens shared by the BigQuery and storage clients
pub struct AccessTokenProvider {
    static_token: Option<SecretString>,
    metadata_endpoint: String,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    /// Creates a provider from the `gcp` configuration section
    pub fn new(config: &GcpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ExporterError::Authentication(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            static_token: config.access_token.clone(),
            metadata_endpoint: config.metadata_endpoint.trim_end_matches('/').to_string(),
            client,
            cached: Mutex::new(None),
        })
    }

    /// Returns a bearer token, fetching a new one when needed
    pub async fn token(&self) -> Result<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.expose_secret().as_ref().to_string());
        }

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.valid_until {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch_metadata_token().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        let value = fresh.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            valid_until: Instant::now() + lifetime,
        });

        Ok(value)
    }

    async fn fetch_metadata_token(&self) -> Result<MetadataToken> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.metadata_endpoint
        );
        tracing::debug!(url = %url, "Fetching access token from metadata server");

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                ExporterError::Authentication(format!("Failed to reach metadata server: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExporterError::Authentication(format!(
                "Metadata server returned {status} for token request: {body}"
            )));
        }

        response
            .json::<MetadataToken>()
            .await
            .map_err(|e| ExporterError::Authentication(format!("Invalid token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn config(endpoint: &str) -> GcpConfig {
        GcpConfig {
            metadata_endpoint: endpoint.to_string(),
            ..GcpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_static_token_skips_metadata() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.access_token = Some(secret_string("configured".to_string()));
        let provider = AccessTokenProvider::new(&cfg).unwrap();
        assert_eq!(provider.token().await.unwrap(), "configured");
    }

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/computeMetadata/v1/instance/service-accounts/default/token",
            )
            .match_header("Metadata-Flavor", "Google")
            .with_status(200)
            .with_body(r#"{"access_token":"ya29.token","expires_in":3599,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = AccessTokenProvider::new(&config(&server.url())).unwrap();
        assert_eq!(provider.token().await.unwrap(), "ya29.token");
        assert_eq!(provider.token().await.unwrap(), "ya29.token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_metadata_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/computeMetadata/v1/instance/service-accounts/default/token",
            )
            .with_status(500)
            .create_async()
            .await;

        let provider = AccessTokenProvider::new(&config(&server.url())).unwrap();
        let err = provider.token().await.unwrap_err();
        assert!(matches!(err, ExporterError::Authentication(_)));
    }
}
