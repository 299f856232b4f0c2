//! Dynamic-DNS update call reduced to a go/no-go signal.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tunnel_warden_core::{Ack, DnsSync, SyncError};

/// Body the provider returns on a successful update.
pub const SUCCESS_TOKEN: &str = "OK";

/// Default provider update endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.duckdns.org/update";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dynamic-DNS provider settings.
#[derive(Clone)]
pub struct DnsConfig {
    /// Domain to update.
    pub domain: Option<String>,
    /// Update-authorization token.
    pub token: Option<String>,
    /// Update endpoint URL.
    pub endpoint: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            domain: None,
            token: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for DnsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsConfig")
            .field("domain", &self.domain)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DnsConfig {
    /// Create a config for the default endpoint.
    #[must_use]
    pub fn new(domain: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Read `DUCKDNS_DOMAIN`, `DUCKDNS_TOKEN` and `DUCKDNS_ENDPOINT`.
    ///
    /// Missing values are left unset; the gate reports them when called.
    #[must_use]
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            domain: non_empty("DUCKDNS_DOMAIN"),
            token: non_empty("DUCKDNS_TOKEN"),
            endpoint: non_empty("DUCKDNS_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Performs the pre-flight dynamic-DNS update.
///
/// The request carries an empty `ip` so the provider uses the caller's
/// address. Only a body equal to [`SUCCESS_TOKEN`] counts as success. There
/// is no retry; the caller decides whether to abort.
#[derive(Debug, Clone)]
pub struct DnsSyncGate {
    config: DnsConfig,
    client: reqwest::Client,
}

impl DnsSyncGate {
    /// Create a gate with its own HTTP client.
    #[must_use]
    pub fn new(config: DnsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &DnsConfig {
        &self.config
    }
}

#[async_trait]
impl DnsSync for DnsSyncGate {
    async fn sync_and_check(&self) -> Result<Ack, SyncError> {
        let domain = self
            .config
            .domain
            .as_deref()
            .ok_or(SyncError::NotConfigured("DUCKDNS_DOMAIN"))?;
        let token = self
            .config
            .token
            .as_deref()
            .ok_or(SyncError::NotConfigured("DUCKDNS_TOKEN"))?;

        tracing::info!(domain, "Updating dynamic DNS");

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[("domains", domain), ("token", token), ("ip", "")])
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Transport(e.without_url().to_string()))?;

        tracing::info!(domain, %status, body = %body, "Dynamic DNS response");

        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body == SUCCESS_TOKEN {
            Ok(Ack)
        } else {
            Err(SyncError::Rejected(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{Router, extract::Query, http::StatusCode, routing::get};

    use super::*;

    /// Serve a fake provider; replies `OK` only for token `good`.
    async fn spawn_provider() -> String {
        let app = Router::new()
            .route(
                "/update",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let well_formed = params.get("domains").is_some_and(|d| d == "home")
                        && params.get("ip").is_some_and(String::is_empty);
                    if well_formed && params.get("token").is_some_and(|t| t == "good") {
                        "OK"
                    } else {
                        "KO"
                    }
                }),
            )
            .route(
                "/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_ok_body_is_ack() {
        let base = spawn_provider().await;
        let gate = DnsSyncGate::new(
            DnsConfig::new("home", "good").with_endpoint(format!("{base}/update")),
        );

        assert_eq!(gate.sync_and_check().await, Ok(Ack));
    }

    #[tokio::test]
    async fn test_other_body_is_rejected_with_raw_text() {
        let base = spawn_provider().await;
        let gate = DnsSyncGate::new(
            DnsConfig::new("home", "bad").with_endpoint(format!("{base}/update")),
        );

        let err = gate.sync_and_check().await.unwrap_err();
        assert_eq!(err, SyncError::Rejected("KO".to_string()));
        assert!(err.to_string().contains("KO"));
    }

    #[tokio::test]
    async fn test_repeated_calls_agree() {
        let base = spawn_provider().await;
        let gate = DnsSyncGate::new(
            DnsConfig::new("home", "bad").with_endpoint(format!("{base}/update")),
        );

        let first = gate.sync_and_check().await;
        let second = gate.sync_and_check().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let base = spawn_provider().await;
        let gate = DnsSyncGate::new(
            DnsConfig::new("home", "good").with_endpoint(format!("{base}/broken")),
        );

        assert_eq!(
            gate.sync_and_check().await,
            Err(SyncError::Status {
                status: 500,
                body: "upstream down".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_the_call() {
        let gate =
            DnsSyncGate::new(DnsConfig::default().with_endpoint("http://127.0.0.1:9/update"));
        assert_eq!(
            gate.sync_and_check().await,
            Err(SyncError::NotConfigured("DUCKDNS_DOMAIN"))
        );

        let mut config = DnsConfig::default();
        config.domain = Some("home".to_string());
        let gate = DnsSyncGate::new(config);
        assert_eq!(
            gate.sync_and_check().await,
            Err(SyncError::NotConfigured("DUCKDNS_TOKEN"))
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gate = DnsSyncGate::new(
            DnsConfig::new("home", "good")
                .with_endpoint(format!("http://{addr}/update"))
                .with_timeout(Duration::from_secs(2)),
        );
        assert!(matches!(
            gate.sync_and_check().await,
            Err(SyncError::Transport(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", DnsConfig::new("home", "s3cret"));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("home"));
    }
}
