//! Catalog fetcher.
//!
//! One GET against the catalog route per call, bounded by a timeout that
//! drops (and thereby aborts) the request. No retries; a failed fetch is the
//! caller's to retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::types::CatalogEntry;

/// User agent for catalog requests.
pub const CATALOG_USER_AGENT: &str = concat!("errcat/", env!("CARGO_PKG_VERSION"));

/// Anything that can produce the full list of catalog entries.
#[async_trait]
pub trait CatalogSource: Send + Sync + std::fmt::Debug {
    async fn fetch_entries(&self) -> CatalogResult<Vec<CatalogEntry>>;
}

/// HTTP catalog fetcher.
#[derive(Debug, Clone)]
pub struct HttpCatalogFetcher {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpCatalogFetcher {
    /// Create a fetcher for an already-resolved endpoint.
    pub fn new(endpoint: Url, timeout: Duration) -> CatalogResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CATALOG_USER_AGENT));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| CatalogError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// Create a fetcher from config, resolving the endpoint once.
    pub fn from_config(config: &CatalogConfig) -> CatalogResult<Self> {
        Self::new(config.endpoint()?, config.timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn fetch_body(&self) -> CatalogResult<String> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| match self.transport_error(e) {
            CatalogError::Network { message } => CatalogError::Network {
                message: format!("failed to read response body: {}", message),
            },
            other => other,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> CatalogError {
        if err.is_timeout() {
            CatalogError::Timeout {
                after: self.timeout,
            }
        } else {
            CatalogError::from(err)
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogFetcher {
    async fn fetch_entries(&self) -> CatalogResult<Vec<CatalogEntry>> {
        debug!(url = %self.endpoint, "fetching error catalog");

        let body = match tokio::time::timeout(self.timeout, self.fetch_body()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CatalogError::Timeout {
                    after: self.timeout,
                })
            }
        };

        let entries = match serde_json::from_str::<Value>(&body) {
            Ok(payload) => normalize_entries(payload),
            Err(e) => {
                warn!(error = %e, "catalog response is not JSON, treating as empty");
                Vec::new()
            }
        };

        debug!(entries = entries.len(), "catalog fetched");
        Ok(entries)
    }
}

/// Flatten a catalog payload into entries.
///
/// Accepts a bare list or an object with an `items` list; any other shape is
/// an empty catalog. Rows that do not decode as entries are skipped.
pub fn normalize_entries(payload: Value) -> Vec<CatalogEntry> {
    let rows = match payload {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(rows)) => rows,
            _ => {
                debug!("catalog envelope has no items list");
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<CatalogEntry>(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "skipping malformed catalog row");
                None
            }
        })
        .collect()
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer, timeout: Duration) -> HttpCatalogFetcher {
        let config = CatalogConfig::default()
            .with_base_url(server.uri())
            .with_timeout_secs(timeout.as_secs());
        HttpCatalogFetcher::from_config(&config).expect("failed to create fetcher")
    }

    #[tokio::test]
    async fn test_fetch_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/error-catalog"))
            .and(header("user-agent", CATALOG_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"code": 100, "message": "A"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let entries = fetcher(&server, Duration::from_secs(5))
            .fetch_entries()
            .await
            .unwrap();
        assert_eq!(entries, vec![CatalogEntry::with_code(100, "A")]);
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher(&server, Duration::from_secs(5))
            .fetch_entries()
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let entries = fetcher(&server, Duration::from_secs(5))
            .fetch_entries()
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = fetcher(&server, Duration::from_secs(1))
            .fetch_entries()
            .await
            .unwrap_err();
        assert!(
            matches!(err, CatalogError::Timeout { .. }),
            "expected timeout, got {:?}",
            err
        );
        assert!(err.is_retryable());
    }
}
