//! HTTP client for a remote archive-retrieval API.
//!
//! Lets the read path fall back to an archive served by another process
//! (for example another billvault instance's `/internal/archive` routes).

use std::time::Duration;

use async_trait::async_trait;
use billvault_core::{RecordId, Tier, TierError, TierResult};
use billvault_storage::{ArchiveLookup, ArchiveSource};
use reqwest::{StatusCode, Url};

use crate::config::ServiceKey;
use crate::constants::SERVICE_KEY_HEADER;
use crate::error::{ApiError, ApiResult};

/// [`ArchiveSource`] backed by `GET {base_url}/{id}`.
///
/// `200` is a hit, `404` is a miss, anything else is a transient cold-tier
/// failure.
#[derive(Clone)]
pub struct HttpArchiveClient {
    client: reqwest::Client,
    base_url: Url,
    service_key: ServiceKey,
}

impl HttpArchiveClient {
    pub fn new(base_url: String, service_key: ServiceKey, timeout: Duration) -> ApiResult<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            ApiError::internal_error(format!("Invalid archive URL {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::internal_error(format!(
                "Archive URL {} cannot carry a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            service_key,
        })
    }

    fn record_url(&self, id: &RecordId) -> TierResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TierError::transient(Tier::Cold, "fetch", "archive URL cannot be a base"))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveClient {
    async fn fetch(&self, id: &RecordId) -> TierResult<ArchiveLookup> {
        let url = self.record_url(id)?;
        let response = self
            .client
            .get(url)
            .header(SERVICE_KEY_HEADER, self.service_key.expose())
            .send()
            .await
            .map_err(|e| TierError::transient(Tier::Cold, "fetch", e))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| TierError::transient(Tier::Cold, "fetch", e))?;
                Ok(ArchiveLookup::Found(body.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(ArchiveLookup::NoEntry),
            status => {
                tracing::warn!(record_id = %id, status = %status, "Archive API returned an error");
                Err(TierError::transient(
                    Tier::Cold,
                    "fetch",
                    format!("archive API returned {}", status),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpArchiveClient {
        HttpArchiveClient::new(
            base.to_string(),
            ServiceKey::new("key").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_record_url_appends_id() {
        let url = client("http://archive.local:8080/internal/archive/")
            .record_url(&RecordId::parse("abc123").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "http://archive.local:8080/internal/archive/abc123");
    }

    #[test]
    fn test_record_url_escapes_id() {
        let url = client("http://archive.local")
            .record_url(&RecordId::parse("inv 7?x").unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "http://archive.local/inv%207%3Fx");
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(HttpArchiveClient::new(
            "mailto:ops@example.com".to_string(),
            ServiceKey::new("key").unwrap(),
            Duration::from_secs(1),
        )
        .is_err());
    }
}
