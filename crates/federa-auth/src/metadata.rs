//! Federation IdP metadata fetching and caching.
//!
//! Each federation backend may publish a metadata document describing its
//! entity id, single sign-on URL and signing certificates:
//!
//! ```json
//! {
//!   "entity_id": "http://adfs.example.fi/adfs/services/trust",
//!   "sso_url": "https://adfs.example.fi/adfs/ls/",
//!   "signing_certificates": [
//!     {
//!       "certificate": "MIIC...",
//!       "not_before": "2024-01-01T00:00:00Z",
//!       "not_after": "2027-01-01T00:00:00Z"
//!     }
//!   ]
//! }
//! ```
//!
//! Only certificates whose validity window contains the fetch time are kept;
//! a document without any is rejected. Documents are cached per URL for a
//! fixed TTL. Refreshes are serialized so concurrent misses for the same
//! document result in a single outbound fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::backend::BackendRegistry;

/// A signing certificate with its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningCertificate {
    /// Base64 DER certificate body.
    pub certificate: String,

    /// Start of validity. Absent means no lower bound.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_before: Option<OffsetDateTime>,

    /// End of validity. Absent means no upper bound.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_after: Option<OffsetDateTime>,
}

impl SigningCertificate {
    /// Returns `true` if the certificate is valid at `at`.
    #[must_use]
    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.not_before.is_none_or(|start| start <= at)
            && self.not_after.is_none_or(|end| at < end)
    }
}

/// IdP metadata with only currently valid certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpMetadata {
    /// IdP entity id.
    pub entity_id: String,

    /// Where logins are started.
    pub sso_url: Url,

    /// Valid signing certificates.
    #[serde(default)]
    pub signing_certificates: Vec<SigningCertificate>,
}

/// Errors that can occur while loading metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// The metadata endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// The document could not be parsed.
    #[error("Failed to parse metadata: {0}")]
    Parse(String),

    /// Every signing certificate is expired or not yet valid.
    #[error("No valid signing certificates in metadata from {0}")]
    NoValidCertificates(String),

    /// The backend has no metadata URL.
    #[error("Backend {0} has no metadata configured")]
    NotConfigured(String),
}

struct CachedMetadata {
    metadata: Arc<IdpMetadata>,
    expires_at: Instant,
}

/// Process-wide cache of IdP metadata, keyed by document URL.
pub struct IdpMetadataCache {
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedMetadata>>>,
    refresh_lock: Mutex<()>,
    ttl: Duration,
}

impl IdpMetadataCache {
    /// Creates an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(ttl: Duration, request_timeout: Duration) -> Result<Self, MetadataError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MetadataError::Network(e.to_string()))?;
        Ok(Self {
            http_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            refresh_lock: Mutex::new(()),
            ttl,
        })
    }

    /// Returns metadata for `url`, fetching it on a miss or after expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be fetched, cannot be parsed
    /// or carries no valid signing certificate.
    pub async fn get(&self, url: &Url) -> Result<Arc<IdpMetadata>, MetadataError> {
        if let Some(metadata) = self.cached(url).await {
            tracing::trace!(url = %url, "metadata cache hit");
            return Ok(metadata);
        }

        let _guard = self.refresh_lock.lock().await;
        // A concurrent caller may have refreshed while we waited.
        if let Some(metadata) = self.cached(url).await {
            return Ok(metadata);
        }
        self.fetch_and_store(url).await
    }

    /// Returns metadata for a federation backend by name.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotConfigured`] when the backend is unknown,
    /// not a federation backend or has no metadata URL.
    pub async fn for_backend(
        &self,
        registry: &BackendRegistry,
        backend: &str,
    ) -> Result<Arc<IdpMetadata>, MetadataError> {
        let url = registry
            .lookup(backend)
            .and_then(|entry| entry.backend.as_federation())
            .and_then(|federation| federation.metadata_url().cloned())
            .ok_or_else(|| MetadataError::NotConfigured(backend.to_string()))?;
        self.get(&url).await
    }

    /// Fetches metadata for `url` regardless of cache state.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn refresh(&self, url: &Url) -> Result<Arc<IdpMetadata>, MetadataError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store(url).await
    }

    /// Loads metadata for every enabled federation backend with a URL.
    ///
    /// Failures are logged and skipped; returns how many documents loaded.
    pub async fn prefetch(&self, registry: &BackendRegistry) -> usize {
        let mut loaded = 0;
        for name in registry.names() {
            let Some(entry) = registry.lookup(name) else {
                continue;
            };
            if !entry.enabled {
                continue;
            }
            let Some(url) = entry
                .backend
                .as_federation()
                .and_then(|federation| federation.metadata_url())
            else {
                continue;
            };
            match self.get(url).await {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!(backend = name, error = %e, "metadata prefetch failed"),
            }
        }
        tracing::info!(loaded, "IdP metadata prefetched");
        loaded
    }

    /// Clears all entries from the cache.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
        tracing::debug!("Cleared all IdP metadata cache entries");
    }

    /// Returns the number of entries in the cache.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Returns `true` if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    async fn cached(&self, url: &Url) -> Option<Arc<IdpMetadata>> {
        let cache = self.cache.read().await;
        cache
            .get(&cache_key(url))
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| Arc::clone(&cached.metadata))
    }

    /// Caller must hold `refresh_lock`.
    async fn fetch_and_store(&self, url: &Url) -> Result<Arc<IdpMetadata>, MetadataError> {
        tracing::debug!(url = %url, "fetching IdP metadata");

        let response = self
            .http_client
            .get(url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "failed to fetch IdP metadata");
                MetadataError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(MetadataError::Http(response.status().as_u16()));
        }

        let mut metadata: IdpMetadata = response.json().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "failed to parse IdP metadata");
            MetadataError::Parse(e.to_string())
        })?;

        let now = OffsetDateTime::now_utc();
        let total = metadata.signing_certificates.len();
        metadata
            .signing_certificates
            .retain(|cert| cert.is_valid_at(now));
        if metadata.signing_certificates.is_empty() {
            tracing::error!(url = %url, total, "IdP metadata has no valid signing certificate");
            return Err(MetadataError::NoValidCertificates(url.to_string()));
        }

        tracing::debug!(
            url = %url,
            entity_id = %metadata.entity_id,
            valid = metadata.signing_certificates.len(),
            dropped = total - metadata.signing_certificates.len(),
            "cached IdP metadata"
        );

        let metadata = Arc::new(metadata);
        let mut cache = self.cache.write().await;
        cache.insert(
            cache_key(url),
            CachedMetadata {
                metadata: Arc::clone(&metadata),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(metadata)
    }
}

impl std::fmt::Debug for IdpMetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdpMetadataCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn cache_key(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FederationBackend;
    use serde_json::json;
    use time::format_description::well_known::Rfc3339;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rfc3339(at: OffsetDateTime) -> String {
        at.format(&Rfc3339).unwrap()
    }

    fn document() -> serde_json::Value {
        let now = OffsetDateTime::now_utc();
        json!({
            "entity_id": "http://adfs.example.fi/adfs/services/trust",
            "sso_url": "https://adfs.example.fi/adfs/ls/",
            "signing_certificates": [
                {
                    "certificate": "current",
                    "not_before": rfc3339(now - time::Duration::days(30)),
                    "not_after": rfc3339(now + time::Duration::days(300)),
                },
                {
                    "certificate": "expired",
                    "not_before": rfc3339(now - time::Duration::days(400)),
                    "not_after": rfc3339(now - time::Duration::days(1)),
                },
                {
                    "certificate": "upcoming",
                    "not_before": rfc3339(now + time::Duration::days(10)),
                },
            ]
        })
    }

    fn cache() -> IdpMetadataCache {
        IdpMetadataCache::new(Duration::from_secs(3600), Duration::from_secs(5)).unwrap()
    }

    fn metadata_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/metadata.json", server.uri())).unwrap()
    }

    #[test]
    fn test_certificate_validity() {
        let now = OffsetDateTime::now_utc();
        let open = SigningCertificate {
            certificate: "x".to_string(),
            not_before: None,
            not_after: None,
        };
        assert!(open.is_valid_at(now));

        let expired = SigningCertificate {
            not_after: Some(now - time::Duration::seconds(1)),
            ..open.clone()
        };
        assert!(!expired.is_valid_at(now));
    }

    #[tokio::test]
    async fn test_only_valid_certificates_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document()))
            .mount(&server)
            .await;

        let metadata = cache().get(&metadata_url(&server)).await.unwrap();
        assert_eq!(metadata.sso_url.as_str(), "https://adfs.example.fi/adfs/ls/");
        let certs: Vec<_> = metadata
            .signing_certificates
            .iter()
            .map(|c| c.certificate.as_str())
            .collect();
        assert_eq!(certs, vec!["current"]);
    }

    #[tokio::test]
    async fn test_no_valid_certificate_is_error() {
        let server = MockServer::start().await;
        let mut doc = document();
        doc["signing_certificates"]
            .as_array_mut()
            .unwrap()
            .remove(0);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc))
            .mount(&server)
            .await;

        let cache = cache();
        let err = cache.get(&metadata_url(&server)).await.unwrap_err();
        assert!(matches!(err, MetadataError::NoValidCertificates(_)));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cached_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache();
        let url = metadata_url(&server);
        let first = cache.get(&url).await.unwrap();
        let second = cache.get(&url).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(document())
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(cache());
        let url = metadata_url(&server);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let url = url.clone();
            handles.push(tokio::spawn(async move { cache.get(&url).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document()))
            .expect(2)
            .mount(&server)
            .await;

        let cache = cache();
        let url = metadata_url(&server);
        cache.get(&url).await.unwrap();
        cache.clear().await;
        assert!(cache.is_empty().await);
        cache.get(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = cache().get(&metadata_url(&server)).await.unwrap_err();
        assert_eq!(err, MetadataError::Http(503));
    }

    #[tokio::test]
    async fn test_prefetch_registry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document()))
            .mount(&server)
            .await;

        let registry = BackendRegistry::new()
            .with(FederationBackend::turku_adfs("turku_adfs").with_metadata_url(metadata_url(&server)))
            .unwrap()
            .with(FederationBackend::opas_adfs("opas_adfs"))
            .unwrap();

        let cache = cache();
        assert_eq!(cache.prefetch(&registry).await, 1);
        assert!(cache.for_backend(&registry, "turku_adfs").await.is_ok());
        assert!(matches!(
            cache.for_backend(&registry, "opas_adfs").await,
            Err(MetadataError::NotConfigured(_))
        ));
    }
}
