//! Fetch client
//!
//! Performs the conditional HTTP GET against the remote feature endpoint.
//! Transport mechanics stay behind the [`FetchClient`] trait so the
//! synchronizer can be driven by the real `reqwest`-backed client or by a
//! scripted mock.

use async_trait::async_trait;
use flagsync_core::prelude::*;
use reqwest::{Client, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use url::Url;
use tracing::trace;

/// Outcome of one conditional fetch.
///
/// Transport-level failures (network, timeout, malformed body) are returned
/// as `Err`, never as a silent empty response.
#[derive(Debug)]
pub struct FetchResponse {
    pub status: u16,

    /// Version tag from the response, when the remote sent one
    pub etag: Option<String>,

    /// Decoded batch; present only on a 2xx response
    pub batch: Option<FeatureBatch>,
}

impl FetchResponse {
    /// A 2xx response carrying a batch
    pub fn success(batch: FeatureBatch, etag: Option<String>) -> Self {
        Self {
            status: 200,
            etag,
            batch: Some(batch),
        }
    }

    /// A 304 conditional-fetch response
    pub fn unchanged() -> Self {
        Self {
            status: 304,
            etag: None,
            batch: None,
        }
    }

    /// A non-2xx, non-304 response
    pub fn error_status(status: u16) -> Self {
        Self {
            status,
            etag: None,
            batch: None,
        }
    }
}

/// Conditional fetch against the remote feature endpoint
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Issue one conditional GET, attaching `etag` as `If-None-Match` when
    /// present
    async fn fetch(&self, etag: Option<&str>) -> Result<FetchResponse>;
}

// ============================================================================
// HTTP Fetch Client
// ============================================================================

/// Build the feature query URL: base URL plus optional project scope,
/// optional name prefix and tag filters as repeated query parameters.
pub fn build_features_url(config: &EngineConfig) -> Result<Url> {
    let mut base = Url::parse(&config.url)
        .map_err(|e| SyncError::config(format!("invalid base url '{}': {e}", config.url)))?;
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    let mut url = base
        .join("client/features")
        .map_err(|e| SyncError::config(format!("cannot derive feature url: {e}")))?;

    let has_query =
        config.project.is_some() || config.name_prefix.is_some() || !config.tags.is_empty();
    if has_query {
        let mut pairs = url.query_pairs_mut();
        if let Some(project) = &config.project {
            pairs.append_pair("project", project);
        }
        if let Some(prefix) = &config.name_prefix {
            pairs.append_pair("namePrefix", prefix);
        }
        for tag in &config.tags {
            pairs.append_pair("tag", &tag.to_string());
        }
    }

    Ok(url)
}

/// `reqwest`-backed fetch client
pub struct HttpFetcher {
    client: Client,
    url: Url,
    app_name: String,
    instance_id: String,
    custom_headers: Vec<(String, String)>,
}

impl HttpFetcher {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::transport_with_source("failed to build http client", e))?;

        Ok(Self {
            client,
            url: build_features_url(config)?,
            app_name: config.app_name.clone(),
            instance_id: config.instance_id.clone(),
            custom_headers: config
                .custom_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Resolved feature query URL
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl FetchClient for HttpFetcher {
    async fn fetch(&self, etag: Option<&str>) -> Result<FetchResponse> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header("x-flagsync-appname", &self.app_name)
            .header("x-flagsync-instanceid", &self.instance_id);
        for (key, value) in &self.custom_headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::transport_with_source("feature fetch failed", e))?;

        let status = response.status();
        trace!(status = status.as_u16(), url = %self.url, "Fetched features");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResponse::unchanged());
        }
        if !status.is_success() {
            return Ok(FetchResponse::error_status(status.as_u16()));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let batch: FeatureBatch = response
            .json()
            .await
            .map_err(|e| SyncError::transport_with_source("malformed feature payload", e))?;

        Ok(FetchResponse {
            status: status.as_u16(),
            etag,
            batch: Some(batch),
        })
    }
}

// ============================================================================
// Mock Fetch Client (for testing)
// ============================================================================

/// Scripted fetch client.
///
/// Responses are served in push order; once the script runs out every
/// further fetch answers `304`. The etag attached to each fetch is recorded
/// for assertions on conditional-request behavior.
pub struct MockFetcher {
    responses: Mutex<VecDeque<Result<FetchResponse>>>,
    etags_seen: Mutex<Vec<Option<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            etags_seen: Mutex::new(Vec::new()),
        }
    }

    /// Script a response
    pub fn push(&self, response: FetchResponse) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response));
    }

    /// Script a transport-level failure
    pub fn push_error(&self, error: SyncError) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Etags attached to each fetch so far, in order
    pub fn etags_seen(&self) -> Vec<Option<String>> {
        self.etags_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchClient for MockFetcher {
    async fn fetch(&self, etag: Option<&str>) -> Result<FetchResponse> {
        self.etags_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(etag.map(str::to_string));
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(FetchResponse::unchanged()))
    }
}
