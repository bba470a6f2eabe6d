
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{IndexRecord, IndexSpec, Metadata, SearchMatch, VectorIndex};
use crate::config::PineconeConfig;
use crate::http::{Auth, JsonClient, blocking, endpoint};
use crate::{RagError, Result, Service};

/// Pinecone index client covering both the control plane (index management)
/// and the data plane (upsert and query) of a single named index.
///
/// Cloning is cheap; clones share the resolved host and the set of indexes
/// already ensured by this process.
#[derive(Debug, Clone)]
pub struct PineconeIndex {
    client: JsonClient,
    control_url: Url,
    index_name: String,
    cloud: String,
    region: String,
    upsert_batch_size: usize,
    ready_timeout: Duration,
    ready_poll_interval: Duration,
    host: Arc<Mutex<Option<Url>>>,
    /// Held for the whole list/create/wait sequence so creation runs once
    ensured: Arc<Mutex<HashSet<String>>>,
}

/// Interval between readiness checks after an index is created
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Index description as returned by the control plane
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IndexDescription {
    pub name: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub status: Option<IndexStatus>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: Option<String>,
}

impl IndexDescription {
    /// Descriptions without a status are taken as ready
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_none_or(|status| status.ready)
    }

    fn state(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|status| status.state.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Deserialize)]
struct ListIndexesResponse {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: super::Metric,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Debug, Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector<'a>>,
}

#[derive(Debug, Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Metadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl PineconeIndex {
    /// Create a client for the index named in `config`
    ///
    /// # Arguments
    /// * `config` - Pinecone section of the application configuration
    /// * `timeout` - Global timeout applied to every HTTP request, also the
    ///   longest time `ensure_index` waits for a new index to become ready
    #[inline]
    pub fn new(config: &PineconeConfig, timeout: Duration) -> Result<Self> {
        let control_url = config
            .control_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let host = config
            .index_host
            .as_deref()
            .map(host_url)
            .transpose()?;

        Ok(Self {
            client: JsonClient::new(
                Service::Pinecone,
                Auth::ApiKey(config.api_key.clone()),
                timeout,
            ),
            control_url,
            index_name: config.index_name.clone(),
            cloud: config.cloud.clone(),
            region: config.environment.clone(),
            upsert_batch_size: config.upsert_batch_size.max(1),
            ready_timeout: timeout,
            ready_poll_interval: READY_POLL_INTERVAL,
            host: Arc::new(Mutex::new(host)),
            ensured: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    #[inline]
    pub fn with_ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval;
        self
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// List every index visible to the API key
    #[inline]
    pub fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let url = endpoint(&self.control_url, "indexes")?;
        let response: ListIndexesResponse = self.client.get(&url)?;
        debug!("Pinecone reports {} indexes", response.indexes.len());
        Ok(response.indexes)
    }

    #[inline]
    pub fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let url = endpoint(&self.control_url, &format!("indexes/{}", name))?;
        self.client.get(&url)
    }

    #[inline]
    pub fn create_index(&self, spec: &IndexSpec) -> Result<IndexDescription> {
        info!(
            "Creating Pinecone index '{}' ({} dimensions, {} metric, {}/{})",
            spec.name, spec.dimension, spec.metric, self.cloud, self.region
        );

        let url = endpoint(&self.control_url, "indexes")?;
        let request = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };

        self.client.post(&url, &request)
    }

    /// Blocking form of [`VectorIndex::ensure_index`]
    ///
    /// Returns once the index exists and reports itself ready.
    #[inline]
    pub fn ensure_index_blocking(&self, spec: &IndexSpec) -> Result<()> {
        let mut ensured = lock(&self.ensured)?;

        if ensured.contains(&spec.name) {
            debug!("Index '{}' already ensured in this process", spec.name);
            return Ok(());
        }

        let existing = self
            .list_indexes()?
            .into_iter()
            .find(|index| index.name == spec.name);

        let description = match existing {
            Some(description) => {
                debug!("Index '{}' already exists", spec.name);
                if description.dimension.is_some_and(|d| d != spec.dimension) {
                    warn!(
                        "Index '{}' has dimension {} but embeddings have {}; upserts will be rejected",
                        spec.name,
                        description.dimension.unwrap_or_default(),
                        spec.dimension
                    );
                }
                description
            }
            None => match self.create_index(spec) {
                Ok(description) => description,
                // Created concurrently by someone else between list and create
                Err(RagError::Upstream { status: 409, .. }) => {
                    info!("Index '{}' was created concurrently", spec.name);
                    self.describe_index(&spec.name)?
                }
                Err(e) => return Err(e),
            },
        };

        let description = if description.is_ready() {
            description
        } else {
            self.wait_until_ready(&spec.name)?
        };

        let reported_host = description.host.filter(|h| !h.trim().is_empty());
        if spec.name == self.index_name {
            if let Some(reported) = reported_host {
                let mut host = lock(&self.host)?;
                if host.is_none() {
                    *host = Some(host_url(&reported)?);
                }
            }
        }

        ensured.insert(spec.name.clone());
        Ok(())
    }

    /// Poll the control plane until `name` is ready, for at most the
    /// client timeout
    fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let interval = self.ready_poll_interval.max(Duration::from_millis(1));
        let attempts = (self.ready_timeout.as_millis() / interval.as_millis()).max(1);

        for attempt in 1..=attempts {
            let description = self.describe_index(name)?;
            if description.is_ready() {
                info!("Index '{}' is ready", name);
                return Ok(description);
            }

            debug!(
                "Index '{}' not ready ({}), check {}/{}",
                name,
                description.state(),
                attempt,
                attempts
            );
            if attempt < attempts {
                thread::sleep(interval);
            }
        }

        Err(RagError::IndexNotReady {
            name: name.to_string(),
            waited: self.ready_timeout,
        })
    }

    /// Data-plane URL of the index, resolved through the control plane once
    #[inline]
    pub fn host(&self) -> Result<Url> {
        let cached = lock(&self.host)?.clone();
        if let Some(host) = cached {
            return Ok(host);
        }

        let description = self.describe_index(&self.index_name)?;
        let host = description
            .host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| RagError::UnexpectedResponse {
                service: Service::Pinecone,
                message: format!("Index '{}' has no host yet", self.index_name),
            })?;
        let host = host_url(&host)?;

        debug!("Resolved host for '{}': {}", self.index_name, host);
        *lock(&self.host)? = Some(host.clone());
        Ok(host)
    }

    /// Blocking form of [`VectorIndex::upsert`]
    #[inline]
    pub fn upsert_blocking(&self, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            debug!("No records to upsert");
            return Ok(0);
        }

        let url = endpoint(&self.host()?, "vectors/upsert")?;
        let mut upserted = 0;

        for batch in records.chunks(self.upsert_batch_size) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|record| WireVector {
                        id: &record.id,
                        values: &record.vector,
                        metadata: &record.metadata,
                    })
                    .collect(),
            };

            let response: UpsertResponse = self.client.post(&url, &request)?;
            debug!("Upserted batch of {} records", response.upserted_count);
            upserted += response.upserted_count;
        }

        info!(
            "Upserted {} records into '{}'",
            upserted, self.index_name
        );
        Ok(upserted)
    }

    /// Blocking form of [`VectorIndex::query`]
    #[inline]
    pub fn query_blocking(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<SearchMatch>> {
        let url = endpoint(&self.host()?, "query")?;
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata,
            include_values: false,
        };

        let response: QueryResponse = self.client.post(&url, &request)?;

        let mut matches: Vec<SearchMatch> = response
            .matches
            .into_iter()
            .map(|m| SearchMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);

        debug!(
            "Query on '{}' returned {} matches",
            self.index_name,
            matches.len()
        );
        Ok(matches)
    }

}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| RagError::Other(anyhow!("Pinecone index state lock poisoned")))
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        let index = self.clone();
        let spec = spec.clone();
        blocking(move || index.ensure_index_blocking(&spec)).await
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let index = self.clone();
        blocking(move || index.upsert_blocking(&records)).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<SearchMatch>> {
        let index = self.clone();
        let vector = vector.to_vec();
        blocking(move || index.query_blocking(&vector, top_k, include_metadata)).await
    }
}

/// Pinecone reports hosts without a scheme; default to https
fn host_url(host: &str) -> Result<Url> {
    let host = host.trim();
    let raw = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };

    Url::parse(&raw).map_err(|e| RagError::Config(format!("Invalid index host '{}': {}", host, e)))
}
