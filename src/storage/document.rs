// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Document-store backend: bulk inserts against a document database

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backend::{ChildrenCountFn, ObjectStore};
use crate::config::DocumentConfig;
use crate::error::{TransportError, TransportResult};
use crate::queue::{BatchLimits, Callbacks, ErrorFn, FlushBatch, ProgressFn, QueuedObject, WriteQueue};

/// Object store backed by a CouchDB-style document database. Each object
/// becomes one `{hash, content}` document in a fixed database; flushes are
/// bulk inserts. An existence check runs before every insert so re-saving
/// an id never duplicates documents.
pub struct DocumentStore {
    inner: Arc<DocumentInner>,
    queue: WriteQueue,
}

struct DocumentInner {
    name: String,
    client: Client,
    base_url: String,
    database: String,
    cancel: CancellationToken,
}

#[derive(Deserialize)]
struct ObjectDocument {
    content: String,
}

#[derive(Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Deserialize)]
struct AllDocsRow {
    key: String,
    #[serde(default)]
    error: Option<String>,
}

impl DocumentStore {
    pub fn new(config: DocumentConfig) -> TransportResult<Self> {
        let mut client_builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(config.timeout_seconds));

        if let Some(token) = &config.api_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value)
                    .map_err(|e| TransportError::transport("Document", e))?,
            );
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder.build()?;

        let name = "Document".to_string();
        let cancel = CancellationToken::new();
        let callbacks = Arc::new(Callbacks::default());
        let inner = Arc::new(DocumentInner {
            name: name.clone(),
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database,
            cancel: cancel.clone(),
        });

        let limits = BatchLimits {
            max_batch_bytes: config.flush.max_batch_bytes,
            max_batch_objects: config.flush.max_batch_objects,
        };
        let flusher = Arc::new(DocumentFlusher {
            inner: inner.clone(),
        });
        let queue = WriteQueue::spawn(name, limits, flusher, callbacks, cancel);

        Ok(Self { inner, queue })
    }
}

impl DocumentInner {
    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    /// Create the database if it does not exist.
    async fn ensure_database(&self) -> TransportResult<()> {
        let url = self.database_url();
        match self.client.head(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Database '{}' already exists", self.database);
                Ok(())
            }
            _ => {
                info!("Creating database '{}'", self.database);
                let response = self.client.put(&url).send().await?;
                // 412: another writer created it first, which is fine.
                if response.status().is_success()
                    || response.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(TransportError::ServerStatus {
                        status: response.status().as_u16(),
                        url,
                    })
                }
            }
        }
    }

    async fn has_documents(&self, ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        let mut result: HashMap<String, bool> =
            ids.iter().map(|id| (id.clone(), false)).collect();
        if ids.is_empty() {
            return Ok(result);
        }
        let url = format!("{}/_all_docs", self.database_url());
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "keys": ids }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::ServerStatus {
                status: response.status().as_u16(),
                url,
            });
        }
        let body: AllDocsResponse = response.json().await?;
        for row in body.rows {
            if row.error.is_none() {
                result.insert(row.key, true);
            }
        }
        Ok(result)
    }

    async fn bulk_insert(&self, batch: Vec<QueuedObject>) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }

        // Existence check first: bulk insert is not an upsert, and a
        // duplicate id would otherwise become a duplicate document.
        let ids: Vec<String> = batch.iter().map(|entry| entry.id.clone()).collect();
        let found = self.has_documents(&ids).await?;
        let docs: Vec<serde_json::Value> = batch
            .iter()
            .filter(|entry| !found.get(&entry.id).copied().unwrap_or(false))
            .map(|entry| {
                serde_json::json!({
                    "_id": entry.id,
                    "hash": entry.id,
                    "content": entry.payload,
                })
            })
            .collect();

        if docs.is_empty() {
            debug!(
                "Database already has all {} objects in this window",
                batch.len()
            );
            return Ok(());
        }

        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }

        let url = format!("{}/_bulk_docs", self.database_url());
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "docs": docs }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::ServerStatus {
                status: response.status().as_u16(),
                url,
            });
        }

        debug!(
            "Inserted {} of {} documents into '{}'",
            docs.len(),
            batch.len(),
            self.database
        );
        Ok(())
    }
}

struct DocumentFlusher {
    inner: Arc<DocumentInner>,
}

#[async_trait]
impl FlushBatch for DocumentFlusher {
    async fn flush(&self, batch: Vec<QueuedObject>) -> TransportResult<()> {
        self.inner.bulk_insert(batch).await
    }
}

#[async_trait]
impl ObjectStore for DocumentStore {
    fn transport_name(&self) -> &str {
        &self.inner.name
    }

    async fn initialize(&self) -> TransportResult<()> {
        self.inner.ensure_database().await
    }

    fn save_object(&self, id: &str, payload: &str) -> TransportResult<()> {
        self.queue.enqueue(id, payload)
    }

    async fn get_object(&self, id: &str) -> TransportResult<Option<String>> {
        if self.inner.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.inner.name));
        }
        let url = format!("{}/{}", self.inner.database_url(), id);
        let response = self.inner.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TransportError::ServerStatus {
                status: response.status().as_u16(),
                url,
            });
        }
        let document: ObjectDocument = response.json().await?;
        Ok(Some(document.content))
    }

    async fn has_objects(&self, ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        if self.inner.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.inner.name));
        }
        self.inner.has_documents(ids).await
    }

    async fn write_complete(&self) -> TransportResult<()> {
        self.queue.write_complete().await
    }

    fn begin_write(&self) {
        self.queue.begin_write();
    }

    fn saved_object_count(&self) -> usize {
        self.queue.saved_object_count()
    }

    fn set_on_progress(&self, f: ProgressFn) {
        self.queue.callbacks().set_progress(f);
    }

    fn set_on_error(&self, f: ErrorFn) {
        self.queue.callbacks().set_error(f);
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    async fn copy_object_and_children(
        &self,
        id: &str,
        target: &dyn ObjectStore,
        on_total_children_known: Option<ChildrenCountFn<'_>>,
    ) -> TransportResult<String> {
        crate::graph::copy_object_and_children(self, id, target, on_total_children_known).await
    }
}
