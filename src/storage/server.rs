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

// Remote server backend implementation

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backend::{ChildrenCountFn, ObjectStore};
use crate::closure::ClosureManifest;
use crate::config::ServerConfig;
use crate::error::{TransportError, TransportResult};
use crate::queue::{BatchLimits, Callbacks, ErrorFn, FlushBatch, ProgressFn, QueuedObject, WriteQueue};

/// Object store backed by a remote object service.
///
/// Saves are queued and drained by a background worker into multipart
/// uploads. Before transmitting, the worker asks the server which ids it
/// already holds and ships only the rest (content-addressable dedup against
/// the peer). A network failure invokes the error callback and abandons the
/// batch's unflushed remainder; callers that need retry must re-save.
pub struct ServerStore {
    inner: Arc<ServerInner>,
    queue: WriteQueue,
}

struct ServerInner {
    name: String,
    client: Client,
    base_url: String,
    collection_id: String,
    compress_payloads: bool,
    max_part_bytes: usize,
    max_multipart_count: usize,
    cancel: CancellationToken,
    callbacks: Arc<Callbacks>,
}

impl ServerStore {
    /// Build a store for `objects/{collection_id}` on the configured
    /// server. The bearer token must already be resolved; this layer does
    /// no credential acquisition.
    pub fn new(config: ServerConfig) -> TransportResult<Self> {
        let mut client_builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds));

        if let Some(token) = &config.api_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value)
                    .map_err(|e| TransportError::transport("Remote", e))?,
            );
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder.build()?;

        let name = "Remote".to_string();
        let cancel = CancellationToken::new();
        let callbacks = Arc::new(Callbacks::default());
        let inner = Arc::new(ServerInner {
            name: name.clone(),
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection_id: config.collection_id,
            compress_payloads: config.compress_payloads,
            max_part_bytes: config.flush.max_batch_bytes,
            max_multipart_count: config.flush.max_multipart_count,
            cancel: cancel.clone(),
            callbacks: callbacks.clone(),
        });

        // One drained window may span several multipart sub-parts.
        let limits = BatchLimits {
            max_batch_bytes: config.flush.max_batch_bytes * config.flush.max_multipart_count,
            max_batch_objects: config.flush.max_batch_objects,
        };
        let flusher = Arc::new(ServerFlusher {
            inner: inner.clone(),
        });
        let queue = WriteQueue::spawn(name, limits, flusher, callbacks, cancel);

        Ok(Self { inner, queue })
    }
}

impl ServerInner {
    fn objects_url(&self) -> String {
        format!("{}/objects/{}", self.base_url, self.collection_id)
    }

    async fn get_single(&self, id: &str) -> TransportResult<Option<String>> {
        let url = format!("{}/{}/single", self.objects_url(), id);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TransportError::ServerStatus {
                status: response.status().as_u16(),
                url,
            });
        }
        Ok(Some(response.text().await?))
    }

    async fn has_objects_remote(
        &self,
        ids: &[String],
    ) -> TransportResult<HashMap<String, bool>> {
        let url = format!("{}/api/diff/{}", self.base_url, self.collection_id);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "objects": ids }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::ServerStatus {
                status: response.status().as_u16(),
                url,
            });
        }
        let mut found: HashMap<String, bool> = response.json().await?;
        // Every queried id gets an entry, whatever the server answered.
        for id in ids {
            found.entry(id.clone()).or_insert(false);
        }
        Ok(found)
    }

    /// Upload a drained batch window, skipping ids the server already has.
    async fn upload_batch(&self, batch: Vec<QueuedObject>) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }

        let ids: Vec<String> = batch.iter().map(|entry| entry.id.clone()).collect();
        let found = self.has_objects_remote(&ids).await?;
        let new_objects: Vec<&QueuedObject> = batch
            .iter()
            .filter(|entry| !found.get(&entry.id).copied().unwrap_or(false))
            .collect();

        if new_objects.is_empty() {
            debug!(
                "Server already has all {} objects in this window",
                batch.len()
            );
            return Ok(());
        }

        // Slice the window into sub-part bodies, each a JSON array of the
        // pending payload documents.
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::from("[");
        let mut current_bytes = 0usize;
        for entry in &new_objects {
            if current_bytes > 0 && current_bytes + entry.byte_size > self.max_part_bytes {
                current.push(']');
                parts.push(current);
                current = String::from("[");
                current_bytes = 0;
            }
            if current_bytes > 0 {
                current.push(',');
            }
            current.push_str(&entry.payload);
            current_bytes += entry.byte_size;
        }
        current.push(']');
        parts.push(current);

        for chunk in parts.chunks(self.max_multipart_count) {
            if self.cancel.is_cancelled() {
                return Err(TransportError::cancelled(&self.name));
            }
            let mut form = Form::new();
            for (index, body) in chunk.iter().enumerate() {
                let part_name = format!("batch-{}", index);
                let part = if self.compress_payloads {
                    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                    encoder.write_all(body.as_bytes())?;
                    Part::bytes(encoder.finish()?)
                        .file_name(part_name.clone())
                        .mime_str("application/gzip")
                        .map_err(TransportError::Http)?
                } else {
                    Part::text(body.clone())
                        .file_name(part_name.clone())
                        .mime_str("application/json")
                        .map_err(TransportError::Http)?
                };
                form = form.part(part_name, part);
            }

            let url = self.objects_url();
            let response = self.client.post(&url).multipart(form).send().await?;
            if !response.status().is_success() {
                return Err(TransportError::ServerStatus {
                    status: response.status().as_u16(),
                    url,
                });
            }
        }

        debug!(
            "Uploaded {} of {} objects to collection '{}'",
            new_objects.len(),
            batch.len(),
            self.collection_id
        );
        Ok(())
    }
}

struct ServerFlusher {
    inner: Arc<ServerInner>,
}

#[async_trait]
impl FlushBatch for ServerFlusher {
    async fn flush(&self, batch: Vec<QueuedObject>) -> TransportResult<()> {
        self.inner.upload_batch(batch).await
    }
}

#[async_trait]
impl ObjectStore for ServerStore {
    fn transport_name(&self) -> &str {
        &self.inner.name
    }

    fn save_object(&self, id: &str, payload: &str) -> TransportResult<()> {
        self.queue.enqueue(id, payload)
    }

    async fn get_object(&self, id: &str) -> TransportResult<Option<String>> {
        if self.inner.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.inner.name));
        }
        self.inner.get_single(id).await
    }

    async fn has_objects(&self, ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        if self.inner.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.inner.name));
        }
        self.inner.has_objects_remote(ids).await
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

    /// Native bulk copy: stream the root's closure off the server as
    /// tab-separated `id\tpayload` lines, writing still-missing children
    /// into the target as they arrive. The root is saved last, after the
    /// children's write-completion barrier has resolved.
    async fn copy_object_and_children(
        &self,
        id: &str,
        target: &dyn ObjectStore,
        on_total_children_known: Option<ChildrenCountFn<'_>>,
    ) -> TransportResult<String> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&inner.name));
        }

        let root_payload =
            inner
                .get_single(id)
                .await?
                .ok_or_else(|| TransportError::ObjectMissing {
                    transport: inner.name.clone(),
                    id: id.to_string(),
                })?;

        let manifest = ClosureManifest::parse(&root_payload);
        let children = manifest.child_ids();
        if let Some(callback) = on_total_children_known {
            callback(children.len());
        }

        let found = target.has_objects(&children).await?;
        let missing: HashSet<String> = children
            .into_iter()
            .filter(|child| !found.get(child).copied().unwrap_or(false))
            .collect();

        target.begin_write();

        if !missing.is_empty() {
            let url = format!("{}/{}", inner.objects_url(), id);
            let mut response = inner.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(TransportError::ServerStatus {
                    status: response.status().as_u16(),
                    url,
                });
            }

            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                if inner.cancel.is_cancelled() {
                    return Err(TransportError::cancelled(&inner.name));
                }
                buffer.extend_from_slice(&chunk);
                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    save_stream_line(inner, &line[..line.len() - 1], id, &missing, target)?;
                }
            }
            if !buffer.is_empty() {
                save_stream_line(inner, &buffer, id, &missing, target)?;
            }
        }

        // Children must be durable before the root becomes observable.
        target.write_complete().await?;

        target.save_object(id, &root_payload)?;
        target.write_complete().await?;
        target.end_write();

        Ok(root_payload)
    }
}

/// Parse one `id\tpayload` line of a closure stream and save it into the
/// target if it is one of the objects the target is missing. The root line
/// is skipped; the root is written separately, last.
fn save_stream_line(
    inner: &ServerInner,
    line: &[u8],
    root_id: &str,
    missing: &HashSet<String>,
    target: &dyn ObjectStore,
) -> TransportResult<()> {
    if line.is_empty() {
        return Ok(());
    }
    let text = std::str::from_utf8(line).map_err(|_| TransportError::MalformedResponse {
        transport: inner.name.clone(),
        reason: "closure stream line is not valid UTF-8".to_string(),
    })?;
    let (object_id, payload) =
        text.split_once('\t')
            .ok_or_else(|| TransportError::MalformedResponse {
                transport: inner.name.clone(),
                reason: format!("closure stream line has no tab separator: {:.40}", text),
            })?;
    if object_id == root_id || !missing.contains(object_id) {
        return Ok(());
    }
    target.save_object(object_id, payload)?;
    inner.callbacks.fire_progress(&inner.name, 1);
    Ok(())
}
