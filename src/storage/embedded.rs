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

// Embedded database backend on redb

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backend::{ChildrenCountFn, ObjectStore};
use crate::error::{TransportError, TransportResult};
use crate::queue::{BatchLimits, Callbacks, ErrorFn, FlushBatch, ProgressFn, QueuedObject, WriteQueue};

const OBJECTS: TableDefinition<&str, &str> = TableDefinition::new("objects");

/// Objects drained per write transaction.
const MAX_TRANSACTION_SIZE: usize = 1000;

/// Object store backed by a single-file embedded database with one
/// `objects` table.
///
/// Offers both the queued bulk path (`save_object`, flushed in batch
/// windows by the background worker) and direct synchronous writes for
/// callers that need immediate durability (`save_object_sync`,
/// `update_object`).
///
/// Must be constructed on a Tokio runtime; the flush worker is spawned at
/// construction.
pub struct EmbeddedStore {
    name: String,
    db: Arc<Database>,
    queue: WriteQueue,
    cancel: CancellationToken,
}

impl EmbeddedStore {
    /// Open the database file at `path`, creating the file, its parent
    /// directory, and the `objects` table if absent.
    pub fn new<P: AsRef<Path>>(path: P) -> TransportResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Arc::new(Database::create(path).map_err(redb::Error::from)?);

        // Create the table up front so reads never race its existence.
        let txn = db.begin_write().map_err(redb::Error::from)?;
        txn.open_table(OBJECTS).map_err(redb::Error::from)?;
        txn.commit().map_err(redb::Error::from)?;

        debug!("Embedded store opened at {}", path.display());

        let name = "Embedded".to_string();
        let cancel = CancellationToken::new();
        let callbacks = Arc::new(Callbacks::default());
        let limits = BatchLimits {
            max_batch_bytes: usize::MAX,
            max_batch_objects: MAX_TRANSACTION_SIZE,
        };
        let flusher = Arc::new(EmbeddedFlusher { db: db.clone() });
        let queue = WriteQueue::spawn(name.clone(), limits, flusher, callbacks, cancel.clone());

        Ok(Self {
            name,
            db,
            queue,
            cancel,
        })
    }

    /// Write one object through to the database immediately, bypassing the
    /// queue.
    pub fn save_object_sync(&self, id: &str, payload: &str) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(redb::Error::from)?;
            table
                .insert(id, payload)
                .map_err(redb::Error::from)?;
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    /// Add-or-replace an object, creating the row if it was never saved.
    /// The object is subsequently retrievable either way.
    pub fn update_object(&self, id: &str, payload: &str) -> TransportResult<()> {
        self.save_object_sync(id, payload)
    }
}

struct EmbeddedFlusher {
    db: Arc<Database>,
}

#[async_trait]
impl FlushBatch for EmbeddedFlusher {
    async fn flush(&self, batch: Vec<QueuedObject>) -> TransportResult<()> {
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(redb::Error::from)?;
            for entry in &batch {
                table
                    .insert(entry.id.as_str(), entry.payload.as_str())
                    .map_err(redb::Error::from)?;
            }
        }
        txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for EmbeddedStore {
    fn transport_name(&self) -> &str {
        &self.name
    }

    fn save_object(&self, id: &str, payload: &str) -> TransportResult<()> {
        self.queue.enqueue(id, payload)
    }

    async fn get_object(&self, id: &str) -> TransportResult<Option<String>> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = txn.open_table(OBJECTS).map_err(redb::Error::from)?;
        let value = table
            .get(id)
            .map_err(redb::Error::from)?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    async fn has_objects(&self, ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        let mut result: HashMap<String, bool> =
            ids.iter().map(|id| (id.clone(), false)).collect();
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = txn.open_table(OBJECTS).map_err(redb::Error::from)?;
        for id in ids {
            if table.get(id.as_str()).map_err(redb::Error::from)?.is_some() {
                result.insert(id.clone(), true);
            }
        }
        Ok(result)
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
        &self.cancel
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
