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

// In-memory backend

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::backend::{ChildrenCountFn, ObjectStore};
use crate::error::{TransportError, TransportResult};
use crate::queue::{Callbacks, ErrorFn, ProgressFn};

/// In-memory object store. The flush is the map insert itself, so saves are
/// durable immediately. Mainly a copy target in tests and a local cache.
pub struct MemoryStore {
    name: String,
    objects: DashMap<String, String>,
    saved: AtomicUsize,
    callbacks: Arc<Callbacks>,
    cancel: CancellationToken,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_name("Memory")
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: DashMap::new(),
            saved: AtomicUsize::new(0),
            callbacks: Arc::new(Callbacks::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Number of objects held.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn transport_name(&self) -> &str {
        &self.name
    }

    fn save_object(&self, id: &str, payload: &str) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        self.objects.insert(id.to_string(), payload.to_string());
        self.saved.fetch_add(1, Ordering::SeqCst);
        self.callbacks.fire_progress(&self.name, 1);
        Ok(())
    }

    async fn get_object(&self, id: &str) -> TransportResult<Option<String>> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        Ok(self.objects.get(id).map(|entry| entry.value().clone()))
    }

    async fn has_objects(&self, ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        let mut result = HashMap::with_capacity(ids.len());
        for id in ids {
            result.insert(id.clone(), self.objects.contains_key(id));
        }
        Ok(result)
    }

    async fn write_complete(&self) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        Ok(())
    }

    fn begin_write(&self) {
        self.saved.store(0, Ordering::SeqCst);
    }

    fn saved_object_count(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    fn set_on_progress(&self, f: ProgressFn) {
        self.callbacks.set_progress(f);
    }

    fn set_on_error(&self, f: ErrorFn) {
        self.callbacks.set_error(f);
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
