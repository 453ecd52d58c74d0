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

// On-disk backend: one file per object under a root directory

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backend::{ChildrenCountFn, ObjectStore};
use crate::error::{TransportError, TransportResult};
use crate::queue::{Callbacks, ErrorFn, ProgressFn};

/// Object store writing each object to its own file, named by id, under a
/// root directory. Saves are durable immediately; there is no queue.
pub struct DiskStore {
    name: String,
    root: PathBuf,
    saved: AtomicUsize,
    callbacks: Arc<Callbacks>,
    cancel: CancellationToken,
}

impl DiskStore {
    /// Open a store rooted at `root`, creating the directory if absent.
    /// Creation is idempotent; an existing directory is reused.
    pub fn new<P: AsRef<Path>>(root: P) -> TransportResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        debug!("Disk store rooted at {}", root.display());
        Ok(Self {
            name: "Disk".to_string(),
            root,
            saved: AtomicUsize::new(0),
            callbacks: Arc::new(Callbacks::default()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Add-or-replace an object, same as a fresh save.
    pub fn update_object(&self, id: &str, payload: &str) -> TransportResult<()> {
        self.save_object(id, payload)
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    fn transport_name(&self) -> &str {
        &self.name
    }

    fn save_object(&self, id: &str, payload: &str) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        std::fs::write(self.object_path(id), payload)?;
        self.saved.fetch_add(1, Ordering::SeqCst);
        self.callbacks.fire_progress(&self.name, 1);
        Ok(())
    }

    async fn get_object(&self, id: &str) -> TransportResult<Option<String>> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        match tokio::fs::read_to_string(self.object_path(id)).await {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn has_objects(&self, ids: &[String]) -> TransportResult<HashMap<String, bool>> {
        let mut result = HashMap::with_capacity(ids.len());
        for id in ids {
            result.insert(id.clone(), self.object_path(id).is_file());
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (DiskStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path().join("objects")).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_root_directory_created_on_construction() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("objects");
        assert!(!root.exists());

        let _store = DiskStore::new(&root).unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_construction_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("objects");
        let _first = DiskStore::new(&root).unwrap();
        let _second = DiskStore::new(&root).unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.get_object("a1").await.unwrap(), None);

        store.save_object("a1", "hello").unwrap();
        store.write_complete().await.unwrap();
        assert_eq!(store.get_object("a1").await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_update_replaces_content() {
        let (store, _temp_dir) = create_test_store();
        store.save_object("a1", "first").unwrap();
        store.update_object("a1", "second").unwrap();
        assert_eq!(
            store.get_object("a1").await.unwrap().as_deref(),
            Some("second")
        );
    }
}
