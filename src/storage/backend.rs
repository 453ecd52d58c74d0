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

// Store contract implemented by every backend

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportResult};
use crate::queue::{ErrorFn, ProgressFn};

/// Callback invoked once the total number of children to transfer is known.
pub type ChildrenCountFn<'a> = &'a (dyn Fn(usize) + Send + Sync);

/// Hash-keyed object store.
///
/// This trait defines the contract every persistence backend implements
/// (memory, disk, embedded database, remote server, document store).
/// Implementations must satisfy these invariants:
/// - Objects are immutable once written; the same content always carries
///   the same id. Re-saving an id with different content is unsupported.
/// - `save_object` enqueues and returns immediately; it is safe to call
///   concurrently from many producers.
/// - Every id reported present by `has_objects` is retrievable through
///   `get_object` with a byte-identical payload.
/// - Between `save_object` and durable persistence, data exists only in the
///   store's internal queue. Cancellation or a flush failure discards the
///   queued, unflushed entries; that loss is part of the contract.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable store name, used in progress/error reporting.
    fn transport_name(&self) -> &str;

    /// Prepare remote state the store needs (create the collection or
    /// database if needed). Local stores prepare in their constructors and
    /// keep the default no-op.
    async fn initialize(&self) -> TransportResult<()> {
        Ok(())
    }

    /// Enqueue an object for persistence. Non-blocking.
    fn save_object(&self, id: &str, payload: &str) -> TransportResult<()>;

    /// Fetch an object from `source` and enqueue it here.
    ///
    /// Fails with [`TransportError::ObjectMissing`] naming `source` if it
    /// cannot supply the object (e.g. copying an object from a store it was
    /// never written to).
    async fn save_object_from(
        &self,
        id: &str,
        source: &dyn ObjectStore,
    ) -> TransportResult<()> {
        match source.get_object(id).await? {
            Some(payload) => self.save_object(id, &payload),
            None => Err(TransportError::ObjectMissing {
                transport: source.transport_name().to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Read an object. `Ok(None)` is the not-found sentinel; a missing id
    /// is never an error.
    async fn get_object(&self, id: &str) -> TransportResult<Option<String>>;

    /// Batched existence check. The result has exactly one entry per input
    /// id, including ids the store has never seen.
    async fn has_objects(&self, ids: &[String]) -> TransportResult<HashMap<String, bool>>;

    /// Block until the queue is empty and no batch is in flight.
    ///
    /// Surfaces the last background flush error rather than silently
    /// succeeding; under cancellation it returns a cancellation error.
    async fn write_complete(&self) -> TransportResult<()>;

    /// Open a logical write session: resets the saved-object counter.
    fn begin_write(&self);

    /// Close a logical write session. No-op marker.
    fn end_write(&self) {}

    /// Objects persisted since the last `begin_write`.
    fn saved_object_count(&self) -> usize;

    /// Progress callback `(transport_name, objects_flushed)`, fired after
    /// each successful flush.
    fn set_on_progress(&self, f: ProgressFn);

    /// Error callback `(transport_name, error)`, fired on recoverable
    /// background failures instead of unwinding across the worker boundary.
    fn set_on_error(&self, f: ErrorFn);

    /// Token observed by every long-running operation of this store.
    fn cancellation(&self) -> &CancellationToken;

    /// Replicate the object `id` and its full closure from this store into
    /// `target`, skipping children the target already holds. Children are
    /// durable in the target before the root is saved, so a caller that
    /// observes the root present can retrieve the whole closure.
    ///
    /// Returns the root object's payload.
    async fn copy_object_and_children(
        &self,
        id: &str,
        target: &dyn ObjectStore,
        on_total_children_known: Option<ChildrenCountFn<'_>>,
    ) -> TransportResult<String>;
}
