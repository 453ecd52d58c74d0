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

// Content-addressed object graph transport
//
// This crate moves immutable, hash-keyed object graphs between storage
// backends:
// - A uniform store contract (save/get/has-objects/write-complete) over
//   in-memory, on-disk, embedded-database, remote-server, and
//   document-store backends
// - Queued writes drained in bounded batch windows by one background
//   flush worker per store, with content-addressable dedup against
//   remote peers
// - A graph-copy operation replicating an object and its transitive
//   closure between any two stores, children durable before the root

pub mod closure;
pub mod config;
pub mod error;
pub mod graph;
pub mod queue;
pub mod storage;

// Re-export main types
pub use closure::ClosureManifest;
pub use config::{load_config, load_config_with_env, SyncConfig};
pub use error::{TransportError, TransportResult};
pub use graph::copy_object_and_children;
pub use queue::{BatchLimits, QueuedObject, WriteQueue};
pub use storage::{
    DiskStore, DocumentStore, EmbeddedStore, MemoryStore, ObjectStore, ServerStore, StoreFactory,
};
