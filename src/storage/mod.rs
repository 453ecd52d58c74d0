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

// Storage backend module
//
// Provides a trait-based abstraction over object stores with very
// different I/O characteristics (in-memory map, per-object files, embedded
// database, remote object service, document database), all behind the same
// save/get/has/write-complete contract.

pub mod backend;
pub mod disk;
pub mod document;
pub mod embedded;
pub mod factory;
pub mod memory;
pub mod server;

pub use backend::{ChildrenCountFn, ObjectStore};
pub use disk::DiskStore;
pub use document::DocumentStore;
pub use embedded::EmbeddedStore;
pub use factory::StoreFactory;
pub use memory::MemoryStore;
pub use server::ServerStore;
