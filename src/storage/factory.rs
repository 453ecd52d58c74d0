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

// Store factory for creating backends from configuration

use super::backend::ObjectStore;
use super::disk::DiskStore;
use super::document::DocumentStore;
use super::embedded::EmbeddedStore;
use super::memory::MemoryStore;
use super::server::ServerStore;
use crate::config::StoreConfig;
use anyhow::{bail, Result};
use std::sync::Arc;

pub struct StoreFactory;

impl StoreFactory {
    /// Create an object store from configuration.
    ///
    /// Queued backends spawn their flush worker here, so this must run on
    /// a Tokio runtime. Call `initialize()` on the result before first use;
    /// remote backends create their collection/database there.
    pub fn create(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
        match config.store.as_str() {
            "memory" => Ok(Arc::new(MemoryStore::new())),

            "disk" => {
                let disk_config = config
                    .disk
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Disk config missing"))?;

                let store = DiskStore::new(&disk_config.root_path)?;
                Ok(Arc::new(store))
            }

            "embedded" => {
                let embedded_config = config
                    .embedded
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Embedded config missing"))?;

                let store = EmbeddedStore::new(&embedded_config.db_path)?;
                Ok(Arc::new(store))
            }

            "server" => {
                let server_config = config
                    .server
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Server config missing"))?;

                let store = ServerStore::new(server_config.clone())?;
                Ok(Arc::new(store))
            }

            "document" => {
                let document_config = config
                    .document
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Document config missing"))?;

                let store = DocumentStore::new(document_config.clone())?;
                Ok(Arc::new(store))
            }

            unknown => bail!(
                "Unknown store: '{}'. Supported: memory, disk, embedded, server, document",
                unknown
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiskConfig, ServerConfig};

    #[tokio::test]
    async fn test_create_memory_store() {
        let store = StoreFactory::create(&StoreConfig::memory());
        assert!(store.is_ok());
        assert_eq!(store.unwrap().transport_name(), "Memory");
    }

    #[tokio::test]
    async fn test_create_disk_store() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store_config = StoreConfig {
            store: "disk".to_string(),
            disk: Some(DiskConfig {
                root_path: temp_dir.path().join("objects").to_string_lossy().to_string(),
            }),
            ..StoreConfig::memory()
        };

        let store = StoreFactory::create(&store_config);
        assert!(store.is_ok());
        assert_eq!(store.unwrap().transport_name(), "Disk");
    }

    #[tokio::test]
    async fn test_create_server_store() {
        let store_config = StoreConfig {
            store: "server".to_string(),
            server: Some(ServerConfig::default()),
            ..StoreConfig::memory()
        };

        let store = StoreFactory::create(&store_config);
        assert!(store.is_ok());
        assert_eq!(store.unwrap().transport_name(), "Remote");
    }

    #[tokio::test]
    async fn test_create_unknown_store() {
        let store_config = StoreConfig {
            store: "unknown_backend".to_string(),
            ..StoreConfig::memory()
        };

        let store = StoreFactory::create(&store_config);
        assert!(store.is_err());
        if let Err(e) = store {
            assert!(e.to_string().contains("Unknown store"));
        }
    }
}
