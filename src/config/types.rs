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

// Configuration types for objsync

use serde::{Deserialize, Serialize};

/// Main configuration structure: the two stores a sync session moves
/// objects between, plus logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    pub source: StoreConfig,
    pub target: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration of one store with backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Backend type: "memory", "disk", "embedded", "server", "document"
    pub store: String,

    #[serde(default)]
    pub disk: Option<DiskConfig>,

    #[serde(default)]
    pub embedded: Option<EmbeddedConfig>,

    #[serde(default)]
    pub server: Option<ServerConfig>,

    #[serde(default)]
    pub document: Option<DocumentConfig>,
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            store: "memory".to_string(),
            disk: None,
            embedded: None,
            server: None,
            document: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiskConfig {
    /// Root directory; one file per object is written under it.
    pub root_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddedConfig {
    /// Path of the single database file.
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub url: String,
    pub collection_id: String,
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_compress")]
    pub compress_payloads: bool,

    #[serde(default)]
    pub flush: FlushPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            collection_id: "objects".to_string(),
            api_token: None,
            timeout_seconds: default_timeout(),
            compress_payloads: default_compress(),
            flush: FlushPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentConfig {
    pub url: String,
    /// Fixed database/collection the `{hash, content}` documents land in.
    pub database: String,
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub flush: FlushPolicy,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5984".to_string(),
            database: "objects".to_string(),
            api_token: None,
            timeout_seconds: default_timeout(),
            flush: FlushPolicy::default(),
        }
    }
}

/// Bounds of one batch window flushed in a single I/O round-trip.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlushPolicy {
    /// Maximum payload bytes per batch window (and per multipart sub-part).
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Maximum objects per batch window.
    #[serde(default = "default_max_batch_objects")]
    pub max_batch_objects: usize,

    /// Maximum sub-parts per multipart upload.
    #[serde(default = "default_max_multipart_count")]
    pub max_multipart_count: usize,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_batch_bytes: default_max_batch_bytes(),
            max_batch_objects: default_max_batch_objects(),
            max_multipart_count: default_max_multipart_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_timeout() -> u64 { 60 }
fn default_compress() -> bool { true }
fn default_max_batch_bytes() -> usize { 250_000 }
fn default_max_batch_objects() -> usize { 1000 }
fn default_max_multipart_count() -> usize { 4 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
