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

// Configuration loading integration tests

use objsync::load_config;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
source:
  store: embedded
  embedded:
    db_path: /tmp/objsync/objects.redb

target:
  store: server
  server:
    url: http://localhost:3000
    collection_id: c0ffee
    api_token: secret
    timeout_seconds: 30
    compress_payloads: false
    flush:
      max_batch_bytes: 100000
      max_batch_objects: 500
      max_multipart_count: 2

logging:
  level: debug
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.source.store, "embedded");
    assert_eq!(
        config.source.embedded.as_ref().unwrap().db_path,
        "/tmp/objsync/objects.redb"
    );

    let server = config.target.server.as_ref().unwrap();
    assert_eq!(server.collection_id, "c0ffee");
    assert_eq!(server.api_token.as_deref(), Some("secret"));
    assert_eq!(server.timeout_seconds, 30);
    assert!(!server.compress_payloads);
    assert_eq!(server.flush.max_batch_bytes, 100000);
    assert_eq!(server.flush.max_multipart_count, 2);

    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_defaults_fill_missing_fields() {
    let file = write_config(
        r#"
source:
  store: memory

target:
  store: server
  server:
    url: http://localhost:3000
    collection_id: c1
"#,
    );

    let config = load_config(file.path()).unwrap();
    let server = config.target.server.as_ref().unwrap();
    assert_eq!(server.timeout_seconds, 60);
    assert!(server.compress_payloads);
    assert_eq!(server.flush.max_batch_bytes, 250_000);
    assert_eq!(server.flush.max_batch_objects, 1000);
    assert_eq!(server.flush.max_multipart_count, 4);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_env_substitution_in_file() {
    std::env::set_var("OBJSYNC_TEST_COLLECTION", "from-env");
    let file = write_config(
        r#"
source:
  store: memory

target:
  store: server
  server:
    url: ${OBJSYNC_TEST_URL:-http://localhost:3000}
    collection_id: ${OBJSYNC_TEST_COLLECTION}
"#,
    );

    let config = load_config(file.path()).unwrap();
    let server = config.target.server.as_ref().unwrap();
    assert_eq!(server.collection_id, "from-env");
    assert_eq!(server.url, "http://localhost:3000");

    std::env::remove_var("OBJSYNC_TEST_COLLECTION");
}

#[test]
fn test_selected_store_requires_its_section() {
    let file = write_config(
        r#"
source:
  store: disk

target:
  store: memory
"#,
    );

    let result = load_config(file.path());
    assert!(result.is_err());
}

#[test]
fn test_unknown_store_rejected() {
    let file = write_config(
        r#"
source:
  store: postgres

target:
  store: memory
"#,
    );

    let result = load_config(file.path());
    assert!(result.is_err());
    assert!(format!("{:#}", result.unwrap_err()).contains("unknown store"));
}
