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

// Server store tests against an in-process object service

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use flate2::read::GzDecoder;
use objsync::config::{FlushPolicy, ServerConfig};
use objsync::{ClosureManifest, MemoryStore, ObjectStore, ServerStore};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared state of the in-process object service.
#[derive(Clone, Default)]
struct ObjectService {
    objects: Arc<Mutex<HashMap<String, String>>>,
    upload_requests: Arc<AtomicUsize>,
    inserted_ids: Arc<Mutex<Vec<String>>>,
}

impl ObjectService {
    fn insert_direct(&self, id: &str, payload: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(id.to_string(), payload.to_string());
    }
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct DiffRequest {
    objects: Vec<String>,
}

async fn post_objects(
    State(service): State<ObjectService>,
    Path(_collection): Path<String>,
    mut multipart: Multipart,
) -> StatusCode {
    service.upload_requests.fetch_add(1, Ordering::SeqCst);
    while let Some(field) = multipart.next_field().await.unwrap() {
        let gzipped = field
            .content_type()
            .map(|ct| ct.contains("gzip"))
            .unwrap_or(false);
        let data = field.bytes().await.unwrap();
        let body = if gzipped {
            let mut decoder = GzDecoder::new(&data[..]);
            let mut text = String::new();
            decoder.read_to_string(&mut text).unwrap();
            text
        } else {
            String::from_utf8(data.to_vec()).unwrap()
        };

        // Each part is a JSON array of payload documents; keep the raw text
        // of each element so stored payloads stay byte-identical.
        let docs: Vec<Box<RawValue>> = serde_json::from_str(&body).unwrap();
        for raw in docs {
            let doc: IdOnly = serde_json::from_str(raw.get()).unwrap();
            service.inserted_ids.lock().unwrap().push(doc.id.clone());
            service
                .objects
                .lock()
                .unwrap()
                .insert(doc.id, raw.get().to_string());
        }
    }
    StatusCode::CREATED
}

async fn get_single(
    State(service): State<ObjectService>,
    Path((_collection, id)): Path<(String, String)>,
) -> Result<String, StatusCode> {
    service
        .objects
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

/// Streamed closure download: newline-delimited `id\tpayload` lines for the
/// root and every child in its closure, children first.
async fn get_closure(
    State(service): State<ObjectService>,
    Path((_collection, id)): Path<(String, String)>,
) -> Result<String, StatusCode> {
    let objects = service.objects.lock().unwrap();
    let root = objects.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    let mut body = String::new();
    for child_id in ClosureManifest::parse(root).child_ids() {
        if let Some(payload) = objects.get(&child_id) {
            body.push_str(&child_id);
            body.push('\t');
            body.push_str(payload);
            body.push('\n');
        }
    }
    body.push_str(&id);
    body.push('\t');
    body.push_str(root);
    body.push('\n');
    Ok(body)
}

/// Existence check. Deliberately reports only present ids, leaving absent
/// ones out of the response; the client fills those in as false.
async fn post_diff(
    State(service): State<ObjectService>,
    Path(_collection): Path<String>,
    Json(request): Json<DiffRequest>,
) -> Json<HashMap<String, bool>> {
    let objects = service.objects.lock().unwrap();
    let mut found = HashMap::new();
    for id in request.objects {
        if objects.contains_key(&id) {
            found.insert(id, true);
        }
    }
    Json(found)
}

async fn spawn_service() -> (ObjectService, String) {
    let service = ObjectService::default();
    let app = Router::new()
        .route("/objects/:collection", post(post_objects))
        .route("/objects/:collection/:id/single", get(get_single))
        .route("/objects/:collection/:id", get(get_closure))
        .route("/api/diff/:collection", post(post_diff))
        .with_state(service.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (service, format!("http://{}", addr))
}

fn test_config(url: &str, compress: bool) -> ServerConfig {
    ServerConfig {
        url: url.to_string(),
        collection_id: "test-collection".to_string(),
        api_token: Some("test-token".to_string()),
        timeout_seconds: 5,
        compress_payloads: compress,
        flush: FlushPolicy::default(),
    }
}

#[tokio::test]
async fn test_server_round_trip() {
    let (_service, url) = spawn_service().await;
    let store = ServerStore::new(test_config(&url, false)).unwrap();

    assert_eq!(store.get_object("a1").await.unwrap(), None);

    store.save_object("a1", r#"{"id":"a1","value":1}"#).unwrap();
    store.save_object("b2", r#"{"id":"b2","value":2}"#).unwrap();
    store.write_complete().await.unwrap();

    assert_eq!(
        store.get_object("a1").await.unwrap().as_deref(),
        Some(r#"{"id":"a1","value":1}"#)
    );
    assert_eq!(
        store.get_object("b2").await.unwrap().as_deref(),
        Some(r#"{"id":"b2","value":2}"#)
    );

    let ids = vec!["a1".to_string(), "b2".to_string(), "c3".to_string()];
    let found = store.has_objects(&ids).await.unwrap();
    assert_eq!(found.len(), 3);
    assert!(found["a1"]);
    assert!(found["b2"]);
    assert!(!found["c3"]);
}

#[tokio::test]
async fn test_server_gzip_round_trip() {
    let (_service, url) = spawn_service().await;
    let store = ServerStore::new(test_config(&url, true)).unwrap();

    store.save_object("a1", r#"{"id":"a1","value":1}"#).unwrap();
    store.write_complete().await.unwrap();

    assert_eq!(
        store.get_object("a1").await.unwrap().as_deref(),
        Some(r#"{"id":"a1","value":1}"#)
    );
}

#[tokio::test]
async fn test_upload_skips_objects_server_already_has() {
    let (service, url) = spawn_service().await;
    service.insert_direct("a1", r#"{"id":"a1","value":1}"#);

    let store = ServerStore::new(test_config(&url, false)).unwrap();
    store.save_object("a1", r#"{"id":"a1","value":1}"#).unwrap();
    store.save_object("b2", r#"{"id":"b2","value":2}"#).unwrap();
    store.write_complete().await.unwrap();

    // Only the object the server was missing went over the wire.
    let inserted = service.inserted_ids.lock().unwrap().clone();
    assert_eq!(inserted, vec!["b2".to_string()]);
}

#[tokio::test]
async fn test_all_present_window_sends_no_upload() {
    let (service, url) = spawn_service().await;
    service.insert_direct("a1", r#"{"id":"a1"}"#);

    let store = ServerStore::new(test_config(&url, false)).unwrap();
    store.save_object("a1", r#"{"id":"a1"}"#).unwrap();
    store.write_complete().await.unwrap();

    assert_eq!(service.upload_requests.load(Ordering::SeqCst), 0);
    assert!(service.inserted_ids.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_callback_after_flush() {
    let (_service, url) = spawn_service().await;
    let store = ServerStore::new(test_config(&url, false)).unwrap();

    let progress = Arc::new(AtomicUsize::new(0));
    let seen = progress.clone();
    store.set_on_progress(Arc::new(move |_name, count| {
        seen.fetch_add(count, Ordering::SeqCst);
    }));

    store.save_object("a1", r#"{"id":"a1"}"#).unwrap();
    store.write_complete().await.unwrap();

    assert!(progress.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_unreachable_server_surfaces_error_and_discards() {
    // Bind a port, then drop the listener so connections are refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let store = ServerStore::new(test_config(&url, false)).unwrap();

    let errors = Arc::new(AtomicUsize::new(0));
    let seen = errors.clone();
    store.set_on_error(Arc::new(move |_name, _error| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    store.save_object("a1", r#"{"id":"a1"}"#).unwrap();
    let result = store.write_complete().await;

    assert!(result.is_err());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    // The queue was abandoned; a later barrier has nothing left to wait on.
    store.write_complete().await.unwrap();
}

#[tokio::test]
async fn test_copy_object_and_children_streams_into_target() {
    let (service, url) = spawn_service().await;

    // Root plus five children live on the server.
    let mut closure_entries = Vec::new();
    for i in 0..5 {
        let child_id = format!("child-{}", i);
        service.insert_direct(
            &child_id,
            &format!("{{\"id\":\"child-{}\",\"value\":{}}}", i, i),
        );
        closure_entries.push(format!("\"child-{}\":1", i));
    }
    let root_payload = format!(
        "{{\"id\":\"root\",\"__closure\":{{{}}}}}",
        closure_entries.join(",")
    );
    service.insert_direct("root", &root_payload);

    let store = ServerStore::new(test_config(&url, false)).unwrap();
    let target = MemoryStore::with_name("Target");

    // The target already holds one child; it must not be re-transferred,
    // but it must still be present afterwards.
    target
        .save_object("child-0", r#"{"id":"child-0","value":0}"#)
        .unwrap();

    let progress = Arc::new(AtomicUsize::new(0));
    let seen = progress.clone();
    store.set_on_progress(Arc::new(move |_name, count| {
        seen.fetch_add(count, Ordering::SeqCst);
    }));

    let known = Arc::new(AtomicUsize::new(0));
    let known_cb = known.clone();
    let on_known = move |count: usize| known_cb.store(count, Ordering::SeqCst);

    let returned = store
        .copy_object_and_children("root", &target, Some(&on_known))
        .await
        .unwrap();

    assert_eq!(returned, root_payload);
    assert_eq!(known.load(Ordering::SeqCst), 5);
    // One progress tick per streamed line actually saved.
    assert_eq!(progress.load(Ordering::SeqCst), 4);

    assert_eq!(
        target.get_object("root").await.unwrap(),
        Some(root_payload)
    );
    for i in 0..5 {
        let child_id = format!("child-{}", i);
        assert_eq!(
            target.get_object(&child_id).await.unwrap().as_deref(),
            Some(format!("{{\"id\":\"child-{}\",\"value\":{}}}", i, i).as_str())
        );
    }
}

#[tokio::test]
async fn test_copy_missing_root_is_object_missing() {
    let (_service, url) = spawn_service().await;
    let store = ServerStore::new(test_config(&url, false)).unwrap();
    let target = MemoryStore::new();

    let err = store
        .copy_object_and_children("ghost", &target, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        objsync::TransportError::ObjectMissing { .. }
    ));
}
