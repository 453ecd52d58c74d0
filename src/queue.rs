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

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};

/// One pending unit of work in a store's transport queue.
#[derive(Debug, Clone)]
pub struct QueuedObject {
    pub id: String,
    pub payload: String,
    pub byte_size: usize,
}

impl QueuedObject {
    pub fn new(id: &str, payload: &str) -> Self {
        Self {
            id: id.to_string(),
            payload: payload.to_string(),
            byte_size: payload.len(),
        }
    }
}

/// Bounds of one batch window: how much a single flush may drain.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_batch_bytes: usize,
    pub max_batch_objects: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch_bytes: 250_000,
            max_batch_objects: 1000,
        }
    }
}

/// One I/O round-trip of a batch window. Implemented by each queued backend
/// (embedded database transaction, multipart upload, bulk insert).
#[async_trait]
pub trait FlushBatch: Send + Sync + 'static {
    async fn flush(&self, batch: Vec<QueuedObject>) -> TransportResult<()>;
}

pub type ProgressFn = Arc<dyn Fn(&str, usize) + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&str, &TransportError) + Send + Sync>;

/// Side-channel callbacks shared between a store and its flush worker.
/// Settable after construction; the worker reads the current value on every
/// flush cycle.
#[derive(Default)]
pub struct Callbacks {
    progress: Mutex<Option<ProgressFn>>,
    error: Mutex<Option<ErrorFn>>,
}

impl Callbacks {
    pub fn set_progress(&self, f: ProgressFn) {
        *self.progress.lock().unwrap() = Some(f);
    }

    pub fn set_error(&self, f: ErrorFn) {
        *self.error.lock().unwrap() = Some(f);
    }

    pub fn fire_progress(&self, transport: &str, count: usize) {
        let cb = self.progress.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(transport, count);
        }
    }

    pub fn fire_error(&self, transport: &str, error: &TransportError) {
        let cb = self.error.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(transport, error);
        }
    }
}

/// Transport queue with a dedicated flush worker.
///
/// Producers enqueue from any number of threads; a single worker task drains
/// bounded batch windows and hands them to the backend's [`FlushBatch`].
/// The queue is the only place data lives between `save` and durable
/// persistence: cancellation or a flush failure discards queued, not yet
/// flushed entries. That loss is the documented contract; callers needing
/// retry must re-save.
pub struct WriteQueue {
    name: String,
    tx: mpsc::UnboundedSender<QueuedObject>,
    pending: Arc<AtomicUsize>,
    saved: Arc<AtomicUsize>,
    flushed_bytes: Arc<AtomicUsize>,
    notify: Arc<Notify>,
    last_error: Arc<Mutex<Option<TransportError>>>,
    callbacks: Arc<Callbacks>,
    cancel: CancellationToken,
}

impl WriteQueue {
    /// Create the queue and spawn its flush worker on the current runtime.
    pub fn spawn(
        name: String,
        limits: BatchLimits,
        flusher: Arc<dyn FlushBatch>,
        callbacks: Arc<Callbacks>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let saved = Arc::new(AtomicUsize::new(0));
        let flushed_bytes = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let last_error = Arc::new(Mutex::new(None));

        let worker = Worker {
            name: name.clone(),
            rx,
            flusher,
            limits,
            pending: pending.clone(),
            saved: saved.clone(),
            flushed_bytes: flushed_bytes.clone(),
            notify: notify.clone(),
            last_error: last_error.clone(),
            callbacks: callbacks.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            name,
            tx,
            pending,
            saved,
            flushed_bytes,
            notify,
            last_error,
            callbacks,
            cancel,
        }
    }

    /// Non-blocking enqueue. Safe from any thread.
    pub fn enqueue(&self, id: &str, payload: &str) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::cancelled(&self.name));
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(QueuedObject::new(id, payload)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            TransportError::transport(&self.name, "flush worker has shut down")
        })?;
        Ok(())
    }

    /// Block until the queue is empty and no batch is in flight.
    ///
    /// Surfaces the last background flush error instead of silently
    /// succeeding; under cancellation it returns the cancellation error.
    pub async fn write_complete(&self) -> TransportResult<()> {
        loop {
            // Register for the wakeup before checking state, otherwise a
            // flush finishing in between is missed and the wait hangs.
            let notified = self.notify.notified();
            if self.cancel.is_cancelled() {
                return Err(TransportError::cancelled(&self.name));
            }
            if self.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(TransportError::cancelled(&self.name));
                }
                _ = notified => {}
            }
        }
        if let Some(err) = self.last_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }

    /// Reset the per-session saved-object counter.
    pub fn begin_write(&self) {
        self.saved.store(0, Ordering::SeqCst);
    }

    pub fn saved_object_count(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// (objects flushed this session, bytes flushed this session)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.saved.load(Ordering::SeqCst),
            self.flushed_bytes.load(Ordering::SeqCst),
        )
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn callbacks(&self) -> &Arc<Callbacks> {
        &self.callbacks
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

struct Worker {
    name: String,
    rx: UnboundedReceiver<QueuedObject>,
    flusher: Arc<dyn FlushBatch>,
    limits: BatchLimits,
    pending: Arc<AtomicUsize>,
    saved: Arc<AtomicUsize>,
    flushed_bytes: Arc<AtomicUsize>,
    notify: Arc<Notify>,
    last_error: Arc<Mutex<Option<TransportError>>>,
    callbacks: Arc<Callbacks>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let first = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.discard_queued();
                    break;
                }
                entry = self.rx.recv() => match entry {
                    Some(entry) => entry,
                    // All senders dropped: the store was disposed.
                    None => break,
                },
            };

            let mut batch_bytes = first.byte_size;
            let mut batch = vec![first];
            while batch.len() < self.limits.max_batch_objects
                && batch_bytes < self.limits.max_batch_bytes
            {
                match self.rx.try_recv() {
                    Ok(entry) => {
                        batch_bytes += entry.byte_size;
                        batch.push(entry);
                    }
                    Err(_) => break,
                }
            }

            if self.cancel.is_cancelled() {
                self.pending.fetch_sub(batch.len(), Ordering::SeqCst);
                self.discard_queued();
                break;
            }

            let count = batch.len();
            debug!(
                "Flushing {} objects ({} bytes) from '{}'",
                count, batch_bytes, self.name
            );

            match self.flusher.flush(batch).await {
                Ok(()) => {
                    self.saved.fetch_add(count, Ordering::SeqCst);
                    self.flushed_bytes.fetch_add(batch_bytes, Ordering::SeqCst);
                    self.callbacks.fire_progress(&self.name, count);
                }
                Err(err) => {
                    warn!("Flush failed for '{}': {}", self.name, err);
                    self.callbacks.fire_error(&self.name, &err);
                    *self.last_error.lock().unwrap() = Some(err);
                    // Abandon the unflushed remainder; callers re-save.
                    self.pending.fetch_sub(count, Ordering::SeqCst);
                    self.discard_queued();
                    self.notify.notify_waiters();
                    continue;
                }
            }

            self.pending.fetch_sub(count, Ordering::SeqCst);
            self.notify.notify_waiters();
        }
        // Wake any write_complete() waiters so they observe the final state.
        self.notify.notify_waiters();
    }

    fn discard_queued(&mut self) {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {} queued objects from '{}'", discarded, self.name);
            self.pending.fetch_sub(discarded, Ordering::SeqCst);
        }
    }
}
