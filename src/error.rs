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

// Error taxonomy for transport operations

/// Errors raised by object stores and the graph-copy operation.
///
/// Note: a missing object on `get_object` is NOT an error. Reads return
/// `Ok(None)` and leave the null check to the caller. Errors here are
/// failures of the store itself.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A source store could not supply an object it was asked for, e.g.
    /// copying an object out of a store it was never written to. Carries
    /// the name of the store that failed so callers can report it.
    #[error("store '{transport}' could not supply object {id}")]
    ObjectMissing { transport: String, id: String },

    /// Network or database failure during a background flush or a remote
    /// call. Carries the name of the store the failure originated from.
    #[error("transport error in '{transport}': {message}")]
    Transport { transport: String, message: String },

    /// The operation observed the store's cancellation token. Queued but
    /// unflushed objects have been discarded. Never conflated with I/O
    /// failures.
    #[error("operation cancelled in '{transport}'")]
    Cancelled { transport: String },

    /// The remote peer answered with a non-success status code.
    #[error("server returned {status} for {url}")]
    ServerStatus { status: u16, url: String },

    /// Malformed data coming back from a peer (bad stream line, bad JSON).
    #[error("malformed response from '{transport}': {reason}")]
    MalformedResponse { transport: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    pub fn transport(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            transport: name.into(),
            message: message.to_string(),
        }
    }

    pub fn cancelled(name: impl Into<String>) -> Self {
        Self::Cancelled {
            transport: name.into(),
        }
    }

    /// True if this error is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
