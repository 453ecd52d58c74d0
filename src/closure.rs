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

// Closure manifest: the set of child object ids embedded in a payload

use serde::Deserialize;
use std::collections::HashMap;

/// The partial shape of an object payload the transport layer cares about:
/// a `__closure` member mapping descendant ids to an opaque depth value.
/// Everything else in the payload is opaque to this layer.
#[derive(Debug, Default, Deserialize)]
struct ClosureEnvelope {
    #[serde(default)]
    __closure: HashMap<String, i64>,
}

/// Typed view of a payload's transitive reference set, extracted once at
/// parse time.
#[derive(Debug, Default, Clone)]
pub struct ClosureManifest {
    children: HashMap<String, i64>,
}

impl ClosureManifest {
    /// Parse the closure manifest out of a serialized object payload.
    ///
    /// A payload without a `__closure` member has no children. A payload
    /// that is not a JSON object at all also has no children; the transport
    /// layer never rejects opaque content.
    pub fn parse(payload: &str) -> Self {
        match serde_json::from_str::<ClosureEnvelope>(payload) {
            Ok(envelope) => Self {
                children: envelope.__closure,
            },
            Err(_) => Self::default(),
        }
    }

    /// Ids of all descendants referenced by the payload.
    pub fn child_ids(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// Depth/order value recorded for a child, if present.
    pub fn depth_of(&self, id: &str) -> Option<i64> {
        self.children.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
