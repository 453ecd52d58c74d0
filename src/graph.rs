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

// Graph-copy operation: replicate an object and its closure between stores

use tracing::debug;

use crate::closure::ClosureManifest;
use crate::error::{TransportError, TransportResult};
use crate::storage::backend::{ChildrenCountFn, ObjectStore};

/// Copy the object `id` and every object in its closure from `source` into
/// `target`, transferring only what the target is missing.
///
/// Ordering contract: the children's write-completion barrier resolves
/// before the root is saved, and the root gets its own barrier. Once the
/// root is observable in the target, the whole closure is retrievable.
///
/// Backends with a native bulk protocol override
/// [`ObjectStore::copy_object_and_children`]; everything else delegates
/// here.
pub async fn copy_object_and_children<S>(
    source: &S,
    id: &str,
    target: &dyn ObjectStore,
    on_total_children_known: Option<ChildrenCountFn<'_>>,
) -> TransportResult<String>
where
    S: ObjectStore + ?Sized,
{
    if source.cancellation().is_cancelled() {
        return Err(TransportError::cancelled(source.transport_name()));
    }

    let root_payload = source.get_object(id).await?.ok_or_else(|| {
        TransportError::ObjectMissing {
            transport: source.transport_name().to_string(),
            id: id.to_string(),
        }
    })?;

    let manifest = ClosureManifest::parse(&root_payload);
    let children = manifest.child_ids();
    if let Some(callback) = on_total_children_known {
        callback(children.len());
    }

    let found = target.has_objects(&children).await?;
    let missing: Vec<String> = children
        .into_iter()
        .filter(|child| !found.get(child).copied().unwrap_or(false))
        .collect();

    debug!(
        "Copying '{}' from '{}' to '{}': {} of {} children missing",
        id,
        source.transport_name(),
        target.transport_name(),
        missing.len(),
        manifest.len()
    );

    target.begin_write();

    for child_id in &missing {
        if source.cancellation().is_cancelled() {
            return Err(TransportError::cancelled(source.transport_name()));
        }
        match source.get_object(child_id).await? {
            Some(payload) => target.save_object(child_id, &payload)?,
            None => {
                return Err(TransportError::ObjectMissing {
                    transport: source.transport_name().to_string(),
                    id: child_id.clone(),
                })
            }
        }
    }

    // Children must be durable before the root becomes observable.
    target.write_complete().await?;

    target.save_object(id, &root_payload)?;
    target.write_complete().await?;
    target.end_write();

    Ok(root_payload)
}
