//! Reconstruct every ancestral payload of a message by walking its cascade
//! id prefix by prefix against storage (spec §4.6).

use cascade_core::{cascade_id, Message};
use cascade_storage::Storage;
use serde_json::{Map, Value};

use crate::error::Result;

/// Unroll a single path (no merge roots), accumulating `step_name ->
/// payload` for every prefix that corresponds to a persisted message.
/// Repeated step names on the path are suffixed `_0`, `_1`, ... on their
/// second and later occurrence, matching the Python original.
async fn unroll_path(storage: &dyn Storage, path: &str) -> Result<Map<String, Value>> {
    let mut result = Map::new();
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut prefix: Vec<&str> = Vec::new();

    for token in path.split('/') {
        if token.is_empty() {
            continue;
        }
        prefix.push(token);
        let full_id = prefix.join("/");

        if let Some(msg) = storage.get(&full_id).await? {
            let step_name = cascade_id::parse_token(token)
                .map(|t| t.step_name)
                .unwrap_or_else(|_| token.to_string());

            let key = if result.contains_key(&step_name) {
                let count = *seen.get(&step_name).unwrap_or(&0);
                seen.insert(step_name.clone(), count + 1);
                format!("{step_name}_{count}")
            } else {
                step_name
            };
            result.insert(key, msg.payload);
        }
    }

    Ok(result)
}

/// Unroll `message`'s full provenance: merge roots are recorded under
/// synthetic keys `root0`, `root1`, ..., and the message's own path is
/// flattened directly into the top-level map.
pub async fn unroll(storage: &dyn Storage, message: &Message) -> Result<Map<String, Value>> {
    let (roots, path) = cascade_id::split_roots(&message.cascade_id);

    let mut result = Map::new();
    for (i, root) in roots.iter().enumerate() {
        let root_result = unroll_path(storage, root).await?;
        result.insert(format!("root{i}"), Value::Object(root_result));
    }

    let path_result = unroll_path(storage, &path).await?;
    result.extend(path_result);

    Ok(result)
}
