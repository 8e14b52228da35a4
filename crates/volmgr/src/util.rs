//! Small, independently testable helpers the coordinator leans on.

use std::collections::HashMap;

/// Returns the items whose string value is not a key of `key_map`,
/// preserving input order. Used to filter a brick-set's peer list down to
/// the ones that survived (or weren't touched by) a prior operation.
pub fn remove_keys_from_list(items: &[String], key_map: &HashMap<String, String>) -> Vec<String> {
    items
        .iter()
        .filter(|item| !key_map.contains_key(item.as_str()))
        .cloned()
        .collect()
}
