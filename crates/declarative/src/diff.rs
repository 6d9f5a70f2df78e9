//! Diff computation between current and desired resource fields

use crate::resource::ResourceDesc;
use crate::types::{Properties, UpdateAction};
use serde_json::Value;

fn differs(field: &str, current: &Properties, desired: &Properties) -> bool {
    match desired.get(field) {
        Some(want) => current.get(field).unwrap_or(&Value::Null) != want,
        None => false,
    }
}

/// Decide how a resource must change to match its declaration
///
/// Only fields bound in `desired` are compared. A changed immutable field
/// wins over any number of changed mutable fields.
pub fn compare(desc: &dyn ResourceDesc, current: &Properties, desired: &Properties) -> UpdateAction {
    if desc
        .immutable_fields()
        .iter()
        .any(|field| differs(field, current, desired))
    {
        return UpdateAction::Recreate;
    }

    if desc
        .mutable_fields()
        .iter()
        .any(|field| differs(field, current, desired))
    {
        return UpdateAction::Modify;
    }

    UpdateAction::NoChange
}

/// Immutable fields whose desired value differs from the current one
pub fn changed_immutable_fields(
    desc: &dyn ResourceDesc,
    current: &Properties,
    desired: &Properties,
) -> Vec<String> {
    desc.immutable_fields()
        .iter()
        .filter(|field| differs(field, current, desired))
        .cloned()
        .collect()
}

/// Reduce `desired` to what an update may send
///
/// Mutable fields are always kept; immutable fields only when changed.
pub fn filter(desc: &dyn ResourceDesc, current: &Properties, desired: &Properties) -> Properties {
    let mut result = Properties::new();
    for field in desc.mutable_fields() {
        if let Some(value) = desired.get(field) {
            result.insert(field.clone(), value.clone());
        }
    }
    for field in desc.immutable_fields() {
        if differs(field, current, desired)
            && let Some(value) = desired.get(field)
        {
            result.insert(field.clone(), value.clone());
        }
    }
    result
}
