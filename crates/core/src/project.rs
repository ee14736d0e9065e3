// SPDX-License-Identifier: MIT

//! Per-recipient projection.
//!
//! Given a snapshot root and a recipient descriptor, produce the filtered
//! view the recipient is allowed to observe. The walk is deterministic:
//! keyed collections iterate in sorted order, sequences in position order.
//!
//! `Authoritative` visibility is the engine's own view: everything except
//! `internal` fields, with per-player mappings complete and masks not
//! applied. It feeds the state hash and admin exports.

use crate::identity::Recipient;
use crate::schema::{FieldShape, NodeSchema, SyncPolicy};
use crate::value::StateValue;
use std::collections::BTreeMap;

/// Who a projection is computed for.
#[derive(Debug, Clone, Copy)]
pub enum Visibility<'a> {
    /// A connected session: policies apply in full.
    Session(&'a Recipient),
    /// The engine/admin view: only `internal` is elided.
    Authoritative,
}

/// Project a root value through a node schema.
///
/// Fields absent from the state are absent from the projection; a field
/// whose policy elides it for this recipient is omitted entirely (not set
/// to null), so projections of different recipients may have different key
/// sets.
pub fn project(root: &StateValue, schema: &NodeSchema, visibility: Visibility<'_>) -> StateValue {
    let Some(map) = root.as_map() else {
        return StateValue::Map(BTreeMap::new());
    };

    let mut out = BTreeMap::new();
    for (name, field) in schema.fields() {
        let Some(value) = map.get(name) else { continue };
        match &field.policy {
            SyncPolicy::Internal => continue,
            SyncPolicy::ServerOnly => {
                if matches!(visibility, Visibility::Authoritative) {
                    out.insert(name.to_string(), project_shape(value, &field.shape, visibility));
                }
            }
            SyncPolicy::Broadcast => {
                out.insert(name.to_string(), project_shape(value, &field.shape, visibility));
            }
            SyncPolicy::PerPlayerSlice => match visibility {
                Visibility::Authoritative => {
                    out.insert(name.to_string(), project_shape(value, &field.shape, visibility));
                }
                Visibility::Session(recipient) => {
                    // Collapse the mapping to the single entry owned by the
                    // recipient's player. Missing entry projects an empty map.
                    let mut slice = BTreeMap::new();
                    if let Some(entries) = value.as_map() {
                        if let Some(entry) = entries.get(recipient.player_id.as_str()) {
                            slice.insert(
                                recipient.player_id.to_string(),
                                project_entry_shape(entry, &field.shape, visibility),
                            );
                        }
                    }
                    out.insert(name.to_string(), StateValue::Map(slice));
                }
            },
            SyncPolicy::Masked(mask) => match visibility {
                Visibility::Authoritative => {
                    out.insert(name.to_string(), project_shape(value, &field.shape, visibility));
                }
                Visibility::Session(_) => {
                    out.insert(name.to_string(), mask(value));
                }
            },
            SyncPolicy::Custom(visible) => match visibility {
                Visibility::Authoritative => {
                    out.insert(name.to_string(), project_shape(value, &field.shape, visibility));
                }
                Visibility::Session(recipient) => {
                    if visible(recipient, value) {
                        out.insert(
                            name.to_string(),
                            project_shape(value, &field.shape, visibility),
                        );
                    }
                }
            },
        }
    }
    StateValue::Map(out)
}

/// Project a value according to its declared shape, recursing into nested
/// nodes so their own policies apply.
fn project_shape(value: &StateValue, shape: &FieldShape, visibility: Visibility<'_>) -> StateValue {
    match shape {
        FieldShape::Scalar => value.clone(),
        FieldShape::List(element) => match value.as_list() {
            Some(items) => StateValue::List(
                items.iter().map(|item| project_shape(item, element, visibility)).collect(),
            ),
            None => value.clone(),
        },
        FieldShape::Map(element) => match value.as_map() {
            Some(map) => StateValue::Map(
                map.iter()
                    .map(|(key, entry)| {
                        (key.clone(), project_shape(entry, element, visibility))
                    })
                    .collect(),
            ),
            None => value.clone(),
        },
        FieldShape::Node(schema) => project(value, schema, visibility),
    }
}

/// Project one slice entry: the declared shape is the map shape, so the
/// entry projects through the map's element shape.
fn project_entry_shape(
    entry: &StateValue,
    map_shape: &FieldShape,
    visibility: Visibility<'_>,
) -> StateValue {
    match map_shape {
        FieldShape::Map(element) => project_shape(entry, element, visibility),
        // Slice fields are validated to be maps at definition time.
        other => project_shape(entry, other, visibility),
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
