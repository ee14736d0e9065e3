// SPDX-License-Identifier: MIT

//! State schemas: per-field sync policies and value shapes.
//!
//! A `NodeSchema` classifies every stored field of a node at definition
//! time. Field order is canonical (alphabetical) because the backing map is
//! sorted; codecs on both ends rely on this. Values that do not conform to
//! their declared shape are rejected by `validate`; unclassified stored
//! state is a loader-time error, not a runtime surprise.

use crate::identity::Recipient;
use crate::value::StateValue;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Projection function for `masked` fields.
pub type MaskFn = Arc<dyn Fn(&StateValue) -> StateValue + Send + Sync>;

/// Per-recipient inclusion predicate for `custom` fields.
pub type VisibilityFn = Arc<dyn Fn(&Recipient, &StateValue) -> bool + Send + Sync>;

/// Synchronization policy declared per field at type-definition time.
#[derive(Clone)]
pub enum SyncPolicy {
    /// Same value sent to every session observing the Land.
    Broadcast,
    /// Mapping keyed by PlayerId; each session receives only its own entry.
    PerPlayerSlice,
    /// Value is transformed through a projection function before send.
    Masked(MaskFn),
    /// A predicate decides, per session, whether the field is included.
    Custom(VisibilityFn),
    /// Tracked and recorded by the engine but never sent over the wire.
    ServerOnly,
    /// Not tracked by the engine at all; purely local.
    Internal,
}

impl SyncPolicy {
    /// Stable name used in schema documents and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::PerPlayerSlice => "perPlayerSlice",
            Self::Masked(_) => "masked",
            Self::Custom(_) => "custom",
            Self::ServerOnly => "serverOnly",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Debug for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared shape of a field's value.
#[derive(Debug, Clone)]
pub enum FieldShape {
    /// Terminal value: null, bool, int, float or string.
    Scalar,
    /// Ordered sequence of elements of one shape.
    List(Box<FieldShape>),
    /// Keyed mapping with runtime-discovered string keys.
    Map(Box<FieldShape>),
    /// Nested node with its own classified fields.
    Node(Arc<NodeSchema>),
}

impl FieldShape {
    pub fn list_of(element: FieldShape) -> Self {
        Self::List(Box::new(element))
    }

    pub fn map_of(element: FieldShape) -> Self {
        Self::Map(Box::new(element))
    }

    pub fn node(schema: NodeSchema) -> Self {
        Self::Node(Arc::new(schema))
    }

    fn describe(&self) -> serde_json::Value {
        match self {
            Self::Scalar => json!("scalar"),
            Self::List(element) => json!({ "list": element.describe() }),
            Self::Map(element) => json!({ "map": element.describe() }),
            Self::Node(schema) => schema.describe(),
        }
    }
}

/// One classified field: policy + shape.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub policy: SyncPolicy,
    pub shape: FieldShape,
}

impl FieldSchema {
    pub fn broadcast(shape: FieldShape) -> Self {
        Self { policy: SyncPolicy::Broadcast, shape }
    }

    /// Declares a per-player sliced mapping. The shape is always a map; the
    /// argument is the per-entry shape.
    pub fn per_player(entry: FieldShape) -> Self {
        Self { policy: SyncPolicy::PerPlayerSlice, shape: FieldShape::map_of(entry) }
    }

    pub fn masked(shape: FieldShape, mask: impl Fn(&StateValue) -> StateValue + Send + Sync + 'static) -> Self {
        Self { policy: SyncPolicy::Masked(Arc::new(mask)), shape }
    }

    pub fn custom(
        shape: FieldShape,
        visible: impl Fn(&Recipient, &StateValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { policy: SyncPolicy::Custom(Arc::new(visible)), shape }
    }

    pub fn server_only(shape: FieldShape) -> Self {
        Self { policy: SyncPolicy::ServerOnly, shape }
    }

    pub fn internal(shape: FieldShape) -> Self {
        Self { policy: SyncPolicy::Internal, shape }
    }
}

/// Schema violations, reported at definition/load time or on commit.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field {field:?} is not declared in the schema")]
    UnclassifiedField { field: String },

    #[error("field {field:?} expected {expected}, found {found}")]
    ShapeMismatch { field: String, expected: &'static str, found: &'static str },

    #[error("perPlayerSlice field {field:?} requires a mapping shape")]
    SliceRequiresMap { field: String },

    #[error("root state must be a map, found {found}")]
    RootNotMap { found: &'static str },
}

/// Classified fields of one node type.
#[derive(Debug, Clone, Default)]
pub struct NodeSchema {
    fields: BTreeMap<String, FieldSchema>,
}

impl NodeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Returns `Self` for chained construction.
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Fields in canonical (alphabetical) order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check schema self-consistency (e.g. slice fields are maps). Run once
    /// at definition time.
    pub fn check(&self) -> Result<(), SchemaError> {
        for (name, field) in &self.fields {
            if matches!(field.policy, SyncPolicy::PerPlayerSlice)
                && !matches!(field.shape, FieldShape::Map(_))
            {
                return Err(SchemaError::SliceRequiresMap { field: name.clone() });
            }
            if let FieldShape::Node(schema) = &field.shape {
                schema.check()?;
            }
        }
        Ok(())
    }

    /// Validate a root value against this schema. Every stored field must be
    /// classified, and every value must match its declared shape.
    pub fn validate(&self, root: &StateValue) -> Result<(), SchemaError> {
        let map = root
            .as_map()
            .ok_or(SchemaError::RootNotMap { found: root.kind() })?;
        for (name, value) in map {
            let field = self
                .get(name)
                .ok_or_else(|| SchemaError::UnclassifiedField { field: name.clone() })?;
            validate_shape(name, &field.shape, value)?;
        }
        Ok(())
    }

    /// JSON description of the node shape for the schema document.
    pub fn describe(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(name, field)| {
                (
                    name.clone(),
                    json!({
                        "policy": field.policy.name(),
                        "shape": field.shape.describe(),
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(fields)
    }
}

fn validate_shape(field: &str, shape: &FieldShape, value: &StateValue) -> Result<(), SchemaError> {
    match shape {
        FieldShape::Scalar => match value {
            StateValue::List(_) | StateValue::Map(_) => Err(SchemaError::ShapeMismatch {
                field: field.to_string(),
                expected: "scalar",
                found: value.kind(),
            }),
            _ => Ok(()),
        },
        FieldShape::List(element) => {
            let items = value.as_list().ok_or_else(|| SchemaError::ShapeMismatch {
                field: field.to_string(),
                expected: "list",
                found: value.kind(),
            })?;
            for item in items {
                validate_shape(field, element, item)?;
            }
            Ok(())
        }
        FieldShape::Map(element) => {
            let map = value.as_map().ok_or_else(|| SchemaError::ShapeMismatch {
                field: field.to_string(),
                expected: "map",
                found: value.kind(),
            })?;
            for entry in map.values() {
                validate_shape(field, element, entry)?;
            }
            Ok(())
        }
        FieldShape::Node(schema) => schema.validate(value).map_err(|err| match err {
            SchemaError::RootNotMap { found } => SchemaError::ShapeMismatch {
                field: field.to_string(),
                expected: "node",
                found,
            },
            other => other,
        }),
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
