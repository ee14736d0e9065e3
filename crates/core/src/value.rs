// SPDX-License-Identifier: MIT

//! Dynamic state values.
//!
//! `StateValue` is the universal node/terminal representation for Land
//! state: schemas classify it, the projector filters it, the differ
//! compares it, and the codec serializes it. Maps are `BTreeMap` so every
//! walk observes the canonical (sorted) key order.

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One value in a StateTree: a terminal, a list, or a keyed mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<StateValue>),
    Map(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Build a map value from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<StateValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Build a list value.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<StateValue>,
        I: IntoIterator<Item = V>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<StateValue>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StateValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, StateValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for StateValue {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<u32> for StateValue {
    fn from(n: u32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for StateValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<V: Into<StateValue>> From<Vec<V>> for StateValue {
    fn from(items: Vec<V>) -> Self {
        Self::list(items)
    }
}

impl Serialize for StateValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Str(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct StateValueVisitor;

impl<'de> Visitor<'de> for StateValueVisitor {
    type Value = StateValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a state value")
    }

    fn visit_unit<E>(self) -> Result<StateValue, E> {
        Ok(StateValue::Null)
    }

    fn visit_none<E>(self) -> Result<StateValue, E> {
        Ok(StateValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<StateValue, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(StateValueVisitor)
    }

    fn visit_bool<E>(self, b: bool) -> Result<StateValue, E> {
        Ok(StateValue::Bool(b))
    }

    fn visit_i64<E>(self, n: i64) -> Result<StateValue, E> {
        Ok(StateValue::Int(n))
    }

    fn visit_u64<E>(self, n: u64) -> Result<StateValue, E>
    where
        E: serde::de::Error,
    {
        i64::try_from(n)
            .map(StateValue::Int)
            .map_err(|_| E::custom(format!("integer out of range: {n}")))
    }

    fn visit_f64<E>(self, f: f64) -> Result<StateValue, E> {
        Ok(StateValue::Float(f))
    }

    fn visit_str<E>(self, s: &str) -> Result<StateValue, E> {
        Ok(StateValue::Str(s.to_string()))
    }

    fn visit_string<E>(self, s: String) -> Result<StateValue, E> {
        Ok(StateValue::Str(s))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<StateValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(StateValue::List(items))
    }

    fn visit_map<A>(self, mut access: A) -> Result<StateValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, StateValue>()? {
            map.insert(key, value);
        }
        Ok(StateValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(StateValueVisitor)
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
