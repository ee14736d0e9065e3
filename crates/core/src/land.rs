// SPDX-License-Identifier: MIT

//! Composite Land identifier: `landType:instanceId`.
//!
//! The land type selects the rule set (definition); the instance id
//! distinguishes concurrent Land instances of the same type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from parsing a composite Land identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandIdError {
    #[error("land id missing ':' separator: {0:?}")]
    MissingSeparator(String),

    #[error("land id has empty {0} component")]
    EmptyComponent(&'static str),
}

/// Identifier of one Land instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LandId {
    pub land_type: String,
    pub instance_id: String,
}

impl LandId {
    pub fn new(land_type: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self { land_type: land_type.into(), instance_id: instance_id.into() }
    }

    /// Parse a `landType:instanceId` string. The instance id may itself
    /// contain ':'; only the first separator splits.
    pub fn parse(s: &str) -> Result<Self, LandIdError> {
        let (land_type, instance_id) = s
            .split_once(':')
            .ok_or_else(|| LandIdError::MissingSeparator(s.to_string()))?;
        if land_type.is_empty() {
            return Err(LandIdError::EmptyComponent("land_type"));
        }
        if instance_id.is_empty() {
            return Err(LandIdError::EmptyComponent("instance_id"));
        }
        Ok(Self::new(land_type, instance_id))
    }
}

impl fmt::Display for LandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.land_type, self.instance_id)
    }
}

impl Serialize for LandId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LandId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        LandId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "land_tests.rs"]
mod tests;
