// SPDX-License-Identifier: MIT

//! LandRealm: the application-level aggregate over every land type.
//!
//! Holds one manager per registered definition, routes joins by land type,
//! answers cross-type admin queries, and exports the schema document that
//! client SDK generators consume.

use crate::definition::LandDefinition;
use crate::keeper::KeeperHandle;
use crate::manager::LandManager;
use crate::record::ENGINE_VERSION;
use land_core::{codes, ClientError, LandId, StateValue, SystemClock};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// One manager per land type, plus routing.
pub struct LandRealm {
    managers: HashMap<String, LandManager<SystemClock>>,
    recording_dir: Option<PathBuf>,
}

impl LandRealm {
    pub fn new() -> Self {
        Self { managers: HashMap::new(), recording_dir: None }
    }

    /// Record re-evaluation files under this directory.
    pub fn with_recording_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recording_dir = Some(dir.into());
        self
    }

    /// Register a land type. Later joins naming this type dispatch here.
    pub fn register(&mut self, definition: LandDefinition) {
        let definition = Arc::new(definition);
        let manager = LandManager::new(
            Arc::clone(&definition),
            SystemClock,
            self.recording_dir.clone(),
        );
        self.managers.insert(definition.land_type().to_string(), manager);
    }

    pub fn manager(&self, land_type: &str) -> Option<&LandManager<SystemClock>> {
        self.managers.get(land_type)
    }

    pub fn land_types(&self) -> Vec<&str> {
        self.managers.keys().map(String::as_str).collect()
    }

    /// Resolve a join to its target keeper, creating the Land when the
    /// instance id is absent and the configuration allows it.
    pub fn route_join(
        &self,
        land_type: &str,
        instance_id: Option<&str>,
    ) -> Result<(LandId, KeeperHandle), ClientError> {
        let manager = self.managers.get(land_type).ok_or_else(|| {
            ClientError::new(codes::UNKNOWN_LAND_TYPE, format!("no land type {land_type:?}"))
        })?;

        let land_id = match instance_id {
            Some(instance) => LandId::new(land_type, instance),
            None => {
                if !manager.definition().config().allow_instance_creation {
                    return Err(ClientError::new(
                        codes::LAND_NOT_FOUND,
                        "this land type requires an instance id",
                    ));
                }
                LandId::new(land_type, nanoid::nanoid!(12))
            }
        };

        if let Some(error) = manager.failed_error(&land_id) {
            return Err(error);
        }

        match instance_id {
            Some(_) if !manager.definition().config().allow_instance_creation => {
                // Explicit instances may still require pre-existence.
                manager.get(&land_id).map(|handle| (land_id.clone(), handle)).ok_or_else(|| {
                    ClientError::new(codes::LAND_NOT_FOUND, format!("no land {land_id}"))
                })
            }
            _ => manager
                .get_or_create(&land_id)
                .map(|handle| (land_id.clone(), handle))
                .map_err(|e| ClientError::new(codes::LAND_FAILED, e.to_string())),
        }
    }

    /// Every live Land across every type.
    pub fn list_lands(&self) -> Vec<LandId> {
        let mut lands: Vec<LandId> =
            self.managers.values().flat_map(|manager| manager.list()).collect();
        lands.sort();
        lands
    }

    /// Authoritative projection of one Land, stale slice entries included.
    pub async fn admin_snapshot(&self, land_id: &LandId) -> Option<StateValue> {
        let manager = self.managers.get(&land_id.land_type)?;
        let handle = manager.get(land_id)?;
        handle.admin_snapshot().await
    }

    /// JSON description of every registered land type, for `GET /schema`.
    ///
    /// Stable for a given engine version; each land carries a content
    /// digest so generators can detect drift.
    pub fn schema_document(&self) -> serde_json::Value {
        let mut lands = serde_json::Map::new();
        let mut types: Vec<&String> = self.managers.keys().collect();
        types.sort();
        for land_type in types {
            if let Some(manager) = self.managers.get(land_type) {
                let description = manager.definition().describe();
                let digest = {
                    let canonical =
                        serde_json::to_string(&description).unwrap_or_default();
                    format!("{:x}", Sha256::digest(canonical.as_bytes()))
                };
                lands.insert(
                    land_type.clone(),
                    serde_json::json!({
                        "schema": description,
                        "digest": digest,
                    }),
                );
            }
        }
        serde_json::json!({
            "engine_version": ENGINE_VERSION,
            "lands": lands,
        })
    }

    /// Stop every keeper of every type.
    pub async fn shutdown(&self) {
        for manager in self.managers.values() {
            manager.shutdown().await;
        }
    }
}

impl Default for LandRealm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "realm_tests.rs"]
mod tests;
