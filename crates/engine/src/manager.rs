// SPDX-License-Identifier: MIT

//! LandManager: the keeper registry for one land type.
//!
//! Thread-safe: the keeper map sits behind a parking_lot mutex and a
//! background reaper removes entries when their keeper task exits. Failed
//! lands are remembered with a diagnostic so admin queries can explain
//! what happened.

use crate::definition::LandDefinition;
use crate::keeper::{KeeperExit, KeeperHandle, LandKeeper};
use land_core::{ClientError, Clock, LandId, SchemaError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Registry of live keepers for one land type.
pub struct LandManager<C: Clock> {
    definition: Arc<LandDefinition>,
    clock: C,
    recording_dir: Option<PathBuf>,
    keepers: Arc<Mutex<HashMap<LandId, KeeperHandle>>>,
    /// Lands aborted by invariant violations, with no live keeper.
    failed: Arc<Mutex<HashMap<LandId, String>>>,
    exit_tx: mpsc::UnboundedSender<KeeperExit>,
}

impl<C: Clock + 'static> LandManager<C> {
    /// Create a manager and spawn its reaper task.
    pub fn new(definition: Arc<LandDefinition>, clock: C, recording_dir: Option<PathBuf>) -> Self {
        let keepers: Arc<Mutex<HashMap<LandId, KeeperHandle>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let failed: Arc<Mutex<HashMap<LandId, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<KeeperExit>();

        let reaper_keepers = Arc::clone(&keepers);
        let reaper_failed = Arc::clone(&failed);
        tokio::spawn(async move {
            while let Some(exit) = exit_rx.recv().await {
                reaper_keepers.lock().remove(&exit.land_id);
                if exit.failed {
                    reaper_failed
                        .lock()
                        .insert(exit.land_id.clone(), "engine invariant violation".to_string());
                }
                tracing::debug!(land = %exit.land_id, failed = exit.failed, "keeper reaped");
            }
        });

        Self { definition, clock, recording_dir, keepers, failed, exit_tx }
    }

    pub fn definition(&self) -> &Arc<LandDefinition> {
        &self.definition
    }

    /// Fetch the live keeper for a Land, creating it on first use.
    pub fn get_or_create(&self, land_id: &LandId) -> Result<KeeperHandle, SchemaError> {
        if let Some(handle) = self.get(land_id) {
            return Ok(handle);
        }
        let mut keepers = self.keepers.lock();
        // Second check under the lock: a racing caller may have created it.
        if let Some(handle) = keepers.get(land_id) {
            if handle.is_alive() {
                return Ok(handle.clone());
            }
        }
        let handle = LandKeeper::spawn(
            land_id.clone(),
            Arc::clone(&self.definition),
            self.clock.clone(),
            self.recording_dir.as_deref(),
            self.exit_tx.clone(),
        )?;
        keepers.insert(land_id.clone(), handle.clone());
        Ok(handle)
    }

    pub fn get(&self, land_id: &LandId) -> Option<KeeperHandle> {
        let keepers = self.keepers.lock();
        keepers.get(land_id).filter(|handle| handle.is_alive()).cloned()
    }

    /// Stop and remove one Land.
    pub async fn remove(&self, land_id: &LandId) {
        let handle = self.keepers.lock().remove(land_id);
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn list(&self) -> Vec<LandId> {
        self.keepers.lock().keys().cloned().collect()
    }

    /// Diagnostic for a Land that was aborted, if any.
    pub fn failure_of(&self, land_id: &LandId) -> Option<String> {
        self.failed.lock().get(land_id).cloned()
    }

    /// Error for joins targeting a failed Land.
    pub fn failed_error(&self, land_id: &LandId) -> Option<ClientError> {
        self.failure_of(land_id).map(|diagnostic| {
            ClientError::new(land_core::codes::LAND_FAILED, diagnostic)
        })
    }

    /// Stop every keeper (graceful shutdown).
    pub async fn shutdown(&self) {
        let handles: Vec<KeeperHandle> = {
            let mut keepers = self.keepers.lock();
            keepers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
