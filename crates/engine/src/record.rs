// SPDX-License-Identifier: MIT

//! Recording: the per-Land input journal for deterministic re-evaluation.
//!
//! One JSON document per Land lifetime: metadata captured at keeper init,
//! then one frame per tick carrying every executed input, the resolver
//! outputs, the emitted server events and the post-tick state hash.
//! Frames flush to disk every `recording_flush_every` ticks; a failed
//! flush keeps the buffer and retries at the next interval. Finalize
//! writes the complete document through a temp file and rename.

use crate::resolver::ResolverOutputs;
use land_core::{ItemPayload, LandConfig, LandId, PendingItem, ServerEvent, StateValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Engine version stamped into recordings and the schema document.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One resolver's recorded result for a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverRecord {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<StateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolverRecord {
    pub fn from_result(result: &Result<StateValue, String>) -> Self {
        match result {
            Ok(value) => Self { ok: true, value: Some(value.clone()), error: None },
            Err(error) => Self { ok: false, value: None, error: Some(error.clone()) },
        }
    }

    pub fn to_result(&self) -> Result<StateValue, String> {
        if self.ok {
            Ok(self.value.clone().unwrap_or(StateValue::Null))
        } else {
            Err(self.error.clone().unwrap_or_else(|| "recorded failure".to_string()))
        }
    }
}

/// Everything one tick executed, for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecordingFrame {
    pub tick_id: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PendingItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_events: Vec<PendingItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lifecycle_events: Vec<PendingItem>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resolver_outputs: BTreeMap<String, ResolverRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_events: Vec<ServerEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
}

impl RecordingFrame {
    /// Bundle a tick's executed items and outputs into a frame.
    pub fn capture(
        tick_id: u64,
        items: &[PendingItem],
        outputs: &ResolverOutputs,
        server_events: &[ServerEvent],
        state_hash: String,
    ) -> Self {
        let mut frame = Self { tick_id, state_hash: Some(state_hash), ..Default::default() };
        for item in items {
            match &item.payload {
                ItemPayload::Action { .. } => frame.actions.push(item.clone()),
                ItemPayload::ClientEvent { .. } => frame.client_events.push(item.clone()),
                ItemPayload::Lifecycle { .. } => frame.lifecycle_events.push(item.clone()),
                ItemPayload::Tick => {}
            }
        }
        for (name, result) in outputs.iter() {
            frame.resolver_outputs.insert(name.to_string(), ResolverRecord::from_result(result));
        }
        frame.server_events = server_events.to_vec();
        frame
    }

    /// All recorded inputs of this frame in execution order.
    pub fn items(&self) -> Vec<PendingItem> {
        let mut items: Vec<PendingItem> = self
            .actions
            .iter()
            .chain(&self.client_events)
            .chain(&self.lifecycle_events)
            .cloned()
            .collect();
        items.sort_by_key(PendingItem::order_key);
        items
    }

    /// Recorded resolver outputs as a substitutable map.
    pub fn outputs(&self) -> ResolverOutputs {
        let mut outputs = ResolverOutputs::new();
        for (name, record) in &self.resolver_outputs {
            outputs.insert(name.clone(), record.to_result());
        }
        outputs
    }
}

/// Recording header captured at keeper init.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub land_id: String,
    pub land_type: String,
    pub created_at_ms: u64,
    pub initial_state_hash: String,
    pub land_config: LandConfig,
    pub version: String,
}

/// A complete recorded Land lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingFile {
    pub metadata: RecordingMetadata,
    pub frames: Vec<RecordingFrame>,
}

impl RecordingFile {
    pub fn load(path: &Path) -> Result<Self, RecordingError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Recording I/O failures. Never fatal to the Land.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("recording io: {0}")]
    Io(#[from] std::io::Error),

    #[error("recording encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Live-mode frame sink for one keeper.
pub struct Recorder {
    path: PathBuf,
    metadata: RecordingMetadata,
    frames: Vec<RecordingFrame>,
    flush_every: u32,
    unflushed: u32,
}

impl Recorder {
    /// Open a recorder writing `<land_type>/<instance>.json` under `dir`.
    pub fn create(
        dir: &Path,
        land_id: &LandId,
        config: &LandConfig,
        initial_state_hash: String,
        created_at_ms: u64,
    ) -> Self {
        let path = dir
            .join(&land_id.land_type)
            .join(format!("{}.json", land_id.instance_id));
        let metadata = RecordingMetadata {
            land_id: land_id.to_string(),
            land_type: land_id.land_type.clone(),
            created_at_ms,
            initial_state_hash,
            land_config: config.clone(),
            version: ENGINE_VERSION.to_string(),
        };
        Self {
            path,
            metadata,
            frames: Vec::new(),
            flush_every: config.recording_flush_every.max(1),
            unflushed: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    /// Append a frame; flushes when the buffer interval is reached.
    pub fn record(&mut self, frame: RecordingFrame) {
        self.frames.push(frame);
        self.unflushed += 1;
        if self.unflushed >= self.flush_every {
            match self.flush() {
                Ok(()) => self.unflushed = 0,
                Err(e) => {
                    // Keep buffering; retry at the next interval.
                    tracing::warn!(path = %self.path.display(), error = %e, "recording flush failed");
                    self.unflushed = 0;
                }
            }
        }
    }

    /// Write the full document so far, atomically (temp file + rename).
    pub fn flush(&self) -> Result<(), RecordingError> {
        let file = RecordingFile { metadata: self.metadata.clone(), frames: self.frames.clone() };
        let bytes = serde_json::to_vec(&file)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut out = std::fs::File::create(&tmp)?;
            out.write_all(&bytes)?;
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Final flush on keeper destruction.
    pub fn finalize(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(path = %self.path.display(), error = %e, "recording finalize failed");
        }
    }

    pub fn frames(&self) -> &[RecordingFrame] {
        &self.frames
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
