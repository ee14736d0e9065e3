// SPDX-License-Identifier: MIT

//! Replay: deterministic re-execution of a recorded Land.
//!
//! The replay keeper performs no external I/O: items are enqueued in
//! recorded order with their recorded sequences, resolver execution is
//! skipped entirely in favor of the recorded outputs, and handlers run
//! through the same execution path as live mode. After each tick the state
//! hash is recomputed and compared against the recorded value.

use crate::definition::LandDefinition;
use crate::exec::{execute_items, EngineFault};
use crate::queue::PendingQueue;
use crate::record::RecordingFile;
use land_core::{state_hash, LandId, LandIdError, SchemaError, StateTree, StateValue};
use thiserror::Error;

/// Verifier result: `ok` or the first tick whose hash diverged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub ok: bool,
    pub first_mismatch_tick: Option<u64>,
    /// Ticks examined (frames in the recording).
    pub ticks: u64,
}

/// Replay failures that prevent verification from running at all.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("recording has malformed land id: {0}")]
    LandId(#[from] LandIdError),

    #[error("initial state does not validate: {0}")]
    Schema(#[from] SchemaError),

    #[error("initial state hash mismatch: recorded {recorded}, computed {computed}")]
    InitialHash { recorded: String, computed: String },

    #[error(transparent)]
    Fault(#[from] EngineFault),
}

/// One replayed run: the per-tick hashes and the final state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRun {
    pub hashes: Vec<(u64, String)>,
    pub final_state: StateValue,
}

/// Re-execute a recording from its initial state.
pub fn replay(
    definition: &LandDefinition,
    file: &RecordingFile,
) -> Result<ReplayRun, ReplayError> {
    let land_id = LandId::parse(&file.metadata.land_id)?;
    let initial = definition.initial_state(&land_id);
    let mut tree = StateTree::new(definition.schema().clone(), initial)?;

    let snapshot = tree.current_snapshot();
    let computed = state_hash(&snapshot.root, definition.schema());
    if computed != file.metadata.initial_state_hash {
        return Err(ReplayError::InitialHash {
            recorded: file.metadata.initial_state_hash.clone(),
            computed,
        });
    }

    let mut queue = PendingQueue::new();
    let mut hashes = Vec::with_capacity(file.frames.len());

    for frame in &file.frames {
        for item in frame.items() {
            queue.enqueue_recorded(item);
        }

        // Advance through empty ticks up to the recorded tick id so the
        // queue's due-selection sees the same boundaries as live mode.
        let mut tick_id = tree.advance_tick();
        while tick_id < frame.tick_id {
            tick_id = tree.advance_tick();
        }

        let items = queue.drain_due(tick_id);
        let outputs = frame.outputs();
        execute_items(&mut tree, definition, &land_id, tick_id, &items, &outputs)?;

        let snapshot = tree.current_snapshot();
        hashes.push((tick_id, state_hash(&snapshot.root, definition.schema())));
    }

    let final_state = tree.current_snapshot().root.as_ref().clone();
    Ok(ReplayRun { hashes, final_state })
}

/// Replay and compare per-tick hashes against the recorded values.
pub fn verify(
    definition: &LandDefinition,
    file: &RecordingFile,
) -> Result<VerifyReport, ReplayError> {
    let run = replay(definition, file)?;
    let mut first_mismatch = None;

    for (frame, (tick_id, computed)) in file.frames.iter().zip(&run.hashes) {
        debug_assert_eq!(frame.tick_id, *tick_id);
        match &frame.state_hash {
            Some(recorded) if recorded != computed => {
                first_mismatch = Some(frame.tick_id);
                break;
            }
            _ => {}
        }
    }

    Ok(VerifyReport {
        ok: first_mismatch.is_none(),
        first_mismatch_tick: first_mismatch,
        ticks: file.frames.len() as u64,
    })
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
