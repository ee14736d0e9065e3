// SPDX-License-Identifier: MIT

//! Tick execution: the single synchronous path shared by the live keeper
//! and the replay verifier.
//!
//! Items execute strictly in `(resolved_at_tick, sequence)` order. Each
//! handler runs against a working copy that only commits on success, so a
//! failing handler leaves the tree exactly as it found it. A commit-time
//! schema violation is an engine fault: the Land is considered failed.

use crate::definition::{HandlerCtx, HandlerError, HandlerSpec, LandDefinition};
use crate::resolver::ResolverOutputs;
use land_core::{
    codes, ClientError, ItemPayload, LandId, Lifecycle, PendingItem, PlayerId, SchemaError,
    ServerEvent, SessionId, StateTree, StateValue,
};
use std::panic::AssertUnwindSafe;
use thiserror::Error;

/// Engine invariant violation. Aborts the keeper, not the host.
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("schema violation on commit: {0}")]
    Schema(#[from] SchemaError),
}

/// One action's outcome, addressed back to its requestor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub session_id: SessionId,
    pub request_id: u64,
    pub result: Result<StateValue, ClientError>,
}

/// Everything one tick produced besides the state itself.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub responses: Vec<ActionOutcome>,
    pub events: Vec<ServerEvent>,
    /// Client-event handler failures, surfaced as `event_error` frames.
    pub event_errors: Vec<(SessionId, ClientError)>,
}

/// Execute one tick's items (and the tick handler) against the tree.
pub fn execute_items(
    tree: &mut StateTree,
    definition: &LandDefinition,
    land_id: &LandId,
    tick_id: u64,
    items: &[PendingItem],
    outputs: &ResolverOutputs,
) -> Result<TickOutcome, EngineFault> {
    let mut outcome = TickOutcome::default();

    for item in items {
        execute_item(tree, definition, land_id, tick_id, item, outputs, &mut outcome)?;
    }

    if let Some(spec) = definition.on_tick() {
        let adapted = event_as_action(spec);
        let run = RunSpec {
            spec: &adapted,
            payload: &StateValue::Null,
            session_id: None,
            player_id: None,
            label: "on_tick",
        };
        match run_handler(tree, land_id, tick_id, run, outputs)? {
            Ok((_, events)) => outcome.events.extend(events),
            Err(error) => {
                tracing::warn!(tick_id, error = %error, "tick handler failed");
            }
        }
    }

    Ok(outcome)
}

fn execute_item(
    tree: &mut StateTree,
    definition: &LandDefinition,
    land_id: &LandId,
    tick_id: u64,
    item: &PendingItem,
    outputs: &ResolverOutputs,
    outcome: &mut TickOutcome,
) -> Result<(), EngineFault> {
    match &item.payload {
        ItemPayload::Action { session_id, player_id, request_id, type_id, payload } => {
            let Some(spec) = definition.action(type_id) else {
                outcome.responses.push(ActionOutcome {
                    session_id: *session_id,
                    request_id: *request_id,
                    result: Err(ClientError::action_not_registered(type_id)),
                });
                return Ok(());
            };
            if let Some((resolver, message)) = outputs.first_failure(&spec.resolvers) {
                outcome.responses.push(ActionOutcome {
                    session_id: *session_id,
                    request_id: *request_id,
                    result: Err(ClientError::resolver_failed(resolver, message)),
                });
                return Ok(());
            }
            let run = RunSpec {
                spec,
                payload,
                session_id: Some(session_id),
                player_id: Some(player_id),
                label: type_id,
            };
            match run_handler(tree, land_id, tick_id, run, outputs)? {
                Ok((response, events)) => {
                    outcome.events.extend(events);
                    outcome.responses.push(ActionOutcome {
                        session_id: *session_id,
                        request_id: *request_id,
                        result: Ok(response),
                    });
                }
                Err(error) => {
                    outcome.responses.push(ActionOutcome {
                        session_id: *session_id,
                        request_id: *request_id,
                        result: Err(error),
                    });
                }
            }
        }

        ItemPayload::ClientEvent { session_id, player_id, type_id, payload } => {
            let Some(spec) = definition.event(type_id) else {
                outcome
                    .event_errors
                    .push((*session_id, ClientError::event_not_registered(type_id)));
                return Ok(());
            };
            if let Some((resolver, message)) = outputs.first_failure(&spec.resolvers) {
                outcome
                    .event_errors
                    .push((*session_id, ClientError::resolver_failed(resolver, message)));
                return Ok(());
            }
            let adapted = event_as_action(spec);
            let run = RunSpec {
                spec: &adapted,
                payload,
                session_id: Some(session_id),
                player_id: Some(player_id),
                label: type_id,
            };
            match run_handler(tree, land_id, tick_id, run, outputs)? {
                Ok((_, events)) => outcome.events.extend(events),
                Err(error) => outcome.event_errors.push((*session_id, error)),
            }
        }

        ItemPayload::Lifecycle { kind, session_id, player_id } => {
            let spec = match kind {
                Lifecycle::Joined => definition.on_join(),
                Lifecycle::Left => definition.on_leave(),
                Lifecycle::Initialized => definition.on_init(),
            };
            let Some(spec) = spec else { return Ok(()) };
            let adapted = event_as_action(spec);
            let run = RunSpec {
                spec: &adapted,
                payload: &StateValue::Null,
                session_id: session_id.as_ref(),
                player_id: player_id.as_ref(),
                label: "lifecycle",
            };
            match run_handler(tree, land_id, tick_id, run, outputs)? {
                Ok((_, events)) => outcome.events.extend(events),
                Err(error) => {
                    tracing::warn!(?kind, error = %error, "lifecycle handler failed");
                }
            }
        }

        ItemPayload::Tick => {
            // Scheduled tick markers carry no handler of their own; the
            // tick handler runs once per tick in `execute_items`.
        }
    }
    Ok(())
}

struct RunSpec<'a> {
    spec: &'a HandlerSpec<crate::definition::ActionFn>,
    payload: &'a StateValue,
    session_id: Option<&'a SessionId>,
    player_id: Option<&'a PlayerId>,
    label: &'a str,
}

/// Adapt an event handler to the action shape (null response payload).
fn event_as_action(
    spec: &HandlerSpec<crate::definition::EventFn>,
) -> HandlerSpec<crate::definition::ActionFn> {
    let run = spec.run.clone();
    HandlerSpec {
        resolvers: spec.resolvers.clone(),
        run: std::sync::Arc::new(move |draft, payload, ctx| {
            run(draft, payload, ctx).map(|()| StateValue::Null)
        }),
    }
}

/// Run one handler against a working copy. Commit on success, drop the
/// draft on failure. Panics are caught and reported as handler failures.
fn run_handler(
    tree: &mut StateTree,
    land_id: &LandId,
    tick_id: u64,
    run: RunSpec<'_>,
    outputs: &ResolverOutputs,
) -> Result<Result<(StateValue, Vec<ServerEvent>), ClientError>, EngineFault> {
    let mut draft = tree.begin_draft();
    let mut ctx = HandlerCtx::new(tick_id, land_id, run.session_id, run.player_id, outputs);
    let handler = run.spec.run.clone();
    let payload = run.payload;

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        handler(&mut draft, payload, &mut ctx)
    }));

    match result {
        Ok(Ok(response)) => {
            let events = ctx.take_events();
            tree.commit(draft)?;
            Ok(Ok((response, events)))
        }
        Ok(Err(HandlerError::Rejected(error))) => Ok(Err(error)),
        Ok(Err(HandlerError::Failed(message))) => {
            tracing::debug!(handler = run.label, %message, "handler failed");
            Ok(Err(ClientError::new(codes::HANDLER_FAILED, message)))
        }
        Err(panic) => {
            let message = panic_message(&panic);
            tracing::error!(handler = run.label, %message, "handler panicked");
            Ok(Err(ClientError::new(codes::HANDLER_FAILED, message)))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
