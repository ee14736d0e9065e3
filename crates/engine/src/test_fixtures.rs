// SPDX-License-Identifier: MIT

//! Shared definitions for engine tests.

use crate::definition::{HandlerError, LandDefinition};
use crate::resolver::{Resolver, ResolverCtx, ResolverError};
use async_trait::async_trait;
use land_core::{
    ClientError, FieldSchema, FieldShape, LandConfig, NodeSchema, StateValue,
};

/// Deterministic stub resolver.
pub(crate) struct FixedResolver {
    name: &'static str,
    result: Result<StateValue, String>,
}

impl FixedResolver {
    pub(crate) fn ok(name: &'static str, value: StateValue) -> Self {
        Self { name, result: Ok(value) }
    }

    pub(crate) fn failing(name: &'static str, message: &str) -> Self {
        Self { name, result: Err(message.to_string()) }
    }
}

#[async_trait]
impl Resolver for FixedResolver {
    fn name(&self) -> &str {
        self.name
    }

    async fn resolve(&self, _ctx: &ResolverCtx) -> Result<StateValue, ResolverError> {
        self.result.clone().map_err(ResolverError::Failed)
    }
}

pub(crate) fn counter_schema() -> NodeSchema {
    NodeSchema::new()
        .field("count", FieldSchema::broadcast(FieldShape::Scalar))
        .field("players", FieldSchema::server_only(FieldShape::list_of(FieldShape::Scalar)))
}

/// Counter land: broadcast count, increment action, join/leave tracking.
pub(crate) fn counter_definition(config: LandConfig) -> LandDefinition {
    LandDefinition::builder("counter")
        .schema(counter_schema())
        .config(config)
        .initial_state(|_| {
            StateValue::map([
                ("count", StateValue::Int(0)),
                ("players", StateValue::List(Vec::new())),
            ])
        })
        .action("increment", [], |draft, payload, _ctx| {
            let by = payload
                .as_map()
                .and_then(|m| m.get("by"))
                .and_then(StateValue::as_int)
                .unwrap_or(1);
            let count = draft.get("count").and_then(StateValue::as_int).unwrap_or(0) + by;
            draft.set("count", count);
            Ok(StateValue::map([("newCount", count)]))
        })
        .action("fail", [], |_draft, _payload, _ctx| {
            Err(HandlerError::from("intentional failure"))
        })
        .on_join(|draft, _payload, ctx| {
            if let Some(player) = ctx.player_id {
                let name = StateValue::from(player.as_str());
                if let Some(players) = draft.field_mut("players").as_list_mut() {
                    players.push(name);
                }
            }
            Ok(())
        })
        .on_leave(|draft, _payload, ctx| {
            if let Some(player) = ctx.player_id {
                if let Some(players) = draft.field_mut("players").as_list_mut() {
                    players.retain(|p| p.as_str() != Some(player.as_str()));
                }
            }
            Ok(())
        })
        .build()
        .unwrap_or_else(|e| panic!("fixture definition invalid: {e}"))
}

/// Game land with a per-player sliced inventory map.
pub(crate) fn game_definition(config: LandConfig) -> LandDefinition {
    LandDefinition::builder("game")
        .schema(
            NodeSchema::new()
                .field("round", FieldSchema::broadcast(FieldShape::Scalar))
                .field(
                    "inventories",
                    FieldSchema::per_player(FieldShape::list_of(FieldShape::Scalar)),
                ),
        )
        .config(config)
        .initial_state(|_| {
            StateValue::map([
                ("round", StateValue::Int(0)),
                (
                    "inventories",
                    StateValue::map([
                        ("alice", StateValue::list(["sword"])),
                        ("bob", StateValue::list(["bow"])),
                    ]),
                ),
            ])
        })
        .action("grant", [], |draft, payload, ctx| {
            let item = payload
                .as_map()
                .and_then(|m| m.get("item"))
                .and_then(StateValue::as_str)
                .ok_or_else(|| {
                    HandlerError::Rejected(ClientError::new("BAD_PAYLOAD", "missing item"))
                })?
                .to_string();
            let player = ctx
                .player_id
                .map(|p| p.to_string())
                .ok_or_else(|| HandlerError::from("no player"))?;
            if let Some(map) = draft.field_mut("inventories").as_map_mut() {
                let entry = map.entry(player).or_insert_with(|| StateValue::List(Vec::new()));
                if let Some(items) = entry.as_list_mut() {
                    items.push(StateValue::from(item));
                }
            }
            Ok(StateValue::Null)
        })
        .build()
        .unwrap_or_else(|e| panic!("fixture definition invalid: {e}"))
}
