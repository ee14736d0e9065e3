// SPDX-License-Identifier: MIT

use super::*;
use crate::test_fixtures::{counter_definition, FixedResolver};
use land_core::{FieldSchema, FieldShape, LandConfig, NodeSchema, SyncPolicy};

#[test]
fn builder_validates_schema() {
    let result = LandDefinition::builder("bad")
        .schema(NodeSchema::new().field(
            "slice",
            FieldSchema { policy: SyncPolicy::PerPlayerSlice, shape: FieldShape::Scalar },
        ))
        .build();
    assert!(matches!(result, Err(DefinitionError::Schema(_))));
}

#[test]
fn builder_rejects_undeclared_resolver() {
    let result = LandDefinition::builder("bad")
        .action("act", ["missing"], |_d, _p, _c| Ok(StateValue::Null))
        .build();
    assert!(matches!(
        result,
        Err(DefinitionError::UnknownResolver { handler, resolver })
            if handler == "act" && resolver == "missing"
    ));
}

#[test]
fn builder_accepts_declared_resolver() {
    let definition = LandDefinition::builder("good")
        .resolver(FixedResolver::ok("fetch", StateValue::Int(1)))
        .action("act", ["fetch"], |_d, _p, _c| Ok(StateValue::Null))
        .build()
        .unwrap();
    assert!(definition.action("act").is_some());
    assert!(definition.resolver("fetch").is_some());
    assert!(definition.action("ghost").is_none());
}

#[test]
fn default_initial_state_is_empty_map() {
    let definition = LandDefinition::builder("empty").build().unwrap();
    let state = definition.initial_state(&LandId::new("empty", "x"));
    assert_eq!(state, StateValue::Map(Default::default()));
}

#[test]
fn broadcast_only_detection() {
    let counter = counter_definition(LandConfig::default());
    assert!(counter.broadcast_only());

    let sliced = LandDefinition::builder("sliced")
        .schema(NodeSchema::new().field(
            "inventories",
            FieldSchema::per_player(FieldShape::Scalar),
        ))
        .build()
        .unwrap();
    assert!(!sliced.broadcast_only());
}

#[test]
fn check_join_defaults_to_allow() {
    let definition = counter_definition(LandConfig::default());
    let request = JoinRequest {
        request_id: 1,
        land_id: LandId::new("counter", "x"),
        identity: land_core::ClientIdentity::player("alice"),
        metadata: StateValue::Null,
    };
    assert!(definition.check_join(&request, &StateValue::Map(Default::default())).is_ok());
}

#[test]
fn can_join_gate_is_consulted() {
    let definition = LandDefinition::builder("gated")
        .can_join(|request, _state| {
            if request.identity.player_id.as_str() == "banned" {
                Err(land_core::ClientError::new("JOIN_DENIED", "banned player"))
            } else {
                Ok(())
            }
        })
        .build()
        .unwrap();

    let allowed = JoinRequest {
        request_id: 1,
        land_id: LandId::new("gated", "x"),
        identity: land_core::ClientIdentity::player("alice"),
        metadata: StateValue::Null,
    };
    assert!(definition.check_join(&allowed, &StateValue::Null).is_ok());

    let banned = JoinRequest {
        request_id: 2,
        land_id: LandId::new("gated", "x"),
        identity: land_core::ClientIdentity::player("banned"),
        metadata: StateValue::Null,
    };
    assert_eq!(
        definition.check_join(&banned, &StateValue::Null).unwrap_err().code,
        "JOIN_DENIED"
    );
}

#[test]
fn path_table_covers_schema_fields() {
    let definition = counter_definition(LandConfig::default());
    assert!(definition
        .path_table()
        .hash_of(&land_core::Path::field("count"))
        .is_some());
}

#[test]
fn describe_lists_actions_and_state() {
    let definition = counter_definition(LandConfig::default());
    let doc = definition.describe();
    assert!(doc["actions"].get("increment").is_some());
    assert_eq!(doc["state"]["count"]["policy"], "broadcast");
    assert!(doc["config"].get("tick_period_ms").is_some());
}

#[test]
fn handler_error_maps_to_client_error() {
    let failed = HandlerError::from("boom");
    assert_eq!(failed.to_client_error().code, land_core::codes::HANDLER_FAILED);

    let rejected =
        HandlerError::Rejected(land_core::ClientError::new("CUSTOM", "no"));
    assert_eq!(rejected.to_client_error().code, "CUSTOM");
}
