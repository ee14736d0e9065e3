// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn display_includes_code_and_message() {
    let err = ClientError::new(codes::ALREADY_JOINED, "nope");
    assert_eq!(err.to_string(), "ALREADY_JOINED: nope");
}

#[test]
fn details_serialize_only_when_present() {
    let bare = ClientError::new(codes::JOIN_TIMEOUT, "too slow");
    let json = serde_json::to_value(&bare).unwrap();
    assert!(json.get("details").is_none());

    let detailed = bare.with_detail("limit_ms", 10_000i64);
    let json = serde_json::to_value(&detailed).unwrap();
    assert_eq!(json["details"]["limit_ms"], 10_000);
}

#[test]
fn constructors_carry_stable_codes() {
    assert_eq!(ClientError::already_joined().code, codes::ALREADY_JOINED);
    assert_eq!(ClientError::already_joining().code, codes::ALREADY_JOINING);
    assert_eq!(
        ClientError::action_not_registered("warp").details["type_id"],
        StateValue::from("warp")
    );
    assert_eq!(ClientError::resolver_failed("fetch", "boom").code, codes::RESOLVER_FAILED);
}
