// SPDX-License-Identifier: MIT

use super::*;
use land_core::StateValue;

fn join(player_id: Option<&str>) -> JoinFrame {
    JoinFrame {
        request_id: 1,
        land_type: "counter".to_string(),
        instance_id: None,
        player_id: player_id.map(str::to_string),
        client_id: Some("device-1".to_string()),
        metadata: StateValue::Null,
    }
}

#[tokio::test]
async fn guest_identity_trusts_provided_player() {
    let identity = GuestIdentity.resolve(&join(Some("alice"))).await.unwrap();
    assert_eq!(identity.player_id, "alice");
    assert!(!identity.guest);
    assert_eq!(identity.client_id.as_ref().map(|c| c.as_str()), Some("device-1"));
}

#[tokio::test]
async fn guest_identity_mints_guests() {
    let identity = GuestIdentity.resolve(&join(None)).await.unwrap();
    assert!(identity.guest);
    assert!(identity.player_id.as_str().starts_with("guest-"));

    let other = GuestIdentity.resolve(&join(None)).await.unwrap();
    assert_ne!(identity.player_id, other.player_id);
}

#[tokio::test]
async fn require_player_id_rejects_anonymous_joins() {
    let error = RequirePlayerId.resolve(&join(None)).await.unwrap_err();
    assert_eq!(error.code, codes::AUTH_FAILED);

    let ok = RequirePlayerId.resolve(&join(Some("bob"))).await.unwrap();
    assert_eq!(ok.player_id, "bob");
}
