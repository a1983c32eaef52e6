use std::time::Duration;

use serde_json::Value;

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn online_list_is_broadcast_and_queryable() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;

    let mut alice_ws = app.connect_ws(&alice.access_token).await;
    let _bob_ws = app.connect_ws(&bob.access_token).await;

    let mut saw_both = false;
    while let Some(event) = alice_ws
        .next_event("presence:online_users", Duration::from_secs(2))
        .await
    {
        let ids = event["data"]["user_ids"].as_array().unwrap();
        if ids.len() == 2 {
            saw_both = true;
            break;
        }
    }
    assert!(saw_both, "Alice never saw Bob come online");

    let resp = app
        .auth_get("/api/user/online", &alice.access_token)
        .send()
        .await
        .unwrap();
    let json: Value = resp.json().await.unwrap();
    let ids = json["user_ids"].as_array().unwrap();
    assert!(ids.iter().any(|id| id == alice.id.as_str()));
    assert!(ids.iter().any(|id| id == bob.id.as_str()));
}

#[tokio::test]
async fn disconnect_removes_user() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;

    let ws = app.connect_ws(&alice.access_token).await;
    assert!(app.state.presence.is_online(alice.oid()));

    ws.close().await;
    for _ in 0..50 {
        if !app.state.presence.is_online(alice.oid()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!app.state.presence.is_online(alice.oid()));
}

#[tokio::test]
async fn reconnect_wins_and_stale_close_keeps_new_connection() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;

    let old_ws = app.connect_ws(&bob.access_token).await;
    let mut new_ws = app.connect_ws(&bob.access_token).await;
    assert_eq!(app.state.presence.connection_count(), 1);

    // Closing the superseded socket must not take Bob offline
    old_ws.close().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(app.state.presence.is_online(bob.oid()));

    let sent = app.send_direct(&alice, &bob, "to the new socket").await;
    let event = new_ws
        .expect_event("message:new", Duration::from_secs(5))
        .await;
    assert_eq!(event["data"]["id"], sent["id"]);
}

#[tokio::test]
async fn bad_token_is_rejected() {
    let app = TestApp::spawn().await;
    let result = tokio_tungstenite::connect_async(app.ws_url("not-a-jwt")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn ping_and_invalid_room_join() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let mallory = app.register_user("mallory", "Mallory").await;
    let group_id = app.create_group(&alice, "Closed", &[&bob]).await;

    let mut ws = app.connect_ws(&mallory.access_token).await;
    ws.send_json(serde_json::json!({ "type": "ping" })).await;
    ws.expect_event("pong", Duration::from_secs(2)).await;

    ws.send_json(serde_json::json!({
        "type": "room:join",
        "data": { "container": { "kind": "group", "id": group_id } },
    }))
    .await;
    let error = ws.expect_event("error", Duration::from_secs(2)).await;
    assert_eq!(error["data"]["type"], "room:join");
}

#[tokio::test]
async fn room_join_after_joining_group() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let group_id = app.create_group(&alice, "Open", &[]).await;

    let mut bob_ws = app.connect_ws(&bob.access_token).await;
    let resp = app
        .auth_post(&format!("/api/group/{}/join", group_id), &bob.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    bob_ws
        .send_json(serde_json::json!({
            "type": "room:join",
            "data": { "container": { "kind": "group", "id": group_id } },
        }))
        .await;
    assert!(bob_ws
        .next_event("error", Duration::from_millis(300))
        .await
        .is_none());

    let gid = bson::oid::ObjectId::parse_str(&group_id).unwrap();
    assert!(app.state.presence.room_members(gid).contains(&bob.oid()));
}

#[tokio::test]
async fn offline_members_get_rooms_on_connect() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;

    let group_id = app.create_group(&alice, "Later", &[&bob]).await;
    let gid = bson::oid::ObjectId::parse_str(&group_id).unwrap();
    assert!(app.state.presence.room_members(gid).is_empty());

    let _bob_ws = app.connect_ws(&bob.access_token).await;
    assert_eq!(app.state.presence.room_members(gid), vec![bob.oid()]);
}
