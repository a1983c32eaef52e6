use std::time::Duration;

use bson::oid::ObjectId;
use parley_db::models::DeliveryStatus;
use serde_json::Value;

use crate::fixtures::test_app::TestApp;

async fn post(app: &TestApp, token: &str, channel_id: &str, content: &str) -> reqwest::Response {
    app.auth_post(&format!("/api/channel/{}/message", channel_id), token)
        .json(&serde_json::json!({ "content": content }))
        .send()
        .await
        .unwrap()
}

async fn comment(app: &TestApp, token: &str, message_id: &str, content: &str) -> reqwest::Response {
    app.auth_post(&format!("/api/channel/message/{}/comment", message_id), token)
        .json(&serde_json::json!({ "content": content }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn only_admins_post_top_level() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let channel_id = app.create_channel(&alice, "Announcements", &[&bob]).await;

    let resp = post(&app, &bob.access_token, &channel_id, "hijack").await;
    assert_eq!(resp.status().as_u16(), 403);

    let resp = post(&app, &alice.access_token, &channel_id, "Welcome").await;
    assert_eq!(resp.status().as_u16(), 201);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["container"]["kind"], "channel");
}

#[tokio::test]
async fn member_management_rules() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let carol = app.register_user("carol", "Carol").await;
    let channel_id = app.create_channel(&alice, "Crew", &[&bob]).await;

    let path = format!("/api/channel/{}/member", channel_id);
    let resp = app
        .auth_post(&path, &bob.access_token)
        .json(&serde_json::json!({ "user_id": carol.id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_post(&path, &alice.access_token)
        .json(&serde_json::json!({ "user_id": bob.id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    let resp = app
        .auth_get("/api/channel", &bob.access_token)
        .send()
        .await
        .unwrap();
    let channels: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0]["admin_ids"][0], alice.id);

    let resp = app
        .auth_get("/api/channel", &carol.access_token)
        .send()
        .await
        .unwrap();
    let channels: Vec<Value> = resp.json().await.unwrap();
    assert!(channels.is_empty());
}

#[tokio::test]
async fn channel_post_reaches_members_without_delivered_status() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let channel_id = app.create_channel(&alice, "News", &[&bob]).await;

    let mut bob_ws = app.connect_ws(&bob.access_token).await;
    let resp = post(&app, &alice.access_token, &channel_id, "Release is out").await;
    let sent: Value = resp.json().await.unwrap();

    let event = bob_ws
        .expect_event("message:channel_new", Duration::from_secs(5))
        .await;
    assert_eq!(event["data"]["id"], sent["id"]);
    bob_ws.ack(&event).await;
    app.settle().await;

    let id = ObjectId::parse_str(sent["id"].as_str().unwrap()).unwrap();
    let stored = app.state.messages.base.find_by_id(id).await.unwrap();
    assert_eq!(stored.status.status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn comment_broadcast_skips_author() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let channel_id = app.create_channel(&alice, "Discuss", &[&bob]).await;

    let resp = post(&app, &alice.access_token, &channel_id, "Thoughts?").await;
    let sent: Value = resp.json().await.unwrap();
    let message_id = sent["id"].as_str().unwrap();
    app.settle().await;

    let mut alice_ws = app.connect_ws(&alice.access_token).await;
    let mut bob_ws = app.connect_ws(&bob.access_token).await;

    let resp = comment(&app, &bob.access_token, message_id, "Looks good").await;
    assert_eq!(resp.status().as_u16(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["author_id"], bob.id);
    assert_eq!(created["channel_id"], channel_id.as_str());

    let event = alice_ws
        .expect_event("comment:channel_new", Duration::from_secs(5))
        .await;
    assert_eq!(event["data"]["id"], created["id"]);
    assert_eq!(event["data"]["message_id"], message_id);

    assert!(bob_ws
        .next_event("comment:channel_new", Duration::from_millis(500))
        .await
        .is_none());

    let resp = app
        .auth_get(
            &format!("/api/channel/message/{}/comment", message_id),
            &alice.access_token,
        )
        .send()
        .await
        .unwrap();
    let comments: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["content"], "Looks good");
}

#[tokio::test]
async fn comment_does_not_move_summary() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let channel_id = app.create_channel(&alice, "Quiet", &[&bob]).await;

    let resp = post(&app, &alice.access_token, &channel_id, "Top level").await;
    let sent: Value = resp.json().await.unwrap();
    app.settle().await;

    comment(&app, &bob.access_token, sent["id"].as_str().unwrap(), "A reply").await;
    app.settle().await;

    let cid = ObjectId::parse_str(&channel_id).unwrap();
    let channel = app.state.containers.channels.find_by_id(cid).await.unwrap();
    assert_eq!(channel.last_message.unwrap().preview, "Top level");
}

#[tokio::test]
async fn comments_only_on_channel_posts_by_members() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let mallory = app.register_user("mallory", "Mallory").await;

    let direct = app.send_direct(&alice, &bob, "just us").await;
    let resp = comment(&app, &bob.access_token, direct["id"].as_str().unwrap(), "hm").await;
    assert_eq!(resp.status().as_u16(), 422);

    let channel_id = app.create_channel(&alice, "Members", &[&bob]).await;
    let resp = post(&app, &alice.access_token, &channel_id, "Members only").await;
    let sent: Value = resp.json().await.unwrap();

    let resp = comment(&app, &mallory.access_token, sent["id"].as_str().unwrap(), "hi").await;
    assert_eq!(resp.status().as_u16(), 403);

    let resp = comment(&app, &bob.access_token, sent["id"].as_str().unwrap(), "").await;
    assert_eq!(resp.status().as_u16(), 422);
}
