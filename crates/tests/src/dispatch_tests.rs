use std::time::Duration;

use bson::{DateTime, oid::ObjectId};
use futures::future::join_all;
use parley_db::models::{ContainerRef, DeliveryStatus, LastMessage};
use serde_json::Value;

use crate::fixtures::test_app::TestApp;

fn oid(value: &Value) -> ObjectId {
    ObjectId::parse_str(value.as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn online_receiver_gets_message_and_ack_marks_delivered() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    app.add_push_token(&bob, "bob-phone").await;

    let mut bob_ws = app.connect_ws(&bob.access_token).await;
    let sent = app.send_direct(&alice, &bob, "Are you there?").await;

    let event = bob_ws
        .expect_event("message:new", Duration::from_secs(5))
        .await;
    assert_eq!(event["data"]["id"], sent["id"]);
    assert_eq!(event["data"]["content"], "Are you there?");
    assert!(event["ack_id"].is_string());

    bob_ws.ack(&event).await;
    app.settle().await;

    let stored = app.state.messages.base.find_by_id(oid(&sent["id"])).await.unwrap();
    assert_eq!(stored.status.status, DeliveryStatus::Delivered);
    assert!(app.push.calls().await.is_empty(), "Online receiver must not get a push");
}

#[tokio::test]
async fn offline_receiver_gets_one_push() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    app.add_push_token(&bob, "bob-phone").await;
    app.add_push_token(&bob, "bob-tablet").await;

    let content = "This message is definitely longer than thirty characters";
    let sent = app.send_direct(&alice, &bob, content).await;
    app.settle().await;

    let calls = app.push.calls().await;
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.tokens, vec!["bob-phone".to_string(), "bob-tablet".to_string()]);
    assert_eq!(call.payload.title, "New message from Alice");
    assert_eq!(call.payload.body, "This message is definitely lon...");
    assert_eq!(call.payload.data["message_id"], sent["id"].as_str().unwrap());
    assert_eq!(call.payload.data["container_kind"], "conversation");

    let stored = app.state.messages.base.find_by_id(oid(&sent["id"])).await.unwrap();
    assert_eq!(stored.status.status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn offline_receiver_without_tokens_gets_nothing() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;

    app.send_direct(&alice, &bob, "Nobody home").await;
    app.settle().await;

    assert!(app.push.calls().await.is_empty());
}

#[tokio::test]
async fn unacknowledged_push_keeps_message_and_skips_fallback() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    app.add_push_token(&bob, "bob-phone").await;

    let mut bob_ws = app.connect_ws(&bob.access_token).await;
    let sent = app.send_direct(&alice, &bob, "Silent client").await;

    // Receive but never ack
    bob_ws
        .expect_event("message:new", Duration::from_secs(5))
        .await;
    app.settle().await;

    let stored = app.state.messages.base.find_by_id(oid(&sent["id"])).await.unwrap();
    assert_eq!(stored.status.status, DeliveryStatus::Sent);
    assert!(app.push.calls().await.is_empty());
    assert_eq!(app.state.presence.pending_acks(), 0);

    let conversation_id = sent["container"]["id"].as_str().unwrap();
    let resp = app
        .auth_get(
            &format!("/api/conversation/{}/message", conversation_id),
            &bob.access_token,
        )
        .send()
        .await
        .unwrap();
    let history: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], sent["id"]);
}

#[tokio::test]
async fn summary_keeps_newest_regardless_of_apply_order() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;

    let conversation = app
        .state
        .containers
        .find_or_create_conversation(alice.oid(), bob.oid())
        .await
        .unwrap();
    let container = ContainerRef::Conversation(conversation.id.unwrap());

    let base = DateTime::now().timestamp_millis();
    let summaries: Vec<LastMessage> = (1..=5)
        .map(|i| LastMessage {
            message_id: ObjectId::new(),
            sender_id: alice.oid(),
            preview: format!("t{i}"),
            created_at: DateTime::from_millis(base + i * 1000),
        })
        .collect();

    // Reverse order: only the first applies
    for summary in summaries.iter().rev() {
        app.state.containers.apply_summary(container, summary).await.unwrap();
    }
    let stored = app.state.containers.conversations.find_by_id(container.id()).await.unwrap();
    assert_eq!(stored.last_message.unwrap().preview, "t5");

    // Shuffled
    for i in [2usize, 4, 0, 3, 1] {
        app.state.containers.apply_summary(container, &summaries[i]).await.unwrap();
    }
    let stored = app.state.containers.conversations.find_by_id(container.id()).await.unwrap();
    assert_eq!(stored.last_message.unwrap().preview, "t5");
    assert_eq!(stored.last_activity, Some(summaries[4].created_at));

    // Concurrent
    let updates = summaries
        .iter()
        .map(|s| app.state.containers.apply_summary(container, s));
    join_all(updates).await;
    let stored = app.state.containers.conversations.find_by_id(container.id()).await.unwrap();
    assert_eq!(stored.last_message.unwrap().preview, "t5");
}

#[tokio::test]
async fn send_updates_conversation_summary() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;

    let sent = app.send_direct(&alice, &bob, "Summary me").await;
    app.settle().await;

    let conversation = app
        .state
        .containers
        .conversations
        .find_by_id(oid(&sent["container"]["id"]))
        .await
        .unwrap();
    let last = conversation.last_message.unwrap();
    assert_eq!(last.message_id, oid(&sent["id"]));
    assert_eq!(last.sender_id, alice.oid());
    assert_eq!(last.preview, "Summary me");
}

#[tokio::test]
async fn attachment_only_message_uses_placeholder_preview() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    app.add_push_token(&bob, "bob-phone").await;

    let resp = app
        .auth_post("/api/conversation/message", &alice.access_token)
        .json(&serde_json::json!({
            "receiver_id": bob.id,
            "photo_urls": ["https://cdn.example.com/cat.png"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    app.settle().await;

    let calls = app.push.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload.body, "Sent a photo");
}

#[tokio::test]
async fn group_fan_out_skips_sender_and_pushes_offline_members() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let carol = app.register_user("carol", "Carol").await;
    app.add_push_token(&alice, "alice-phone").await;
    app.add_push_token(&carol, "carol-phone").await;

    let group_id = app.create_group(&alice, "Team", &[&bob, &carol]).await;

    let mut alice_ws = app.connect_ws(&alice.access_token).await;
    let mut bob_ws = app.connect_ws(&bob.access_token).await;

    let sent = app.send_group(&alice, &group_id, "Standup in 5").await;

    let event = bob_ws
        .expect_event("message:group_new", Duration::from_secs(5))
        .await;
    assert_eq!(event["data"]["id"], sent["id"]);
    assert_eq!(event["data"]["container"]["id"], group_id.as_str());
    bob_ws.ack(&event).await;

    assert!(alice_ws
        .next_event("message:group_new", Duration::from_millis(500))
        .await
        .is_none());

    app.settle().await;

    let calls = app.push.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tokens, vec!["carol-phone".to_string()]);
    assert_eq!(calls[0].payload.data["container_kind"], "group");
}

#[tokio::test]
async fn invalid_tokens_are_removed_after_push() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    app.add_push_token(&bob, "good-token").await;
    app.add_push_token(&bob, "dead-token").await;
    app.push.mark_invalid("dead-token").await;

    app.send_direct(&alice, &bob, "ping").await;
    app.settle().await;

    let user = app.state.users.base.find_by_id(bob.oid()).await.unwrap();
    assert_eq!(user.push_token_values(), vec!["good-token".to_string()]);
}

#[tokio::test]
async fn invalid_sends_are_rejected() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let mallory = app.register_user("mallory", "Mallory").await;

    let resp = app
        .auth_post("/api/conversation/message", &alice.access_token)
        .json(&serde_json::json!({ "receiver_id": bob.id, "content": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    let resp = app
        .auth_post("/api/conversation/message", &alice.access_token)
        .json(&serde_json::json!({ "receiver_id": alice.id, "content": "me" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    let resp = app
        .auth_post("/api/conversation/message", &alice.access_token)
        .json(&serde_json::json!({ "content": "nowhere" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    let group_id = app.create_group(&alice, "Private", &[&bob]).await;
    let resp = app
        .auth_post(&format!("/api/group/{}/message", group_id), &mallory.access_token)
        .json(&serde_json::json!({ "content": "intruder" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_post("/api/conversation/message", &alice.access_token)
        .json(&serde_json::json!({
            "receiver_id": bob.id,
            "content": "see this",
            "references": { "kind": "reply" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn invitation_requires_channel_membership() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let carol = app.register_user("carol", "Carol").await;

    let channel_id = app.create_channel(&carol, "News", &[]).await;

    let resp = app
        .auth_post("/api/conversation/message", &alice.access_token)
        .json(&serde_json::json!({
            "receiver_id": bob.id,
            "content": "Join us",
            "references": { "kind": "invitation", "channel_id": channel_id },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_post("/api/conversation/message", &carol.access_token)
        .json(&serde_json::json!({
            "receiver_id": bob.id,
            "content": "Join us",
            "references": { "kind": "invitation", "channel_id": channel_id },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["references"]["kind"], "invitation");
    assert_eq!(json["references"]["channel_id"], channel_id.as_str());
}

#[tokio::test]
async fn concurrent_group_sends_leave_newest_summary() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let group_id = app.create_group(&alice, "Burst", &[&bob]).await;

    let bodies: Vec<String> = (1..=5).map(|i| format!("burst {i}")).collect();
    let sends = bodies.iter().map(|body| app.send_group(&alice, &group_id, body));
    let sent = join_all(sends).await;
    app.settle().await;

    let mut created = Vec::new();
    for message in &sent {
        let stored = app.state.messages.base.find_by_id(oid(&message["id"])).await.unwrap();
        created.push(stored.created_at);
    }
    let newest = created.into_iter().max();

    let gid = ObjectId::parse_str(&group_id).unwrap();
    let group = app.state.containers.groups.find_by_id(gid).await.unwrap();
    let last = group.last_message.unwrap();
    assert_eq!(Some(last.created_at), newest);
    assert_eq!(group.last_activity, newest);
}

#[tokio::test]
async fn offline_push_does_not_wait_for_silent_client() {
    let app = TestApp::spawn_with_settings(|s| {
        s.dispatch.ack_timeout_ms = 4000;
    })
    .await;
    let alice = app.register_user("alice", "Alice").await;
    let bob = app.register_user("bob", "Bob").await;
    let carol = app.register_user("carol", "Carol").await;
    app.add_push_token(&carol, "carol-phone").await;
    let group_id = app.create_group(&alice, "Mixed", &[&bob, &carol]).await;

    let mut bob_ws = app.connect_ws(&bob.access_token).await;
    let started = tokio::time::Instant::now();
    app.send_group(&alice, &group_id, "anyone?").await;

    // Bob receives but never acks
    bob_ws
        .expect_event("message:group_new", Duration::from_secs(2))
        .await;

    let mut calls = Vec::new();
    while started.elapsed() < Duration::from_secs(2) {
        calls = app.push.calls().await;
        if !calls.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(calls.len(), 1, "Carol's push waited on Bob's ack");
    assert_eq!(calls[0].tokens, vec!["carol-phone".to_string()]);
    assert!(app.state.presence.pending_acks() > 0);
}
