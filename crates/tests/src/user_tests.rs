use bson::{DateTime, doc};
use parley_db::models::User;

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn push_token_add_is_idempotent_and_removable() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice", "Alice").await;

    let first = app
        .auth_post("/api/user/push-token", &alice.access_token)
        .json(&serde_json::json!({ "token": "device-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let again = app
        .auth_post("/api/user/push-token", &alice.access_token)
        .json(&serde_json::json!({ "token": "device-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 200);

    let user = app.state.users.base.find_by_id(alice.oid()).await.unwrap();
    assert_eq!(user.push_token_values(), vec!["device-1".to_string()]);

    let resp = app
        .auth_delete("/api/user/push-token/device-1", &alice.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let user = app.state.users.base.find_by_id(alice.oid()).await.unwrap();
    assert!(user.push_tokens.is_empty());
}

#[tokio::test]
async fn stale_push_tokens_are_pruned() {
    let app = TestApp::spawn().await;
    let bob = app.register_user("bob", "Bob").await;
    app.add_push_token(&bob, "fresh").await;

    let old = DateTime::from_millis(DateTime::now().timestamp_millis() - 40 * 24 * 3600 * 1000);
    app.db
        .collection::<User>(User::COLLECTION)
        .update_one(
            doc! { "_id": bob.oid() },
            doc! { "$push": { "push_tokens": { "token": "stale", "created_at": old } } },
        )
        .await
        .unwrap();

    let cutoff = DateTime::from_millis(DateTime::now().timestamp_millis() - 30 * 24 * 3600 * 1000);
    let touched = app.state.users.prune_stale_push_tokens(cutoff).await.unwrap();
    assert_eq!(touched, 1);

    let user = app.state.users.base.find_by_id(bob.oid()).await.unwrap();
    assert_eq!(user.push_token_values(), vec!["fresh".to_string()]);
}
