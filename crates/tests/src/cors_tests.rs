use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn any_origin_when_none_configured() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .get(app.url("/health"))
        .header("Origin", "http://anywhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn configured_origins_are_enforced() {
    let app = TestApp::spawn_with_settings(|s| {
        s.app.cors_origins = vec!["http://chat.example".to_string()];
    })
    .await;

    let allowed = app
        .client
        .get(app.url("/health"))
        .header("Origin", "http://chat.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://chat.example")
    );

    let other = app
        .client
        .get(app.url("/health"))
        .header("Origin", "http://evil.example")
        .send()
        .await
        .unwrap();
    assert!(other.headers().get("access-control-allow-origin").is_none());
}
