//! A feed driver paging through the real store while messages are posted
//! over HTTP.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use agora_feed::{FeedConfig, FeedDriver, FeedState, PushChannel};
use agora_server::api::MEMBER_HEADER;
use agora_server::{build_router, AppState, ServerConfig, StoreSource};
use agora_shared::FeedScope;
use agora_store::Database;

async fn call(app: &Router, method: Method, uri: &str, member: Option<&str>, body: Value) -> Value {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(member) = member {
        builder = builder.header(MEMBER_HEADER, member);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_success(), "{uri}: {}", response.status());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_feed_follows_http_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("agora.db")).unwrap();
    let state = AppState::new(db, ServerConfig::default());
    let app = build_router(state.clone());

    let alice = call(&app, Method::POST, "/profiles", None, json!({"name": "Alice"})).await;
    let created = call(
        &app,
        Method::POST,
        "/servers",
        None,
        json!({"profileId": alice["id"], "name": "Plaza"}),
    )
    .await;
    let member = created["member"]["id"].as_str().unwrap().to_string();
    let channel = created["channel"]["id"].as_str().unwrap().to_string();
    let messages_uri = format!("/scopes/channel/{channel}/messages");

    for i in 1..=4 {
        call(&app, Method::POST, &messages_uri, Some(&member), json!({"content": format!("m{i}")})).await;
    }

    let push: Arc<dyn PushChannel> = state.hub.clone();
    let feed = FeedDriver::spawn(
        StoreSource::new(state.db.clone()),
        push,
        FeedConfig::with_page_size(3),
    );
    let scope = FeedScope::channel(channel.clone());
    feed.open(scope.clone()).await.unwrap();

    let view = feed.wait_for(|v| v.state == FeedState::Ready).await.unwrap();
    let contents: Vec<_> = view.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m2", "m3", "m4"]);
    assert!(view.has_more);

    // A post after the first page arrives live.
    let posted = call(&app, Method::POST, &messages_uri, Some(&member), json!({"content": "m5"})).await;
    let view = feed.wait_for(|v| v.messages.len() == 4).await.unwrap();
    assert_eq!(view.messages.last().unwrap().id.as_str(), posted["id"].as_str().unwrap());

    // Edit and delete flow through as well.
    let id = posted["id"].as_str().unwrap();
    call(&app, Method::PATCH, &format!("/messages/{id}"), Some(&member), json!({"content": "m5!"})).await;
    feed.wait_for(|v| v.messages.last().map(|m| m.content.as_str()) == Some("m5!"))
        .await
        .unwrap();
    call(&app, Method::DELETE, &format!("/messages/{id}"), Some(&member), json!({})).await;
    let view = feed
        .wait_for(|v| v.messages.last().is_some_and(|m| m.deleted))
        .await
        .unwrap();
    assert_eq!(view.messages.last().unwrap().content, "");

    feed.load_more().await.unwrap();
    let view = feed
        .wait_for(|v| v.state == FeedState::Ready && !v.has_more)
        .await
        .unwrap();
    let contents: Vec<_> = view.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m1", "m2", "m3", "m4", ""]);

    feed.close().await.unwrap();
    feed.wait_for(|v| v.state == FeedState::Closed).await.unwrap();
    assert_eq!(state.hub.subscriber_count(&scope), 0);
}
