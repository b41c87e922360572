use super::handlers::{comments, reactions, replies, sse};
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState, allowed_origins: &str) -> Router {
    let cors = if allowed_origins == "*" {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("CORS config is invalid or empty, falling back to allow ANY.");
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_origin(Any)
                .allow_headers(Any)
        } else {
            tracing::info!("CORS enabled for origins: {:?}", origins);
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_origin(origins)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route(
            "/api/comments",
            get(comments::list_comments).post(comments::post_comment),
        )
        .route("/api/comments/live", get(sse::live_comments))
        .route("/api/replies", post(replies::post_reply))
        .route("/api/reactions", post(reactions::post_reaction))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use engine::{MemoryBlobStore, WidgetSettings};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use storage::MemoryStore;
    use tokio::time::timeout;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(
            AppState {
                store: Arc::new(MemoryStore::new()),
                blobs: Arc::new(MemoryBlobStore::default()),
                widget: WidgetSettings::default(),
            },
            "*",
        )
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post(uri: &str, body: Value, signed_in: bool) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if signed_in {
            builder = builder
                .header("x-user-id", "u1")
                .header("x-user-name", "Ada");
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn post_reply_react_then_list() {
        let app = app();
        let (status, comment) = send(&app, post("/api/comments", json!({ "content": "<p>hi</p>" }), true)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["author"]["name"], "Ada");

        let address = format!("comments/{}", comment["id"].as_str().unwrap());
        let (status, _) = send(
            &app,
            post("/api/replies", json!({ "address": address, "content": "re" }), true),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, reacted) = send(
            &app,
            post("/api/reactions", json!({ "address": address, "emoji": "👍" }), true),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reacted["reactions"]["👍"], 1);

        let (status, page) = send(&app, get("/api/comments?sort=popular")).await;
        assert_eq!(status, StatusCode::OK);
        let comments = page["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["children"].as_array().unwrap().len(), 1);
        assert!(page["next_cursor"].is_null());
    }

    #[tokio::test]
    async fn full_page_hands_out_a_cursor() {
        let app = app();
        for i in 0..9 {
            send(&app, post("/api/comments", json!({ "content": format!("c{}", i) }), true)).await;
        }
        let (_, first) = send(&app, get("/api/comments")).await;
        assert_eq!(first["comments"].as_array().unwrap().len(), 8);
        let cursor = first["next_cursor"].as_str().unwrap().to_string();

        let (_, second) = send(&app, get(&format!("/api/comments?cursor={}", cursor))).await;
        assert_eq!(second["comments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn errors_map_to_statuses() {
        let app = app();
        let (status, _) = send(&app, post("/api/comments", json!({ "content": "x" }), false)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let long = "x".repeat(251);
        let (status, _) = send(&app, post("/api/comments", json!({ "content": long }), true)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            &app,
            post("/api/replies", json!({ "address": "comments/ghost", "content": "x" }), true),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            post("/api/reactions", json!({ "address": "posts/x", "emoji": "👍" }), true),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, get("/api/comments?sort=oldest")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn live_stream_sends_one_forest_per_change() {
        let app = app();
        send(&app, post("/api/comments", json!({ "content": "first" }), true)).await;

        let response = app.clone().oneshot(get("/api/comments/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut frames = response.into_body().into_data_stream();

        let connect = timeout(Duration::from_secs(5), frames.next()).await.unwrap().unwrap().unwrap();
        let connect = String::from_utf8_lossy(&connect).to_string();
        assert!(connect.starts_with("event: forest"));
        assert!(connect.contains("first"));

        // the feed's initial snapshot matches what was sent on connect
        assert!(timeout(Duration::from_millis(300), frames.next()).await.is_err());

        send(&app, post("/api/comments", json!({ "content": "second" }), true)).await;
        let update = timeout(Duration::from_secs(5), frames.next()).await.unwrap().unwrap().unwrap();
        let update = String::from_utf8_lossy(&update).to_string();
        assert!(update.contains("second"));
        assert!(update.contains("first"));
    }
}
