//! Gateway and client behaviour against a local HTTP server

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use storecheck_client::{
    ApiError, Delivery, Gateway, GatewayConfig, Lookup, Method, ProductsApi, RequestOptions,
    TimeoutPolicy,
};

async fn spawn_server() -> String {
    let app = Router::new()
        .route(
            "/echo",
            get(|headers: HeaderMap, Query(query): Query<HashMap<String, String>>| async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                Json(json!({
                    "contentType": header("content-type"),
                    "trace": header("x-trace"),
                    "query": query,
                }))
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"ok": true}))
            }),
        )
        .route("/plain", get(|| async { "just text" }))
        .route(
            "/products/:id",
            get(|Path(id): Path<String>| async move {
                match id.as_str() {
                    "1" => (
                        StatusCode::OK,
                        Json(json!({
                            "id": 1,
                            "title": "Essence Mascara Lash Princess",
                            "description": "A popular mascara",
                            "price": 9.99
                        })),
                    ),
                    "2" => (StatusCode::OK, Json(json!({"id": 2}))),
                    "500" => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"message": "boom"})),
                    ),
                    other => (
                        StatusCode::NOT_FOUND,
                        Json(json!({"message": format!("Product with id '{}' not found", other)})),
                    ),
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn error_status_is_returned_not_raised() {
    let base_url = spawn_server().await;
    let gateway = Gateway::new(&base_url).unwrap();

    let response = gateway
        .send(Method::GET, "/products/999", None, RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
    assert_eq!(
        response.body["message"],
        json!("Product with id '999' not found")
    );
}

#[tokio::test]
async fn default_and_caller_headers_reach_the_server() {
    let base_url = spawn_server().await;
    let gateway = Gateway::new(&base_url).unwrap();

    let response = gateway
        .send(Method::GET, "/echo", None, RequestOptions::new().query("q", "phone"))
        .await
        .unwrap();
    assert_eq!(response.body["contentType"], json!("application/json"));
    assert_eq!(response.body["query"]["q"], json!("phone"));

    let response = gateway
        .send(
            Method::GET,
            "/echo",
            None,
            RequestOptions::new()
                .header("Content-Type", "application/vnd.test+json")
                .header("X-Trace", "t-1"),
        )
        .await
        .unwrap();
    assert_eq!(response.body["contentType"], json!("application/vnd.test+json"));
    assert_eq!(response.body["trace"], json!("t-1"));
}

#[tokio::test]
async fn per_call_timeout_surfaces_as_timeout_error() {
    let base_url = spawn_server().await;
    let gateway = Gateway::new(&base_url).unwrap();

    let result = gateway
        .send(
            Method::GET,
            "/slow",
            None,
            RequestOptions::new().timeout(Duration::from_millis(50)),
        )
        .await;

    match result {
        Err(ApiError::Timeout { path, after }) => {
            assert_eq!(path, "/slow");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn tolerated_timeout_is_not_an_error() {
    let base_url = spawn_server().await;
    let gateway = Gateway::with_config(GatewayConfig {
        base_url,
        default_timeout: Duration::from_millis(50),
        ..Default::default()
    })
    .unwrap();

    let result = gateway
        .send(Method::GET, "/slow", None, RequestOptions::default())
        .await;
    let delivery = TimeoutPolicy::Tolerate.apply(result).unwrap();
    assert!(matches!(delivery, Delivery::TimedOut { .. }));
}

#[tokio::test]
async fn non_json_body_is_kept_as_text() {
    let base_url = spawn_server().await;
    let gateway = Gateway::new(&base_url).unwrap();

    let response = gateway
        .send(Method::GET, "/plain", None, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Value::String("just text".to_string()));
}

#[tokio::test]
async fn find_product_maps_statuses() {
    let base_url = spawn_server().await;
    let api = ProductsApi::connect(&base_url).unwrap();

    let found = api.find_product(1).await.unwrap().found().unwrap();
    assert_eq!(found.title, "Essence Mascara Lash Princess");

    assert_eq!(api.find_product(42).await.unwrap(), Lookup::NotFound);

    assert!(matches!(
        api.find_product(500).await,
        Err(ApiError::UnexpectedStatus { status: 500, .. })
    ));

    // 200 with a body missing required fields
    assert!(matches!(api.find_product(2).await, Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn transport_failure_is_distinct_from_timeout() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = Gateway::new(&format!("http://{}", addr)).unwrap();
    let err = gateway
        .send(Method::GET, "/products", None, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn raw_id_stays_inside_the_product_path() {
    let base_url = spawn_server().await;
    let api = ProductsApi::connect(&base_url).unwrap();

    let response = api.get_product_raw("1?x=1").await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(
        response.body["message"],
        "Product with id '1?x=1' not found"
    );

    let response = api.get_product_raw("a#b").await.unwrap();
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn dot_segments_never_leave_the_collection() {
    let base_url = spawn_server().await;
    let api = ProductsApi::connect(&base_url).unwrap();

    for segment in [".", ".."] {
        assert!(matches!(
            api.get_product_raw(segment).await,
            Err(ApiError::InvalidUrl { .. })
        ));
    }
}
