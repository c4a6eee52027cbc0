//! Stub catalog server for offline runs
//!
//! An in-process axum server that answers the six products endpoints the way
//! the public mock API does, including its quirks: creates are not persisted,
//! deletes only mark the product, unknown ids answer 404 and non-numeric ids
//! answer 400.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::validate::locale_compare;

/// Page size when a request does not set `limit`
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Configuration for the stub server
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Port to listen on (None = any free port)
    pub port: Option<u16>,

    /// Timeout for the readiness probe
    pub startup_timeout: Duration,

    /// Artificial delay added to every products response
    pub response_delay: Duration,

    /// Catalog served; defaults to [`seed_catalog`]
    pub catalog: Vec<Value>,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            port: None,
            startup_timeout: Duration::from_secs(10),
            response_delay: Duration::ZERO,
            catalog: seed_catalog(),
        }
    }
}

/// Handle to a running stub server; stops it on drop
pub struct StubServer {
    base_url: String,
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

struct Catalog {
    products: Vec<Value>,
    delay: Duration,
}

type Shared = Arc<Catalog>;

impl StubServer {
    /// Bind, start serving and wait until the server answers
    pub async fn spawn(config: StubConfig) -> E2eResult<Self> {
        let addr = format!("127.0.0.1:{}", config.port.unwrap_or(0));
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| E2eError::ServerStartup(format!("Failed to bind {}: {}", addr, e)))?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Spawning stub catalog on port {}", port);

        let state = Arc::new(Catalog {
            products: config.catalog,
            delay: config.response_delay,
        });
        let app = router(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!("Stub catalog stopped with error: {}", e);
            }
        });

        let server = StubServer {
            base_url,
            port,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };

        server.wait_for_healthy(config.startup_timeout).await?;

        info!("Stub catalog is healthy at {}", server.base_url);
        Ok(server)
    }

    /// Wait for the server to respond to health checks
    async fn wait_for_healthy(&self, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}/test", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => warn!("Health check returned {}", resp.status()),
                Err(e) => {
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(50)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            debug!("Stopping stub catalog on port {}", self.port);
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/test", get(health))
        .route("/products", get(list_products))
        .route("/products/search", get(search_products))
        .route("/products/add", post(add_product))
        .route(
            "/products/:id",
            get(get_product)
                .put(update_product)
                .patch(update_product)
                .delete(delete_product),
        )
        .with_state(state)
}

fn message(status: StatusCode, text: String) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

impl Catalog {
    async fn delay(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }

    /// Resolve an id path segment: 400 when it is not a number, 404 when
    /// nothing has that id
    fn lookup(&self, segment: &str) -> Result<&Value, Response> {
        let id: u64 = segment.parse().map_err(|_| {
            message(
                StatusCode::BAD_REQUEST,
                format!("Invalid product id '{}'", segment),
            )
        })?;
        self.products
            .iter()
            .find(|p| p["id"].as_u64() == Some(id))
            .ok_or_else(|| {
                message(
                    StatusCode::NOT_FOUND,
                    format!("Product with id '{}' not found", segment),
                )
            })
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "method": "GET" }))
}

/// Sort and paginate `items` according to the list query parameters
pub fn paginate(mut items: Vec<Value>, params: &HashMap<String, String>) -> Result<Value, String> {
    let parse = |key: &str| -> Result<Option<usize>, String> {
        params
            .get(key)
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|_| format!("Invalid '{}' parameter '{}'", key, raw))
            })
            .transpose()
    };
    let limit = parse("limit")?;
    let skip = parse("skip")?.unwrap_or(0);

    if let Some(field) = params.get("sortBy") {
        let descending = params.get("order").map(|o| o == "desc").unwrap_or(false);
        items.sort_by(|a, b| {
            let ordering = compare_field(&a[field.as_str()], &b[field.as_str()]);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let total = items.len();
    let limit = match limit {
        Some(0) => total,
        Some(n) => n,
        None => DEFAULT_PAGE_SIZE,
    };
    let page: Vec<Value> = items.into_iter().skip(skip).take(limit).collect();

    Ok(json!({
        "products": page,
        "total": total,
        "skip": skip,
        "limit": limit,
    }))
}

/// Total order over sort-field values: null (or missing), then booleans,
/// numbers, strings, arrays and objects. Values of the same kind compare by
/// content where that is meaningful.
fn compare_field(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::String(a), Value::String(b)) => locale_compare(a, b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        }
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn matches_query(product: &Value, query: &str) -> bool {
    let needle = query.to_lowercase();
    ["title", "description", "category", "brand"]
        .iter()
        .filter_map(|field| product[*field].as_str())
        .any(|text| text.to_lowercase().contains(&needle))
}

async fn list_products(
    State(catalog): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    catalog.delay().await;
    match paginate(catalog.products.clone(), &params) {
        Ok(body) => Json(body).into_response(),
        Err(reason) => message(StatusCode::BAD_REQUEST, reason),
    }
}

async fn search_products(
    State(catalog): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    catalog.delay().await;
    let query = params.get("q").map(String::as_str).unwrap_or("");
    let hits: Vec<Value> = catalog
        .products
        .iter()
        .filter(|p| matches_query(p, query))
        .cloned()
        .collect();
    match paginate(hits, &params) {
        Ok(body) => Json(body).into_response(),
        Err(reason) => message(StatusCode::BAD_REQUEST, reason),
    }
}

async fn get_product(State(catalog): State<Shared>, Path(id): Path<String>) -> Response {
    catalog.delay().await;
    match catalog.lookup(&id) {
        Ok(product) => Json(product.clone()).into_response(),
        Err(response) => response,
    }
}

/// Answers 201 with a fabricated id; nothing is stored
async fn add_product(State(catalog): State<Shared>, Json(body): Json<Value>) -> Response {
    catalog.delay().await;
    let Some(fields) = body.as_object() else {
        return message(StatusCode::BAD_REQUEST, "Body must be a JSON object".to_string());
    };

    let mut created = Map::new();
    created.insert("id".to_string(), json!(catalog.products.len() + 1));
    for (key, value) in fields {
        if key != "id" {
            created.insert(key.clone(), value.clone());
        }
    }
    (StatusCode::CREATED, Json(Value::Object(created))).into_response()
}

/// Echoes the stored product with the sent fields merged over it
async fn update_product(
    State(catalog): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    catalog.delay().await;
    let original = match catalog.lookup(&id) {
        Ok(product) => product,
        Err(response) => return response,
    };
    let Some(fields) = body.as_object() else {
        return message(StatusCode::BAD_REQUEST, "Body must be a JSON object".to_string());
    };

    let mut merged = original.clone();
    if let Some(target) = merged.as_object_mut() {
        for (key, value) in fields {
            if key != "id" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    Json(merged).into_response()
}

/// Marks the product deleted in the response only
async fn delete_product(State(catalog): State<Shared>, Path(id): Path<String>) -> Response {
    catalog.delay().await;
    let mut receipt = match catalog.lookup(&id) {
        Ok(product) => product.clone(),
        Err(response) => return response,
    };
    if let Some(target) = receipt.as_object_mut() {
        target.insert("isDeleted".to_string(), Value::Bool(true));
        target.insert(
            "deletedOn".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    Json(receipt).into_response()
}

fn product(
    id: u64,
    title: &str,
    description: &str,
    price: f64,
    rating: f64,
    stock: i64,
    brand: &str,
    category: &str,
) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": description,
        "price": price,
        "discountPercentage": 10.5,
        "rating": rating,
        "stock": stock,
        "brand": brand,
        "category": category,
        "thumbnail": format!("https://cdn.dummyjson.com/products/images/{}/thumbnail.png", id),
        "images": [
            format!("https://cdn.dummyjson.com/products/images/{}/1.png", id),
            format!("https://cdn.dummyjson.com/products/images/{}/2.png", id),
        ],
    })
}

/// The catalog served by default. Titles mix case on purpose so sorting
/// exercises the case-insensitive comparison.
pub fn seed_catalog() -> Vec<Value> {
    vec![
        product(1, "iPhone 9", "An apple mobile which is nothing like apple", 549.0, 4.69, 94, "Apple", "smartphones"),
        product(2, "iPhone X", "SIM-Free, Model A19211 6.5-inch Super Retina HD display", 899.0, 4.44, 34, "Apple", "smartphones"),
        product(3, "Samsung Universe 9", "Samsung's new variant which goes beyond Galaxy to the Universe", 1249.0, 4.09, 36, "Samsung", "smartphones"),
        product(4, "OPPOF19", "OPPO F19 is officially announced on April 2021.", 280.0, 4.3, 123, "OPPO", "smartphones"),
        product(5, "Huawei P30", "Huawei's re-badged P30 Pro New Edition phone", 499.0, 4.09, 32, "Huawei", "smartphones"),
        product(6, "MacBook Pro", "MacBook Pro 2021 with mini-LED display may launch between September, November", 1749.0, 4.57, 83, "Apple", "laptops"),
        product(7, "Samsung Galaxy Book", "Samsung Galaxy Book S (2020) Laptop With Intel Lakefield Chip", 1499.0, 4.25, 50, "Samsung", "laptops"),
        product(8, "Microsoft Surface Laptop 4", "Style and speed. Stand out on HD video calls backed by Studio Mics.", 1499.0, 4.43, 68, "Microsoft Surface", "laptops"),
        product(9, "Infinix INBOOK", "Infinix Inbook X1 Ci3 10th 8GB 256GB 14 Win10 Grey", 1099.0, 4.54, 96, "Infinix", "laptops"),
        product(10, "HP Pavilion 15-DK1056WM", "HP Pavilion 15-DK1056WM Gaming Laptop 10th Gen Core i5", 1099.0, 4.43, 89, "HP Pavilion", "laptops"),
        product(11, "perfume Oil", "Mega Discount, Impression of Acqua Di Gio by GiorgioArmani", 13.0, 4.26, 65, "Impression of Acqua Di Gio", "fragrances"),
        product(12, "Leather Strap Skeleton Watch", "Leather Strap Skeleton Watch for Men, Stylish and Latest Design", 46.0, 4.98, 61, "Naviforce", "mens-watches"),
        product(13, "Stainless Steel Wrist Watch", "Stylish Watch For Man (Luxury) Classy Men's Stainless Wrist Watch", 47.0, 4.79, 94, "Naviforce", "mens-watches"),
        product(14, "Men Check Shirt", "Long sleeve check shirt made of breathable cotton", 27.0, 4.41, 12, "The Warehouse", "mens-shirts"),
        product(15, "half sleeves T shirts", "Many store is creating new designs and trend every month", 23.0, 4.26, 132, "Vintage Apparel", "mens-shirts"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn titles(body: &Value) -> Vec<String> {
        body["products"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["title"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_default_page() {
        let body = paginate(seed_catalog(), &HashMap::new()).unwrap();
        assert_eq!(body["total"], json!(15));
        assert_eq!(body["skip"], json!(0));
        assert_eq!(body["limit"], json!(DEFAULT_PAGE_SIZE));
        assert_eq!(body["products"].as_array().unwrap().len(), 15);
    }

    #[test]
    fn test_limit_and_skip() {
        let body = paginate(seed_catalog(), &params(&[("limit", "5"), ("skip", "10")])).unwrap();
        let page = body["products"].as_array().unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page[0]["id"], json!(11));
        assert_eq!(body["limit"], json!(5));
    }

    #[test]
    fn test_limit_zero_returns_everything() {
        let body = paginate(seed_catalog(), &params(&[("limit", "0")])).unwrap();
        assert_eq!(body["products"].as_array().unwrap().len(), 15);
        assert_eq!(body["limit"], json!(15));
    }

    #[test]
    fn test_sort_orders_are_mirrored() {
        let asc = paginate(seed_catalog(), &params(&[("sortBy", "title"), ("order", "asc")])).unwrap();
        let desc = paginate(seed_catalog(), &params(&[("sortBy", "title"), ("order", "desc")])).unwrap();

        let ascending = titles(&asc);
        let mut descending = titles(&desc);
        assert_eq!(ascending.first().map(String::as_str), Some("half sleeves T shirts"));
        descending.reverse();
        assert_eq!(ascending, descending);
    }

    #[test]
    fn test_mixed_sort_field_types_order_by_kind() {
        let catalog = vec![
            json!({"id": 1, "title": "b"}),
            json!({"id": 2, "title": 7}),
            json!({"id": 3}),
            json!({"id": 4, "title": "A"}),
            json!({"id": 5, "title": null}),
            json!({"id": 6, "title": 2.5}),
        ];
        let body = paginate(catalog, &params(&[("sortBy", "title")])).unwrap();
        let ids: Vec<u64> = body["products"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 5, 6, 2, 4, 1]);

        let desc = paginate(
            (1..=40)
                .map(|i| match i % 3 {
                    0 => json!({"id": i, "title": i}),
                    1 => json!({"id": i, "title": format!("t{}", i)}),
                    _ => json!({"id": i}),
                })
                .collect(),
            &params(&[("sortBy", "title"), ("order", "desc"), ("limit", "0")]),
        )
        .unwrap();
        assert_eq!(desc["products"].as_array().unwrap().len(), 40);
        assert!(desc["products"][0]["title"].is_string());
    }

    #[test]
    fn test_bad_pagination_parameter() {
        assert!(paginate(seed_catalog(), &params(&[("limit", "ten")])).is_err());
    }

    #[test]
    fn test_search_matching() {
        let catalog = seed_catalog();
        let hits = |q: &str| catalog.iter().filter(|p| matches_query(p, q)).count();
        assert_eq!(hits("laptop"), 5);
        assert!(hits("PHONE") >= 1);
        assert_eq!(hits(""), 15);
        assert_eq!(hits("no such thing"), 0);
    }
}
