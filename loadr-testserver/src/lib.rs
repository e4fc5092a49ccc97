//! In-memory stand-in for the users/products API that load runs are pointed at.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, body::Bytes};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, oneshot};
use tokio::time::{Duration, sleep};

pub const PATH_HEALTH: &str = "/health";
pub const PATH_READY: &str = "/ready";
pub const PATH_VERSION: &str = "/version";
pub const PATH_USERS: &str = "/api/users";
pub const PATH_PRODUCTS: &str = "/api/products";
pub const PATH_SLOW: &str = "/api/slow";
pub const PATH_ERROR: &str = "/api/error";
pub const PATH_RANDOM: &str = "/api/random";

const API_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Normal,
    /// Every route answers with this status and a JSON error body.
    FailAll(u16),
}

#[derive(Debug, Clone)]
pub struct TestServerOptions {
    pub behavior: Behavior,
    pub slow_delay: Duration,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            behavior: Behavior::Normal,
            slow_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    users_created: Arc<AtomicU64>,
    users_deleted: Arc<AtomicU64>,
}

impl TestServerStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn users_created(&self) -> u64 {
        self.users_created.load(Ordering::Relaxed)
    }

    pub fn users_deleted(&self) -> u64 {
        self.users_deleted.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize)]
struct User {
    id: u64,
    name: String,
    email: String,
    created_at: String,
}

#[derive(Debug, Clone, Serialize)]
struct Product {
    id: u64,
    name: String,
    price: f64,
    stock: i64,
}

#[derive(Debug, Default, Deserialize)]
struct UserInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProductInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: f64,
    stock: Option<i64>,
}

#[derive(Debug)]
struct Store {
    users: BTreeMap<u64, User>,
    products: BTreeMap<u64, Product>,
    next_user_id: u64,
    next_product_id: u64,
}

impl Store {
    fn seeded() -> Self {
        let users = [(1, "Mario Rossi", "mario@example.com"), (2, "Laura Bianchi", "laura@example.com")]
            .into_iter()
            .map(|(id, name, email)| {
                let user = User {
                    id,
                    name: name.to_string(),
                    email: email.to_string(),
                    created_at: now_rfc3339(),
                };
                (id, user)
            })
            .collect();
        let products = [(1, "Laptop", 999.99, 10), (2, "Mouse", 29.99, 50), (3, "Keyboard", 79.99, 30)]
            .into_iter()
            .map(|(id, name, price, stock)| {
                let product = Product {
                    id,
                    name: name.to_string(),
                    price,
                    stock,
                };
                (id, product)
            })
            .collect();

        Self {
            users,
            products,
            next_user_id: 3,
            next_product_id: 4,
        }
    }
}

/// Shared router state.
#[derive(Debug, Clone)]
pub struct AppState {
    options: TestServerOptions,
    stats: TestServerStats,
    store: Arc<RwLock<Store>>,
    random_flip: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(options: TestServerOptions) -> Self {
        Self {
            options,
            stats: TestServerStats::default(),
            store: Arc::new(RwLock::new(Store::seeded())),
            random_flip: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }
}

fn now_rfc3339() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "error": status.canonical_reason().unwrap_or("Unknown"),
        "code": status.as_u16(),
        "message": message,
    });
    (status, Json(body)).into_response()
}

fn parse_id(raw: &str, what: &str) -> Result<u64, Response> {
    raw.parse()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, &format!("Invalid {what} ID")))
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid request body"))
}

async fn track_and_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    state.stats.requests_total.fetch_add(1, Ordering::Relaxed);
    match state.options.behavior {
        Behavior::Normal => next.run(req).await,
        Behavior::FailAll(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, "Injected failure")
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "timestamp": now_rfc3339(), "version": API_VERSION }))
}

async fn ready() -> Json<serde_json::Value> {
    Json(json!({
        "ready": true,
        "timestamp": now_rfc3339(),
        "checks": { "database": true, "cache": true },
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": API_VERSION, "build_date": "2025-11-07" }))
}

async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    Json(state.store.read().await.users.values().cloned().collect())
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id, "user") {
        Ok(id) => id,
        Err(res) => return res,
    };
    match state.store.read().await.users.get(&id) {
        Some(user) => Json(user.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "User not found"),
    }
}

async fn create_user(State(state): State<AppState>, body: Bytes) -> Response {
    let input: UserInput = match parse_body(&body) {
        Ok(v) => v,
        Err(res) => return res,
    };
    if input.name.is_empty() || input.email.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Name and email are required");
    }

    let mut store = state.store.write().await;
    let user = User {
        id: store.next_user_id,
        name: input.name,
        email: input.email,
        created_at: now_rfc3339(),
    };
    store.next_user_id += 1;
    store.users.insert(user.id, user.clone());
    state.stats.users_created.fetch_add(1, Ordering::Relaxed);

    (StatusCode::CREATED, Json(user)).into_response()
}

async fn update_user(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> Response {
    let id = match parse_id(&id, "user") {
        Ok(id) => id,
        Err(res) => return res,
    };
    let mut store = state.store.write().await;
    let Some(user) = store.users.get_mut(&id) else {
        return error_response(StatusCode::NOT_FOUND, "User not found");
    };
    let input: UserInput = match parse_body(&body) {
        Ok(v) => v,
        Err(res) => return res,
    };

    if !input.name.is_empty() {
        user.name = input.name;
    }
    if !input.email.is_empty() {
        user.email = input.email;
    }
    Json(user.clone()).into_response()
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id, "user") {
        Ok(id) => id,
        Err(res) => return res,
    };
    if state.store.write().await.users.remove(&id).is_none() {
        return error_response(StatusCode::NOT_FOUND, "User not found");
    }
    state.stats.users_deleted.fetch_add(1, Ordering::Relaxed);
    StatusCode::NO_CONTENT.into_response()
}

async fn list_products(State(state): State<AppState>) -> Json<Vec<Product>> {
    Json(state.store.read().await.products.values().cloned().collect())
}

async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id, "product") {
        Ok(id) => id,
        Err(res) => return res,
    };
    match state.store.read().await.products.get(&id) {
        Some(p) => Json(p.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Product not found"),
    }
}

async fn create_product(State(state): State<AppState>, body: Bytes) -> Response {
    let input: ProductInput = match parse_body(&body) {
        Ok(v) => v,
        Err(res) => return res,
    };
    if input.name.is_empty() || input.price <= 0.0 {
        return error_response(StatusCode::BAD_REQUEST, "Name and valid price are required");
    }

    let mut store = state.store.write().await;
    let product = Product {
        id: store.next_product_id,
        name: input.name,
        price: input.price,
        stock: input.stock.unwrap_or(0),
    };
    store.next_product_id += 1;
    store.products.insert(product.id, product.clone());

    (StatusCode::CREATED, Json(product)).into_response()
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let id = match parse_id(&id, "product") {
        Ok(id) => id,
        Err(res) => return res,
    };
    let mut store = state.store.write().await;
    let Some(product) = store.products.get_mut(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Product not found");
    };
    let input: ProductInput = match parse_body(&body) {
        Ok(v) => v,
        Err(res) => return res,
    };

    if !input.name.is_empty() {
        product.name = input.name;
    }
    if input.price > 0.0 {
        product.price = input.price;
    }
    if let Some(stock) = input.stock.filter(|s| *s >= 0) {
        product.stock = stock;
    }
    Json(product.clone()).into_response()
}

async fn slow(State(state): State<AppState>) -> Json<serde_json::Value> {
    sleep(state.options.slow_delay).await;
    Json(json!({
        "message": "This endpoint is intentionally slow",
        "delay": humantime::format_duration(state.options.slow_delay).to_string(),
    }))
}

async fn always_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "This endpoint always returns an error",
    )
}

// Alternates success and 503 so repeated runs see the same sequence.
async fn random(State(state): State<AppState>) -> Response {
    let n = state.random_flip.fetch_add(1, Ordering::Relaxed);
    if n % 2 == 0 {
        Json(json!({ "success": true, "random": n })).into_response()
    } else {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "Random error occurred")
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PATH_HEALTH, get(health))
        .route(PATH_READY, get(ready))
        .route(PATH_VERSION, get(version))
        .route(PATH_USERS, get(list_users).post(create_user))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route(PATH_PRODUCTS, get(list_products).post(create_product))
        .route("/api/products/{id}", get(get_product).put(update_product))
        .route(PATH_SLOW, get(slow))
        .route(PATH_ERROR, get(always_error))
        .route(PATH_RANDOM, get(random))
        .layer(middleware::from_fn_with_state(state.clone(), track_and_gate))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_failing(status: u16) -> std::io::Result<Self> {
        Self::start_with(TestServerOptions {
            behavior: Behavior::FailAll(status),
            ..TestServerOptions::default()
        })
        .await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = AppState::new(options);
        let stats = state.stats().clone();
        let app = router(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
