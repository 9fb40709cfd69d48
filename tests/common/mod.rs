use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth,
    config::AppConfig,
    db,
    entities::product,
    events::{self, EventSender},
    payment_providers::GatewayRegistry,
    services::products::CreateProductRequest,
    AppServices, AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Parses a decimal field out of a JSON response. Compared numerically:
/// the storage backend does not guarantee scale preservation.
#[allow(dead_code)]
pub fn dec_value(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("invalid decimal string"),
        Value::Number(n) => n.to_string().parse().expect("invalid decimal number"),
        other => panic!("expected decimal, got {other}"),
    }
}

/// Test harness: the full application router backed by an in-memory SQLite
/// database, with freshly issued tokens for a regular user and an admin.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub user_id: Uuid,
    token: String,
    admin_token: String,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::for_tests("sqlite::memory:".to_string())).await
    }

    /// Builds the app from an explicit configuration, letting tests point
    /// gateway adapters at mock servers or enable webhook signatures.
    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(events::process_events(event_rx));

        let registry = Arc::new(GatewayRegistry::from_config(&cfg.payments));
        let services = AppServices::new(
            db.clone(),
            registry,
            event_sender.clone(),
            cfg.payments.pending_timeout_secs,
        );

        let state = AppState {
            db,
            config: cfg.clone(),
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .with_state(state.clone());

        let user_id = Uuid::new_v4();
        let token = auth::issue_token(user_id, false, &cfg).unwrap();
        let admin_token = auth::issue_token(Uuid::new_v4(), true, &cfg).unwrap();

        Self {
            router,
            state,
            user_id,
            token,
            admin_token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Issues a token for a different principal, for ownership tests.
    pub fn token_for(&self, user_id: Uuid) -> String {
        auth::issue_token(user_id, false, &self.state.config).unwrap()
    }

    /// Sends a JSON request through the router and decodes the response.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response was not valid JSON")
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Seeds a product through the product service and returns its id.
    pub async fn seed_product(&self, sku: &str, name: &str, price: Decimal, stock: i32) -> Uuid {
        let product = self
            .state
            .services
            .products
            .create_product(CreateProductRequest {
                sku: sku.to_string(),
                name: name.to_string(),
                description: None,
                price,
                stock,
                status: None,
            })
            .await
            .expect("failed to seed product");
        product.id
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("product missing")
            .stock
    }

    /// Rewrites a product's live price, simulating catalog churn after
    /// orders snapshotted the old price.
    pub async fn set_product_price(&self, product_id: Uuid, price: Decimal) {
        let model = product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .unwrap()
            .expect("product missing");
        let mut active: product::ActiveModel = model.into();
        active.price = Set(price);
        active.update(&*self.state.db).await.unwrap();
    }

    /// Creates an order through the API and returns its JSON payload.
    pub async fn create_order(&self, items: Value) -> Value {
        let (status, body) = self
            .post(
                "/api/v1/orders",
                Some(self.token()),
                serde_json::json!({ "items": items }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "order creation failed: {body}");
        body["data"].clone()
    }
}
