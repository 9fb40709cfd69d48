mod common;

use axum::http::StatusCode;
use common::TestApp;
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::config::AppConfig;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn bkash_payment_completes_order_and_reduces_stock() {
    let app = TestApp::new().await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(10.00), 10).await;
    let gadget = app.seed_product("SKU-G", "Gadget", dec!(5.00), 4).await;

    let order = app
        .create_order(json!([
            { "product_id": widget, "quantity": 3 },
            { "product_id": gadget, "quantity": 1 },
        ]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "bkash" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "payment creation failed: {body}");
    let payment = &body["data"];
    assert_eq!(payment["status"], "pending");
    assert_eq!(payment["provider"], "bkash");
    assert_eq!(payment["client_action"]["type"], "redirect");
    let payment_id = payment["payment_id"].as_str().unwrap();
    let transaction_id = payment["transaction_id"].as_str().unwrap();
    assert!(transaction_id.starts_with("BKASH"));

    // The mock gateway reports Completed on execute.
    let (status, body) = app
        .post(
            "/api/v1/payments/confirm",
            Some(app.token()),
            json!({ "payment_id": payment_id, "transaction_id": transaction_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "success");

    let (_, body) = app
        .get(&format!("/api/v1/orders/{order_id}"), Some(app.token()))
        .await;
    assert_eq!(body["data"]["status"], "paid");

    assert_eq!(app.product_stock(widget).await, 7);
    assert_eq!(app.product_stock(gadget).await, 3);
}

#[tokio::test]
async fn paying_a_non_pending_order_is_rejected() {
    let app = TestApp::new().await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(10.00), 10).await;
    let order = app
        .create_order(json!([{ "product_id": widget, "quantity": 1 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    // Pay the order to completion.
    let (_, body) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "bkash" }),
        )
        .await;
    let payment = &body["data"];
    app.post(
        "/api/v1/payments/confirm",
        Some(app.token()),
        json!({
            "payment_id": payment["payment_id"],
            "transaction_id": payment["transaction_id"],
        }),
    )
    .await;

    // A second attempt against the now-paid order must be refused.
    let (status, body) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "bkash" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("pending"));
}

#[tokio::test]
async fn canceled_orders_cannot_be_paid() {
    let app = TestApp::new().await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(10.00), 10).await;
    let order = app
        .create_order(json!([{ "product_id": widget, "quantity": 1 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    app.request(
        axum::http::Method::POST,
        &format!("/api/v1/orders/{order_id}/cancel"),
        Some(app.token()),
        None,
    )
    .await;

    let (status, _) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "bkash" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_provider_is_rejected_without_persisting_anything() {
    let app = TestApp::new().await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(10.00), 10).await;
    let order = app
        .create_order(json!([{ "product_id": widget, "quantity": 1 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, _) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "paypal" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .get(
            &format!("/api/v1/payments/order/{order_id}"),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn foreign_orders_cannot_be_paid() {
    let app = TestApp::new().await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(10.00), 10).await;
    let order = app
        .create_order(json!([{ "product_id": widget, "quantity": 1 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let stranger = app.token_for(Uuid::new_v4());
    let (status, _) = app
        .post(
            "/api/v1/payments/create",
            Some(&stranger),
            json!({ "order_id": order_id, "provider": "bkash" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_listing_returns_registered_names() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/api/v1/payments/providers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["providers"], json!(["bkash", "stripe"]));
}

#[tokio::test]
async fn confirming_an_unknown_payment_is_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(
            "/api/v1/payments/confirm",
            Some(app.token()),
            json!({ "payment_id": Uuid::new_v4(), "transaction_id": "pi_void" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn stripe_test_app(server: &MockServer) -> TestApp {
    let mut cfg = AppConfig::for_tests("sqlite::memory:".to_string());
    cfg.payments.stripe.api_base = server.uri();
    cfg.payments.stripe.secret_key = "sk_test_123".to_string();
    TestApp::with_config(cfg).await
}

#[tokio::test]
async fn stripe_flow_waits_out_intermediate_states_before_completing() {
    let server = MockServer::start().await;
    let app = stripe_test_app(&server).await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(12.50), 6).await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_test_1",
            "client_secret": "pi_test_1_secret_abc",
            "status": "requires_payment_method",
            "amount": 2500,
            "currency": "usd",
        })))
        .mount(&server)
        .await;

    // First retrieval still requires client action, the second has settled.
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_test_1",
            "status": "requires_action",
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_test_1",
            "status": "succeeded",
        })))
        .mount(&server)
        .await;

    let order = app
        .create_order(json!([{ "product_id": widget, "quantity": 2 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "stripe" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "payment creation failed: {body}");
    let payment = &body["data"];
    assert_eq!(payment["transaction_id"], "pi_test_1");
    assert_eq!(
        payment["client_action"],
        json!({ "type": "client_secret", "client_secret": "pi_test_1_secret_abc" })
    );
    let payment_id = payment["payment_id"].as_str().unwrap();

    // requires_action must not resolve the payment either way.
    let (status, body) = app
        .post(
            "/api/v1/payments/confirm",
            Some(app.token()),
            json!({ "payment_id": payment_id, "transaction_id": "pi_test_1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(app.product_stock(widget).await, 6);

    let (status, body) = app
        .post(
            "/api/v1/payments/confirm",
            Some(app.token()),
            json!({ "payment_id": payment_id, "transaction_id": "pi_test_1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "success");

    let (_, body) = app
        .get(&format!("/api/v1/orders/{order_id}"), Some(app.token()))
        .await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(app.product_stock(widget).await, 4);
}

#[tokio::test]
async fn gateway_rejection_surfaces_and_persists_no_payment() {
    let server = MockServer::start().await;
    let app = stripe_test_app(&server).await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(10.00), 5).await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "message": "Your card was declined." }
        })))
        .mount(&server)
        .await;

    let order = app
        .create_order(json!([{ "product_id": widget, "quantity": 1 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "stripe" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["message"].as_str().unwrap().contains("declined"));

    let (status, _) = app
        .get(
            &format!("/api/v1/payments/order/{order_id}"),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_confirmation_resolves_payment_and_allows_retry() {
    let server = MockServer::start().await;
    let app = stripe_test_app(&server).await;
    let widget = app.seed_product("SKU-W", "Widget", dec!(10.00), 5).await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_test_2",
            "client_secret": "pi_test_2_secret",
            "status": "requires_payment_method",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_test_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_test_2",
            "status": "canceled",
        })))
        .mount(&server)
        .await;

    let order = app
        .create_order(json!([{ "product_id": widget, "quantity": 1 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (_, body) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "stripe" }),
        )
        .await;
    let payment_id = body["data"]["payment_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            "/api/v1/payments/confirm",
            Some(app.token()),
            json!({ "payment_id": payment_id, "transaction_id": "pi_test_2" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "failed");

    // The order is still pending, so a fresh attempt with another provider
    // is allowed.
    let (status, body) = app
        .post(
            "/api/v1/payments/create",
            Some(app.token()),
            json!({ "order_id": order_id, "provider": "bkash" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "retry failed: {body}");
    assert_eq!(body["data"]["provider"], "bkash");
    assert_eq!(app.product_stock(widget).await, 5);
}
