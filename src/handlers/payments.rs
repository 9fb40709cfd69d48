use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::{CreatePaymentResponse, PaymentResponse, WebhookOutcome};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    /// One of the registered provider names (see `GET /payments/providers`).
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_id: Uuid,
    pub transaction_id: String,
}

/// Create a payment for a pending order with the chosen provider.
///
/// Returns the provider payload the client needs to proceed: a client
/// secret for the intent-style provider, a redirect URL for the
/// callback-style provider.
async fn create_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatePaymentResponse>>), ServiceError> {
    let response = state
        .services
        .payments
        .create_payment(
            request.order_id,
            &request.provider,
            user.user_id,
            Some(json!({ "user_id": user.user_id })),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Confirm a payment against its provider and apply the outcome.
async fn confirm_payment(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state
        .services
        .payments
        .confirm_payment(request.payment_id, &request.transaction_id)
        .await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Get a payment, refreshing its status from the provider.
async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    _user: AuthenticatedUser,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state.services.payments.query_payment(payment_id).await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Get the latest payment attempt for an order.
async fn get_payment_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    _user: AuthenticatedUser,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state
        .services
        .payments
        .get_payment_by_order(order_id)
        .await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// List the registered payment providers.
async fn get_providers(
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    let providers = state.services.payments.providers();
    Ok(Json(json!({
        "providers": providers,
        "count": providers.len(),
    })))
}

/// Stripe webhook endpoint. Signature-verified when a webhook secret is
/// configured; unauthenticated otherwise, since providers hold no bearer
/// tokens.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    if let Some(secret) = &state.config.payments.stripe.webhook_secret {
        if !verify_stripe_signature(&headers, &body, secret) {
            warn!("Stripe webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook body: {e}")))?;

    let outcome = state
        .services
        .payments
        .handle_webhook("stripe", payload)
        .await?;
    Ok(Json(received(outcome)))
}

/// bKash callback endpoint, hit after the customer completes (or abandons)
/// the redirect flow.
async fn bkash_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook body: {e}")))?;

    let outcome = state
        .services
        .payments
        .handle_webhook("bkash", payload)
        .await?;
    Ok(Json(received(outcome)))
}

/// Providers must always see a 200 acknowledgement, even for notifications
/// this backend ignored; anything else puts us in their retry queue.
fn received(outcome: WebhookOutcome) -> Value {
    json!({
        "status": "received",
        "result": outcome,
    })
}

/// Verifies a `Stripe-Signature: t=...,v1=...` header: HMAC-SHA256 of
/// `"{t}.{body}"` under the shared secret.
fn verify_stripe_signature(headers: &HeaderMap, payload: &Bytes, secret: &str) -> bool {
    let Some(signature) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };

    let mut timestamp = "";
    let mut v1 = "";
    for part in signature.split(',') {
        let mut it = part.trim().split('=');
        match (it.next(), it.next()) {
            (Some("t"), Some(value)) => timestamp = value,
            (Some("v1"), Some(value)) => v1 = value,
            _ => {}
        }
    }
    if timestamp.is_empty() || v1.is_empty() {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, v1)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_payment))
        .route("/confirm", post(confirm_payment))
        .route("/providers", get(get_providers))
        .route("/order/:order_id", get(get_payment_by_order))
        .route("/:payment_id", get(get_payment))
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/webhooks/bkash", post(bkash_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, timestamp: &str, body: &[u8]) -> HeaderMap {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            "Stripe-Signature",
            HeaderValue::from_str(&format!("t={timestamp},v1={sig}")).unwrap(),
        );
        headers
    }

    #[test]
    fn valid_signature_is_accepted() {
        let body = Bytes::from_static(b"{\"type\":\"payment_intent.succeeded\"}");
        let headers = signed_headers("whsec_test", "1700000000", &body);
        assert!(verify_stripe_signature(&headers, &body, "whsec_test"));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let body = Bytes::from_static(b"{\"type\":\"payment_intent.succeeded\"}");
        let headers = signed_headers("whsec_test", "1700000000", &body);
        let other = Bytes::from_static(b"{\"type\":\"payment_intent.payment_failed\"}");
        assert!(!verify_stripe_signature(&headers, &other, "whsec_test"));
    }

    #[test]
    fn missing_header_is_rejected() {
        let body = Bytes::from_static(b"{}");
        assert!(!verify_stripe_signature(&HeaderMap::new(), &body, "whsec_test"));
    }
}
