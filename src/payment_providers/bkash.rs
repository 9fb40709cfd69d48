use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    ClientAction, GatewayPayment, GatewayPaymentStatus, PaymentGateway, PaymentSnapshot,
    WebhookEvent, WebhookStatus,
};
use crate::{config::BkashGatewayConfig, errors::ServiceError};

pub const PROVIDER_NAME: &str = "bkash";

/// Adapter for a redirect-then-callback provider: the backend creates a
/// payment session, the customer is redirected to the provider's page and
/// the provider calls back with the outcome.
///
/// In `mock_mode` (the default outside production) no network calls are
/// made; payment ids and redirect URLs are fabricated in the provider's
/// format so the full orchestration path stays exercisable.
#[derive(Debug)]
pub struct BkashGateway {
    http: reqwest::Client,
    cfg: BkashGatewayConfig,
}

impl BkashGateway {
    pub fn new(cfg: &BkashGatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            cfg: cfg.clone(),
        }
    }

    fn mock_payment_id() -> String {
        format!("BKASH{}", random_token(12))
    }

    /// Grants an access token for the tokenized-checkout API.
    async fn grant_token(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(format!("{}/tokenized/checkout/token/grant", self.cfg.base_url))
            .header("username", &self.cfg.username)
            .header("password", &self.cfg.password)
            .json(&json!({
                "app_key": self.cfg.app_key,
                "app_secret": self.cfg.app_secret,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("bkash token grant failed: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("invalid bkash response: {e}")))?;

        body.get("id_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::ProviderError("bkash token grant returned no id_token".to_string())
            })
    }

    async fn checkout_call(&self, path: &str, body: Value) -> Result<Value, ServiceError> {
        let token = self.grant_token().await?;
        let response = self
            .http
            .post(format!("{}{path}", self.cfg.base_url))
            .header("authorization", token)
            .header("x-app-key", &self.cfg.app_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("bkash request failed: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("invalid bkash response: {e}")))
    }

    fn snapshot_from_status_payload(
        &self,
        transaction_id: &str,
        payload: Value,
    ) -> PaymentSnapshot {
        let status = map_transaction_status(
            payload
                .get("transactionStatus")
                .and_then(Value::as_str)
                .unwrap_or(""),
        );
        PaymentSnapshot {
            transaction_id: transaction_id.to_string(),
            status,
            raw_response: payload,
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

fn map_transaction_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "Completed" => GatewayPaymentStatus::Succeeded,
        "Initiated" | "Pending" => GatewayPaymentStatus::Pending,
        _ => GatewayPaymentStatus::Failed,
    }
}

#[async_trait]
impl PaymentGateway for BkashGateway {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    #[instrument(skip(self, _metadata), fields(order_id = %order_id))]
    async fn create_payment(
        &self,
        amount: Decimal,
        order_id: Uuid,
        _metadata: Option<Value>,
    ) -> Result<GatewayPayment, ServiceError> {
        if self.cfg.mock_mode {
            let payment_id = Self::mock_payment_id();
            let url = format!(
                "{}/mock-bkash-payment?paymentID={payment_id}",
                self.cfg.redirect_base
            );
            let raw = json!({
                "paymentID": payment_id,
                "bkashURL": url,
                "amount": amount.to_string(),
                "currency": "BDT",
                "intent": "sale",
                "merchantInvoiceNumber": format!("INV_{order_id}"),
                "mode": "MOCK",
            });

            info!(transaction_id = %payment_id, "Mock bkash payment created");

            return Ok(GatewayPayment {
                transaction_id: payment_id,
                status: GatewayPaymentStatus::Pending,
                client_action: ClientAction::Redirect { url },
                raw_response: raw,
            });
        }

        let body = json!({
            "mode": "0011",
            "payerReference": order_id.to_string(),
            "callbackURL": format!("{}/api/v1/payments/webhooks/bkash", self.cfg.redirect_base),
            "amount": amount.to_string(),
            "currency": "BDT",
            "intent": "sale",
            "merchantInvoiceNumber": format!("INV_{order_id}"),
        });
        let raw = self.checkout_call("/tokenized/checkout/create", body).await?;

        let payment_id = raw
            .get("paymentID")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ServiceError::ProviderError(format!(
                    "bkash create returned no paymentID: {}",
                    raw.get("statusMessage").and_then(Value::as_str).unwrap_or("unknown")
                ))
            })?
            .to_string();
        let url = raw
            .get("bkashURL")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(GatewayPayment {
            transaction_id: payment_id,
            status: GatewayPaymentStatus::Pending,
            client_action: match url {
                Some(url) => ClientAction::Redirect { url },
                None => ClientAction::None,
            },
            raw_response: raw,
        })
    }

    #[instrument(skip(self))]
    async fn confirm_payment(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentSnapshot, ServiceError> {
        if self.cfg.mock_mode {
            let raw = json!({
                "paymentID": transaction_id,
                "trxID": format!("TRX{}", random_token(10)),
                "transactionStatus": "Completed",
                "currency": "BDT",
            });
            return Ok(self.snapshot_from_status_payload(transaction_id, raw));
        }

        let raw = self
            .checkout_call(
                "/tokenized/checkout/execute",
                json!({ "paymentID": transaction_id }),
            )
            .await?;
        Ok(self.snapshot_from_status_payload(transaction_id, raw))
    }

    #[instrument(skip(self))]
    async fn query_payment(&self, transaction_id: &str) -> Result<PaymentSnapshot, ServiceError> {
        if self.cfg.mock_mode {
            let raw = json!({
                "paymentID": transaction_id,
                "transactionStatus": "Completed",
            });
            return Ok(self.snapshot_from_status_payload(transaction_id, raw));
        }

        let raw = self
            .checkout_call(
                "/tokenized/checkout/payment/status",
                json!({ "paymentID": transaction_id }),
            )
            .await?;
        Ok(self.snapshot_from_status_payload(transaction_id, raw))
    }

    fn normalize_webhook(&self, payload: &Value) -> Result<WebhookEvent, ServiceError> {
        let transaction_id = payload
            .get("paymentID")
            .and_then(Value::as_str)
            .map(str::to_string);

        // A callback with no payment id carries nothing to reconcile.
        let Some(transaction_id) = transaction_id else {
            warn!("bkash callback without paymentID, ignoring");
            return Ok(WebhookEvent {
                transaction_id: None,
                status: WebhookStatus::Ignored,
                raw: payload.clone(),
            });
        };

        let status = match payload.get("status").and_then(Value::as_str) {
            Some("success") | None => WebhookStatus::Success,
            Some(_) => WebhookStatus::Failed,
        };

        Ok(WebhookEvent {
            transaction_id: Some(transaction_id),
            status,
            raw: payload.clone(),
        })
    }
}
