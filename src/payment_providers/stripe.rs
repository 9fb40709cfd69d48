use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    ClientAction, GatewayPayment, GatewayPaymentStatus, PaymentGateway, PaymentSnapshot,
    WebhookEvent, WebhookStatus,
};
use crate::{config::StripeGatewayConfig, errors::ServiceError};

pub const PROVIDER_NAME: &str = "stripe";

/// Adapter for a synchronous-intent provider: the backend creates a
/// PaymentIntent, the client completes it out-of-band with the returned
/// client secret, and the backend polls/confirms afterwards.
#[derive(Debug)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(cfg: &StripeGatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        }
    }

    /// Sends a request, retrying once on a transient transport failure.
    /// Retries stay inside the adapter; the orchestrator never retries.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
        let retry = request.try_clone();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                let Some(retry) = retry else {
                    return Err(ServiceError::ProviderError(format!(
                        "stripe request failed: {e}"
                    )));
                };
                warn!(error = %e, "Transient gateway failure, retrying once");
                retry.send().await.map_err(|e| {
                    ServiceError::ProviderError(format!("stripe request failed: {e}"))
                })?
            }
            Err(e) => {
                return Err(ServiceError::ProviderError(format!(
                    "stripe request failed: {e}"
                )))
            }
        };

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("invalid stripe response: {e}")))?;

        if status == StatusCode::OK {
            return Ok(body);
        }

        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unexpected gateway response")
            .to_string();
        Err(ServiceError::ProviderError(message))
    }

    fn snapshot_from_intent(&self, intent: Value) -> Result<PaymentSnapshot, ServiceError> {
        let transaction_id = intent
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ServiceError::ProviderError("payment intent missing id".to_string())
            })?
            .to_string();
        let status = map_intent_status(
            intent.get("status").and_then(Value::as_str).unwrap_or(""),
        );

        Ok(PaymentSnapshot {
            transaction_id,
            status,
            raw_response: intent,
        })
    }
}

/// Maps the provider's intent vocabulary onto the shared one. States that
/// still require client-side action must not resolve the payment either way.
fn map_intent_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "succeeded" => GatewayPaymentStatus::Succeeded,
        "processing" => GatewayPaymentStatus::Processing,
        "requires_action" | "requires_confirmation" | "requires_capture" => {
            GatewayPaymentStatus::RequiresAction
        }
        "requires_payment_method" => GatewayPaymentStatus::Pending,
        _ => GatewayPaymentStatus::Failed,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    #[instrument(skip(self, metadata), fields(order_id = %order_id))]
    async fn create_payment(
        &self,
        amount: Decimal,
        order_id: Uuid,
        metadata: Option<Value>,
    ) -> Result<GatewayPayment, ServiceError> {
        let cents = (amount * Decimal::from(100))
            .round()
            .to_i64()
            .filter(|c| *c >= 0)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("amount {amount} not representable in cents"))
            })?;

        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), cents.to_string()),
            ("currency".into(), "usd".into()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
            ("metadata[order_id]".into(), order_id.to_string()),
        ];
        if let Some(Value::Object(map)) = metadata {
            for (key, value) in map {
                if let Value::String(value) = value {
                    form.push((format!("metadata[{key}]"), value));
                }
            }
        }

        let request = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form);

        let intent = self.execute(request).await?;
        let snapshot = self.snapshot_from_intent(intent)?;
        let client_secret = snapshot
            .raw_response
            .get("client_secret")
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(
            transaction_id = %snapshot.transaction_id,
            status = ?snapshot.status,
            "Stripe payment intent created"
        );

        Ok(GatewayPayment {
            transaction_id: snapshot.transaction_id,
            status: snapshot.status,
            client_action: match client_secret {
                Some(client_secret) => ClientAction::ClientSecret { client_secret },
                None => ClientAction::None,
            },
            raw_response: snapshot.raw_response,
        })
    }

    #[instrument(skip(self))]
    async fn confirm_payment(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentSnapshot, ServiceError> {
        // The actual confirmation happens client-side; this retrieves the
        // intent's latest status, which is idempotent.
        let request = self
            .http
            .get(format!(
                "{}/v1/payment_intents/{transaction_id}",
                self.api_base
            ))
            .basic_auth(&self.secret_key, None::<&str>);

        let intent = self.execute(request).await?;
        self.snapshot_from_intent(intent)
    }

    #[instrument(skip(self))]
    async fn query_payment(&self, transaction_id: &str) -> Result<PaymentSnapshot, ServiceError> {
        self.confirm_payment(transaction_id).await
    }

    fn normalize_webhook(&self, payload: &Value) -> Result<WebhookEvent, ServiceError> {
        let event_type = payload.get("type").and_then(Value::as_str).unwrap_or("");
        let object_id = payload
            .pointer("/data/object/id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let status = match event_type {
            "payment_intent.succeeded" => WebhookStatus::Success,
            "payment_intent.payment_failed" => WebhookStatus::Failed,
            _ => {
                return Ok(WebhookEvent {
                    transaction_id: object_id,
                    status: WebhookStatus::Ignored,
                    raw: payload.clone(),
                })
            }
        };

        let transaction_id = object_id.ok_or_else(|| {
            ServiceError::ValidationError("webhook payload missing payment intent id".to_string())
        })?;

        Ok(WebhookEvent {
            transaction_id: Some(transaction_id),
            status,
            raw: payload.clone(),
        })
    }
}
