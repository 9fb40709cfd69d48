pub mod bkash;
pub mod stripe;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{config::PaymentsConfig, errors::ServiceError};

pub use bkash::BkashGateway;
pub use stripe::StripeGateway;

/// Provider-side view of a payment. Providers speak different dialects;
/// every adapter maps its own vocabulary onto this one so the orchestrator
/// never branches per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    Pending,
    Failed,
}

impl GatewayPaymentStatus {
    /// Only terminal statuses may transition a stored payment; everything
    /// else leaves the row untouched.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// What the client has to do to complete the payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    /// Synchronous-intent provider: the client finishes the payment
    /// out-of-band using this secret.
    ClientSecret { client_secret: String },
    /// Redirect provider: send the customer to this URL.
    Redirect { url: String },
    None,
}

/// Result of creating a provider-side payment intent/session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub transaction_id: String,
    pub status: GatewayPaymentStatus,
    pub client_action: ClientAction,
    /// Verbatim provider payload, persisted for audit.
    pub raw_response: Value,
}

/// Point-in-time status snapshot from confirm/query calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub transaction_id: String,
    pub status: GatewayPaymentStatus,
    pub raw_response: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Success,
    Failed,
    Ignored,
}

/// A provider notification normalized into the shared vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub transaction_id: Option<String>,
    pub status: WebhookStatus,
    pub raw: Value,
}

/// Capability interface over heterogeneous payment providers.
///
/// `confirm_payment` and `query_payment` are read-only against the provider:
/// re-querying must not create side effects. Outbound calls carry a bounded
/// timeout and at most one transient retry, owned by the adapter.
#[async_trait]
pub trait PaymentGateway: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn create_payment(
        &self,
        amount: Decimal,
        order_id: Uuid,
        metadata: Option<Value>,
    ) -> Result<GatewayPayment, ServiceError>;

    async fn confirm_payment(&self, transaction_id: &str)
        -> Result<PaymentSnapshot, ServiceError>;

    async fn query_payment(&self, transaction_id: &str) -> Result<PaymentSnapshot, ServiceError>;

    /// Normalizes a provider-native webhook payload. Events the provider
    /// sends but this backend does not act on come back as `Ignored`.
    fn normalize_webhook(&self, payload: &Value) -> Result<WebhookEvent, ServiceError>;
}

/// Maps provider name to adapter. Built once from configuration at startup
/// and shared through the application state; there is no ambient global.
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.name().to_string(), gateway);
    }

    /// Builds the registry with every configured provider.
    pub fn from_config(cfg: &PaymentsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StripeGateway::new(&cfg.stripe)));
        registry.register(Arc::new(BkashGateway::new(&cfg.bkash)));
        registry
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        self.gateways
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownProvider(name.to_string()))
    }

    /// Registered provider names, sorted for stable output.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gateways.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
