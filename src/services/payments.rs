use crate::{
    db::DbPool,
    entities::order::OrderStatus,
    entities::payment::{self, Entity as PaymentEntity, Model as PaymentModel, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    payment_providers::{
        ClientAction, GatewayPaymentStatus, GatewayRegistry, WebhookStatus,
    },
    services::orders::OrderService,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePaymentResponse {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub transaction_id: String,
    pub status: PaymentStatus,
    /// What the client does next: complete with a client secret, follow a
    /// redirect, or nothing.
    pub client_action: ClientAction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<PaymentModel> for PaymentResponse {
    fn from(model: PaymentModel) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            provider: model.provider,
            transaction_id: model.transaction_id,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Result of processing one provider notification. Always reported back to
/// the provider with a 200 so it does not retry notifications this backend
/// chose to ignore.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookOutcome {
    pub status: WebhookStatus,
    pub transaction_id: Option<String>,
    pub message: String,
}

impl WebhookOutcome {
    fn ignored(transaction_id: Option<String>, message: &str) -> Self {
        Self {
            status: WebhookStatus::Ignored,
            transaction_id,
            message: message.to_string(),
        }
    }
}

/// Coordinates orders and gateways across the create → confirm → webhook
/// lifecycle. Owns the Payment entity and its state machine:
/// Pending → Success | Failed, both terminal per row.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    registry: Arc<GatewayRegistry>,
    order_service: Arc<OrderService>,
    event_sender: EventSender,
    /// Seconds after which a still-pending payment may be expired by the
    /// read-through refresh. Zero disables the expiry.
    pending_timeout_secs: u64,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        registry: Arc<GatewayRegistry>,
        order_service: Arc<OrderService>,
        event_sender: EventSender,
        pending_timeout_secs: u64,
    ) -> Self {
        Self {
            db,
            registry,
            order_service,
            event_sender,
            pending_timeout_secs,
        }
    }

    /// Registered provider names, for clients choosing a payment method.
    pub fn providers(&self) -> Vec<String> {
        self.registry.provider_names()
    }

    /// Creates a provider-side payment for a pending order and persists the
    /// Pending payment row. The charged amount is the order's stored total,
    /// never a client-supplied figure.
    #[instrument(skip(self, metadata), fields(order_id = %order_id, provider = %provider_name))]
    pub async fn create_payment(
        &self,
        order_id: Uuid,
        provider_name: &str,
        user_id: Uuid,
        metadata: Option<Value>,
    ) -> Result<CreatePaymentResponse, ServiceError> {
        let order = self.order_service.get_order(order_id, Some(user_id)).await?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(
                "order is not in pending status".to_string(),
            ));
        }

        let gateway = self.registry.resolve(provider_name)?;

        // Adapter failure surfaces directly; no payment row exists yet.
        let created = gateway
            .create_payment(order.total_amount, order_id, metadata)
            .await?;

        let now = Utc::now();
        let payment_id = Uuid::new_v4();
        payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order_id),
            provider: Set(provider_name.to_string()),
            transaction_id: Set(created.transaction_id.clone()),
            status: Set(PaymentStatus::Pending),
            raw_response: Set(Some(created.raw_response.clone())),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await?;

        info!(payment_id = %payment_id, transaction_id = %created.transaction_id, "Payment created");
        self.event_sender
            .send(Event::PaymentCreated {
                payment_id,
                order_id,
                provider: provider_name.to_string(),
            })
            .await;

        Ok(CreatePaymentResponse {
            payment_id,
            order_id,
            provider: provider_name.to_string(),
            transaction_id: created.transaction_id,
            status: PaymentStatus::Pending,
            client_action: created.client_action,
        })
    }

    /// Confirms a payment against its provider and applies the outcome.
    /// Ambiguous in-progress provider states leave the row untouched; a
    /// provider-side failure resolves the payment to Failed rather than
    /// leaving it pending forever.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn confirm_payment(
        &self,
        payment_id: Uuid,
        transaction_id: &str,
    ) -> Result<PaymentResponse, ServiceError> {
        let payment = PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;

        // The stored provider decides the adapter; trusting the caller here
        // would allow cross-provider confusion.
        let gateway = self.registry.resolve(&payment.provider)?;

        let snapshot = match gateway.confirm_payment(transaction_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.apply_failure(&payment, json!({ "error": e.to_string() }))
                    .await?;
                return Err(e);
            }
        };

        self.apply_snapshot_status(&payment, snapshot.status, snapshot.raw_response)
            .await?;
        self.reload(payment_id).await
    }

    /// Read-through status refresh: reconciles the stored row when the
    /// provider reports a terminal state it does not yet reflect, and
    /// expires payments pending past the configured deadline.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn query_payment(&self, payment_id: Uuid) -> Result<PaymentResponse, ServiceError> {
        let payment = PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;

        let gateway = self.registry.resolve(&payment.provider)?;
        let snapshot = gateway.query_payment(&payment.transaction_id).await?;

        if snapshot.status.is_terminal() {
            self.apply_snapshot_status(&payment, snapshot.status, snapshot.raw_response)
                .await?;
        } else if payment.status == PaymentStatus::Pending && self.pending_expired(&payment) {
            warn!(payment_id = %payment.id, "Pending payment expired, resolving to failed");
            self.apply_failure(
                &payment,
                json!({
                    "reason": "pending payment expired",
                    "last_provider_status": snapshot.status,
                }),
            )
            .await?;
        }

        self.reload(payment_id).await
    }

    /// Normalizes a provider notification and reconciles it into the stored
    /// payment. Guarantees at-most-once effect per (transaction, terminal
    /// status) regardless of delivery count.
    #[instrument(skip(self, payload), fields(provider = %provider_name))]
    pub async fn handle_webhook(
        &self,
        provider_name: &str,
        payload: Value,
    ) -> Result<WebhookOutcome, ServiceError> {
        let gateway = self.registry.resolve(provider_name)?;
        let event = gateway.normalize_webhook(&payload)?;

        if event.status == WebhookStatus::Ignored {
            return Ok(WebhookOutcome::ignored(
                event.transaction_id,
                "event not processed",
            ));
        }

        let Some(transaction_id) = event.transaction_id else {
            return Ok(WebhookOutcome::ignored(None, "no transaction id in payload"));
        };

        // A notification for a transaction this backend never issued is not
        // a caller error; acknowledge and move on.
        let Some(payment) = PaymentEntity::find()
            .filter(payment::Column::TransactionId.eq(transaction_id.as_str()))
            .one(&*self.db)
            .await?
        else {
            info!(transaction_id = %transaction_id, "Webhook for unknown transaction ignored");
            return Ok(WebhookOutcome::ignored(
                Some(transaction_id),
                "unknown transaction",
            ));
        };

        let incoming = match event.status {
            WebhookStatus::Success => PaymentStatus::Success,
            WebhookStatus::Failed => PaymentStatus::Failed,
            WebhookStatus::Ignored => unreachable!(),
        };

        if payment.status.is_terminal() {
            if payment.status == incoming {
                // Duplicate delivery of the same terminal outcome: no-op.
                return Ok(WebhookOutcome {
                    status: event.status,
                    transaction_id: Some(transaction_id),
                    message: "already applied".to_string(),
                });
            }
            warn!(
                payment_id = %payment.id,
                stored = ?payment.status,
                incoming = ?incoming,
                "Conflicting webhook for terminal payment ignored"
            );
            return Ok(WebhookOutcome::ignored(
                Some(transaction_id),
                "payment already in a different terminal state",
            ));
        }

        match incoming {
            PaymentStatus::Success => {
                match self.apply_success(&payment, event.raw).await {
                    Ok(()) => {}
                    Err(
                        ServiceError::InsufficientStock(msg)
                        | ServiceError::InvalidTransition(msg),
                    ) => {
                        // The order could not be captured (stock taken, or a
                        // competing attempt already paid it); the payment has
                        // been resolved to Failed rather than left hanging.
                        return Ok(WebhookOutcome {
                            status: WebhookStatus::Failed,
                            transaction_id: Some(transaction_id),
                            message: msg,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            PaymentStatus::Failed => self.apply_failure(&payment, event.raw).await?,
            PaymentStatus::Pending => unreachable!(),
        }

        Ok(WebhookOutcome {
            status: event.status,
            transaction_id: Some(transaction_id),
            message: "applied".to_string(),
        })
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<PaymentResponse, ServiceError> {
        self.reload(payment_id).await
    }

    /// Latest payment attempt for an order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<PaymentResponse, ServiceError> {
        PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?
            .map(PaymentResponse::from)
            .ok_or_else(|| ServiceError::NotFound("Payment not found for this order".to_string()))
    }

    /// Applies a provider status snapshot onto the payment state machine.
    /// Non-terminal statuses leave the stored row untouched.
    async fn apply_snapshot_status(
        &self,
        payment: &PaymentModel,
        status: GatewayPaymentStatus,
        raw: Value,
    ) -> Result<(), ServiceError> {
        match status {
            GatewayPaymentStatus::Succeeded => self.apply_success(payment, raw).await,
            GatewayPaymentStatus::Failed => self.apply_failure(payment, raw).await,
            // In-progress states (requires_action and friends) resolve later
            // via webhook or a follow-up query.
            _ => Ok(()),
        }
    }

    /// Transitions Pending→Success and marks the order paid, atomically.
    /// The payment update is guarded on the stored status, so concurrent
    /// confirms and duplicate webhooks collapse to one effect; the order
    /// transition and every stock decrement ride the same transaction.
    ///
    /// When stock cannot be captured the transaction rolls back and the
    /// payment is resolved to Failed: a payment must never claim success
    /// against an order that was not actually fulfilled from stock.
    async fn apply_success(
        &self,
        payment: &PaymentModel,
        raw: Value,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let updated = PaymentEntity::update_many()
            .col_expr(
                payment::Column::Status,
                sea_orm::sea_query::Expr::value(PaymentStatus::Success),
            )
            .col_expr(
                payment::Column::RawResponse,
                sea_orm::sea_query::Expr::value(raw.clone()),
            )
            .col_expr(
                payment::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            // Already resolved by a competing confirm/webhook; nothing to do.
            return Ok(());
        }

        let decremented = match self.order_service.mark_as_paid(&txn, payment.order_id).await {
            Ok(decremented) => decremented,
            Err(e) => {
                drop(txn); // roll back the success transition
                error!(
                    payment_id = %payment.id,
                    order_id = %payment.order_id,
                    error = %e,
                    "Order capture failed, resolving payment to failed"
                );
                self.apply_failure(
                    payment,
                    json!({ "error": e.to_string(), "provider_response": raw }),
                )
                .await?;
                return Err(e);
            }
        };

        txn.commit().await?;

        info!(payment_id = %payment.id, order_id = %payment.order_id, "Payment succeeded");
        self.event_sender.send(Event::PaymentSucceeded(payment.id)).await;
        self.event_sender.send(Event::OrderPaid(payment.order_id)).await;
        for (product_id, quantity) in decremented {
            self.event_sender
                .send(Event::StockDeducted {
                    product_id,
                    quantity,
                })
                .await;
        }

        Ok(())
    }

    /// Transitions Pending→Failed, guarded on the stored status.
    async fn apply_failure(&self, payment: &PaymentModel, raw: Value) -> Result<(), ServiceError> {
        let updated = PaymentEntity::update_many()
            .col_expr(
                payment::Column::Status,
                sea_orm::sea_query::Expr::value(PaymentStatus::Failed),
            )
            .col_expr(
                payment::Column::RawResponse,
                sea_orm::sea_query::Expr::value(raw),
            )
            .col_expr(
                payment::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await?;

        if updated.rows_affected > 0 {
            info!(payment_id = %payment.id, "Payment failed");
            self.event_sender.send(Event::PaymentFailed(payment.id)).await;
        }

        Ok(())
    }

    fn pending_expired(&self, payment: &PaymentModel) -> bool {
        self.pending_timeout_secs > 0
            && Utc::now() - payment.created_at
                > chrono::Duration::seconds(self.pending_timeout_secs as i64)
    }

    async fn reload(&self, payment_id: Uuid) -> Result<PaymentResponse, ServiceError> {
        PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .map(PaymentResponse::from)
            .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))
    }
}
