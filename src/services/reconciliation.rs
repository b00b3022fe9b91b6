//! Turns redirect and webhook signals into exactly one order per payment.
//!
//! Both triggers run the same path: locate the payment, verify the callback
//! with the restaurant's secrets, then [`Engine::reconcile`]. The pending→paid
//! conditional update inside [`PaymentStore::settle_payment`] is the only
//! mutual-exclusion point; whichever trigger loses it reads the linked order.
//!
//! [`PaymentStore::settle_payment`]: crate::domain::store::PaymentStore::settle_payment

use {
    super::Engine,
    crate::domain::{
        error::EngineError,
        gateway::GatewayCallback,
        order::{NewOrder, Order},
        payment::{
            GatewayKind, Payment, PaymentLookup, PaymentOutcome, PaymentSettlement,
            PaymentStatus, ReconcileResult, SettleResult,
        },
    },
    chrono::Utc,
    serde_json::json,
    tracing::{Span, field::display},
};

impl Engine {
    #[tracing::instrument(
        name = "reconcile",
        skip_all,
        fields(gateway = %kind, source = callback.source.as_str(), payment_id = tracing::field::Empty)
    )]
    pub async fn handle_callback(
        &self,
        kind: GatewayKind,
        callback: GatewayCallback,
    ) -> Result<ReconcileResult, EngineError> {
        let gateway = self.gateways.get(kind)?;
        let payment = self.locate_payment(gateway.locate(&callback)?).await?;
        Span::current().record("payment_id", display(payment.id));

        if payment.gateway != kind {
            return Err(EngineError::Validation(format!(
                "payment {} was created through {}, not {kind}",
                payment.id, payment.gateway
            )));
        }

        let restaurant = self.restaurant(payment.restaurant_id).await?;
        let credentials = self.credentials(&restaurant, kind)?;
        let outcome = gateway.verify(&credentials, &callback, &payment).await?;

        self.reconcile(payment, outcome, callback.source.as_str()).await
    }

    async fn locate_payment(&self, lookups: Vec<PaymentLookup>) -> Result<Payment, EngineError> {
        for lookup in &lookups {
            if let Some(payment) = self.store.find_payment(lookup).await? {
                return Ok(payment);
            }
        }
        let tried: Vec<String> = lookups.iter().map(ToString::to_string).collect();
        Err(EngineError::NotFound(format!(
            "payment not found for {}",
            tried.join(", ")
        )))
    }

    /// Applies a verified gateway verdict to `payment`. Safe to call any
    /// number of times, concurrently, for the same payment.
    pub async fn reconcile(
        &self,
        payment: Payment,
        outcome: PaymentOutcome,
        trigger: &str,
    ) -> Result<ReconcileResult, EngineError> {
        if let Some(order_id) = payment.order_id {
            let order = self.load_order(order_id).await?;
            tracing::info!(payment_id = %payment.id, order_no = %order.order_no, trigger, "payment already reconciled");
            return Ok(ReconcileResult::AlreadyReconciled(order));
        }

        match outcome {
            PaymentOutcome::Succeeded { transaction_id } => {
                self.settle(payment, transaction_id, trigger).await
            }
            PaymentOutcome::Failed {
                transaction_id,
                reason,
            } => self.decline(payment, transaction_id, reason, trigger).await,
            PaymentOutcome::Pending => {
                tracing::info!(payment_id = %payment.id, trigger, "gateway still processing");
                Ok(ReconcileResult::Pending(payment.id))
            }
        }
    }

    async fn settle(
        &self,
        payment: Payment,
        transaction_id: Option<String>,
        trigger: &str,
    ) -> Result<ReconcileResult, EngineError> {
        if payment.status != PaymentStatus::Pending {
            return Err(self.settle_anomaly(&payment, payment.status, transaction_id.as_deref(), trigger).await);
        }

        let settlement = PaymentSettlement {
            payment_id: payment.id,
            transaction_id: transaction_id.clone(),
            paid_at: Utc::now(),
            order: NewOrder::from_paid_payment(&payment),
        };

        match self.store.settle_payment(settlement).await? {
            SettleResult::Settled(order) => {
                tracing::info!(
                    payment_id = %payment.id,
                    order_id = %order.id,
                    order_no = %order.order_no,
                    trigger,
                    "payment settled, order created"
                );
                self.audit(payment.audit_entry(
                    trigger,
                    "paid",
                    json!({
                        "old_status": PaymentStatus::Pending.as_str(),
                        "new_status": PaymentStatus::Paid.as_str(),
                        "transaction_id": transaction_id,
                        "order_id": order.id,
                        "order_no": order.order_no,
                    }),
                ))
                .await;
                self.announce_paid_order(&order);
                Ok(ReconcileResult::Materialized(order))
            }
            SettleResult::AlreadySettled(order) => {
                tracing::info!(payment_id = %payment.id, order_no = %order.order_no, trigger, "lost settle race");
                Ok(ReconcileResult::AlreadyReconciled(order))
            }
            SettleResult::NotPending(status) => {
                Err(self.settle_anomaly(&payment, status, transaction_id.as_deref(), trigger).await)
            }
        }
    }

    /// Success reported for a payment that already failed or was refunded.
    /// Recorded for operator review, never auto-corrected.
    async fn settle_anomaly(
        &self,
        payment: &Payment,
        status: PaymentStatus,
        transaction_id: Option<&str>,
        trigger: &str,
    ) -> EngineError {
        tracing::error!(
            payment_id = %payment.id,
            current_status = %status,
            transaction_id,
            trigger,
            "success reported for a payment that is no longer pending"
        );
        self.audit(payment.audit_entry(
            trigger,
            "anomaly",
            json!({
                "current_status": status.as_str(),
                "incoming_status": PaymentStatus::Paid.as_str(),
                "transaction_id": transaction_id,
                "anomaly": true,
            }),
        ))
        .await;
        EngineError::Conflict(format!(
            "payment {} is {status}; success signal needs manual review",
            payment.id
        ))
    }

    async fn decline(
        &self,
        payment: Payment,
        transaction_id: Option<String>,
        reason: String,
        trigger: &str,
    ) -> Result<ReconcileResult, EngineError> {
        match payment.status {
            PaymentStatus::Pending => {
                if self
                    .store
                    .fail_payment(payment.id, transaction_id.as_deref())
                    .await?
                {
                    tracing::warn!(payment_id = %payment.id, %reason, trigger, "payment declined");
                    self.audit(payment.audit_entry(
                        trigger,
                        "failed",
                        json!({
                            "old_status": PaymentStatus::Pending.as_str(),
                            "new_status": PaymentStatus::Failed.as_str(),
                            "transaction_id": transaction_id,
                            "reason": reason,
                        }),
                    ))
                    .await;
                } else if let Some(order) = self.order_linked_since(&payment).await? {
                    // The other trigger settled between our read and our update.
                    return Ok(ReconcileResult::AlreadyReconciled(order));
                }
            }
            PaymentStatus::Failed => {
                tracing::info!(payment_id = %payment.id, trigger, "duplicate failure signal");
            }
            PaymentStatus::Paid | PaymentStatus::Refunded => {
                tracing::warn!(payment_id = %payment.id, status = %payment.status, trigger, "failure reported for a settled payment");
                return Err(EngineError::Conflict(format!(
                    "payment {} is already {}",
                    payment.id, payment.status
                )));
            }
        }

        Ok(ReconcileResult::Declined {
            payment_id: payment.id,
            reason,
        })
    }

    async fn order_linked_since(&self, payment: &Payment) -> Result<Option<Order>, EngineError> {
        let current = self.store.payment(payment.id).await?;
        match current.and_then(|p| p.order_id) {
            Some(order_id) => self.load_order(order_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Acknowledgment only: money already moved, so no approval is requested.
    fn announce_paid_order(&self, order: &Order) {
        self.notifier.emit_order_notification(
            order.restaurant_id,
            json!({
                "type": "new_order",
                "message": format!("New paid order {}", order.order_no),
                "requiresApproval": false,
                "order": order,
                "customerName": order.customer_name(),
                "customerPhone": order.customer_phone(),
                "tableNo": order.table_no(),
            }),
        );
        self.notifier.emit_customer_notification(
            &order.guest_id,
            json!({
                "type": "order_placed",
                "message": format!("Your order {} has been placed", order.order_no),
                "orderId": order.id,
                "orderNo": order.order_no,
            }),
        );
    }
}
