//! Refund lifecycle. Each transition is validated against the refund state
//! machine, persisted with a compare-and-set on the previous status, mirrored
//! onto the order and announced to both the guest and the restaurant.

use {
    super::Engine,
    crate::domain::{
        actor::{AdminActor, RefundActor},
        error::EngineError,
        gateway::{GatewayRefundRequest, GatewayRefundStatus},
        id::{CustomerId, GuestId, OrderId, RefundId},
        money::Money,
        notify::REFUND_STATUS_CHANGED,
        order::{Order, OrderRefundSummary, OrderStatus},
        payment::{GatewayKind, PaymentStatus},
        refund::{
            BankDetails, CommunicationKind, Refund, RefundMethod, RefundReferences, RefundStatus,
            RefundType,
        },
        wallet::WalletCredit,
    },
    chrono::Utc,
    rust_decimal::Decimal,
    serde_json::json,
};

const DELETABLE: [RefundStatus; 2] = [RefundStatus::Pending, RefundStatus::Cancelled];

#[derive(Debug, Clone)]
pub struct NewRefundRequest {
    pub order_id: OrderId,
    /// Defaults to the order total.
    pub amount: Option<Decimal>,
    pub reason: String,
}

impl Engine {
    /// Customer-initiated refund against one of their paid orders.
    pub async fn request_refund(
        &self,
        guest_id: &GuestId,
        request: NewRefundRequest,
    ) -> Result<Refund, EngineError> {
        let order = self.load_order(request.order_id).await?;
        if order.guest_id != *guest_id {
            return Err(EngineError::Authorization(
                "order does not belong to this guest".to_string(),
            ));
        }
        if !order.is_paid {
            return Err(EngineError::validation("only paid orders can be refunded"));
        }

        let actor = format!("customer:{guest_id}");
        let mut refund = self.new_refund(&order, &request).await?;
        refund.log(
            CommunicationKind::Notification,
            "Refund request submitted",
            &actor,
            refund.created_at,
        );
        self.open_refund(refund, &actor).await
    }

    /// Restaurant-initiated refund, optionally with the method preselected.
    pub async fn admin_create_refund(
        &self,
        actor: &AdminActor,
        request: NewRefundRequest,
        admin_notes: Option<String>,
    ) -> Result<Refund, EngineError> {
        let order = self.load_order(request.order_id).await?;
        actor.ensure_owns(order.restaurant_id)?;

        let mut refund = self.new_refund(&order, &request).await?;
        refund.admin_notes = admin_notes;
        refund.log(
            CommunicationKind::AdminNote,
            "Refund created by restaurant",
            &actor.label(),
            refund.created_at,
        );
        self.open_refund(refund, &actor.label()).await
    }

    async fn new_refund(
        &self,
        order: &Order,
        request: &NewRefundRequest,
    ) -> Result<Refund, EngineError> {
        if order.status == OrderStatus::Cancelled {
            return Err(EngineError::validation("cancelled orders cannot be refunded"));
        }
        if order.payment_status == Some(PaymentStatus::Refunded) {
            return Err(EngineError::conflict("order has already been refunded"));
        }
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(EngineError::validation("refund reason is required"));
        }
        let amount = request.amount.unwrap_or(order.total_amount);
        if amount <= Decimal::ZERO || amount > order.total_amount {
            return Err(EngineError::Validation(format!(
                "refund amount must be greater than 0 and at most {}",
                order.total_amount
            )));
        }

        let open = self
            .store
            .refunds_for_order(order.id)
            .await?
            .into_iter()
            .find(|r| r.status != RefundStatus::Cancelled);
        if let Some(existing) = open {
            return Err(EngineError::Conflict(format!(
                "refund {} is already {} for this order",
                existing.id, existing.status
            )));
        }

        let now = Utc::now();
        Ok(Refund {
            id: RefundId::generate(),
            order_id: order.id,
            restaurant_id: order.restaurant_id,
            customer_id: CustomerId::from(&order.guest_id),
            refund_type: RefundType::for_amount(amount, order.total_amount),
            refund_method: None,
            original_amount: order.total_amount,
            refund_amount: amount,
            currency: order.currency,
            status: RefundStatus::Pending,
            reason: reason.to_string(),
            references: RefundReferences::default(),
            bank_details: None,
            admin_notes: None,
            failure_reason: None,
            communication_log: Vec::new(),
            processed_by: None,
            processed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn open_refund(&self, refund: Refund, actor: &str) -> Result<Refund, EngineError> {
        self.store.insert_refund(&refund).await?;
        self.store
            .set_order_refund(refund.order_id, Some(&summary(&refund)))
            .await?;

        tracing::info!(refund_id = %refund.id, order_id = %refund.order_id, amount = %refund.refund_amount, actor, "refund requested");
        self.audit(refund.audit_entry(actor, "created", RefundStatus::Pending))
            .await;
        self.announce_refund(&refund);
        Ok(refund)
    }

    /// Admin picks the method; gateway methods need a real gateway payment.
    pub async fn process_refund(
        &self,
        actor: &AdminActor,
        refund_id: RefundId,
        method: RefundMethod,
        admin_notes: Option<String>,
    ) -> Result<Refund, EngineError> {
        let mut refund = self.owned_refund(actor, refund_id).await?;
        let previous = refund.status;
        let now = Utc::now();
        refund.transition_status(RefundStatus::Processing, now)?;

        if let Some(gateway) = method.gateway() {
            let transaction_id = self.gateway_transaction_for(&refund, gateway).await?;
            refund.references.gateway_transaction_id = Some(transaction_id);
        }
        refund.refund_method = Some(method);
        refund.processed_by = Some(actor.label());
        refund.processed_at = Some(now);
        refund.failure_reason = None;
        if admin_notes.is_some() {
            refund.admin_notes = admin_notes;
        }
        refund.log(
            CommunicationKind::AdminNote,
            format!("Refund processing via {method}"),
            &actor.label(),
            now,
        );

        self.commit_transition(refund, previous, &actor.label()).await
    }

    /// The gateway transaction to refund: the order's own payment first,
    /// then the guest's latest paid payment through the same gateway.
    async fn gateway_transaction_for(
        &self,
        refund: &Refund,
        gateway: GatewayKind,
    ) -> Result<String, EngineError> {
        let order = self.load_order(refund.order_id).await?;

        let linked = match order.payment_id {
            Some(payment_id) => self.store.payment(payment_id).await?,
            None => None,
        };
        let payment = match linked.filter(|p| p.gateway == gateway) {
            Some(payment) => Some(payment),
            None => {
                self.store
                    .latest_gateway_payment(order.restaurant_id, &order.guest_id, gateway)
                    .await?
            }
        };

        payment
            .and_then(|p| p.transaction_id)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "no {gateway} payment found for order {}, choose another refund method",
                    order.order_no
                ))
            })
    }

    /// Runs the method-specific side effect.
    pub async fn initiate_refund_payment(
        &self,
        actor: &AdminActor,
        refund_id: RefundId,
    ) -> Result<Refund, EngineError> {
        let mut refund = self.owned_refund(actor, refund_id).await?;
        let previous = refund.status;
        if !matches!(previous, RefundStatus::Processing | RefundStatus::PaymentFailed) {
            return Err(EngineError::Conflict(format!(
                "refund {} is {previous}, it must be processing to initiate payment",
                refund.id
            )));
        }
        let method = refund
            .refund_method
            .ok_or_else(|| EngineError::validation("refund method has not been selected"))?;
        let now = Utc::now();
        let label = actor.label();

        match method {
            RefundMethod::Stripe | RefundMethod::Paymob => {
                self.initiate_gateway_refund(&mut refund, method, &label).await?;
            }
            RefundMethod::Wallet => {
                let receipt = self
                    .store
                    .credit_wallet(WalletCredit {
                        customer_id: refund.customer_id.clone(),
                        amount: refund.refund_amount,
                        currency: refund.currency,
                        reason: format!("Refund for order {}: {}", refund.order_id, refund.reason),
                        order_id: refund.order_id,
                        refund_id: refund.id,
                    })
                    .await?;
                tracing::info!(
                    refund_id = %refund.id,
                    new_balance = %receipt.new_balance,
                    newly_applied = receipt.newly_applied,
                    "wallet credited"
                );
                refund.references.wallet_transaction_id = Some(receipt.transaction.id);
                refund.transition_status(RefundStatus::PaymentInitiated, now)?;
                refund.log(
                    CommunicationKind::Notification,
                    format!("{} credited to wallet", refund.refund_amount),
                    &label,
                    now,
                );
            }
            RefundMethod::Manual => {
                refund.transition_status(RefundStatus::PaymentInitiated, now)?;
                refund.log(
                    CommunicationKind::AdminNote,
                    "Manual refund to be handled offline",
                    &label,
                    now,
                );
            }
            RefundMethod::BankTransfer => {
                refund
                    .bank_details
                    .as_ref()
                    .ok_or_else(|| EngineError::validation("bank details are required for bank transfer"))?
                    .ensure_complete()?;
                refund.transition_status(RefundStatus::PaymentInitiated, now)?;
                refund.log(
                    CommunicationKind::Email,
                    "Bank transfer instruction recorded",
                    &label,
                    now,
                );
            }
        }

        self.commit_transition(refund, previous, &label).await
    }

    async fn initiate_gateway_refund(
        &self,
        refund: &mut Refund,
        method: RefundMethod,
        actor: &str,
    ) -> Result<(), EngineError> {
        let kind = method
            .gateway()
            .ok_or_else(|| EngineError::Validation(format!("{method} is not a gateway method")))?;
        let transaction_id = refund
            .references
            .gateway_transaction_id
            .clone()
            .ok_or_else(|| EngineError::validation("refund has no gateway transaction to refund"))?;

        let restaurant = self.restaurant(refund.restaurant_id).await?;
        let credentials = self.credentials(&restaurant, kind)?;
        let gateway = self.gateways.get(kind)?;
        let request = GatewayRefundRequest {
            refund_id: refund.id,
            transaction_id,
            amount: Money::from_major(refund.refund_amount, refund.currency)?,
            reason: refund.reason.clone(),
        };

        let now = Utc::now();
        match gateway.refund(&credentials, &request).await {
            Ok(receipt) => match receipt.status {
                GatewayRefundStatus::Succeeded | GatewayRefundStatus::Pending => {
                    tracing::info!(refund_id = %refund.id, gateway = %kind, gateway_refund_id = %receipt.gateway_refund_id, "gateway refund initiated");
                    refund.references.gateway_refund_id = Some(receipt.gateway_refund_id);
                    refund.failure_reason = None;
                    refund.transition_status(RefundStatus::PaymentInitiated, now)?;
                    refund.log(
                        CommunicationKind::Notification,
                        format!("Refund sent to {kind}"),
                        actor,
                        now,
                    );
                }
                GatewayRefundStatus::Declined(reason) => {
                    tracing::warn!(refund_id = %refund.id, gateway = %kind, %reason, "gateway declined refund");
                    refund.failure_reason = Some(reason.clone());
                    refund.transition_status(RefundStatus::Failed, now)?;
                    refund.log(
                        CommunicationKind::AdminNote,
                        format!("{kind} declined the refund: {reason}"),
                        actor,
                        now,
                    );
                }
            },
            Err(EngineError::Gateway(reason)) => {
                tracing::warn!(refund_id = %refund.id, gateway = %kind, %reason, "gateway refund call failed");
                refund.failure_reason = Some(reason.clone());
                refund.transition_status(RefundStatus::PaymentFailed, now)?;
                refund.log(
                    CommunicationKind::AdminNote,
                    format!("{kind} refund call failed: {reason}"),
                    actor,
                    now,
                );
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub async fn complete_refund(
        &self,
        actor: &AdminActor,
        refund_id: RefundId,
        admin_notes: Option<String>,
    ) -> Result<Refund, EngineError> {
        let mut refund = self.owned_refund(actor, refund_id).await?;
        let previous = refund.status;
        let now = Utc::now();
        refund.transition_status(RefundStatus::Completed, now)?;
        if admin_notes.is_some() {
            refund.admin_notes = admin_notes;
        }
        refund.log(
            CommunicationKind::Notification,
            "Refund completed",
            &actor.label(),
            now,
        );

        let refund = self.commit_transition(refund, previous, &actor.label()).await?;

        if refund.refund_type == RefundType::Full {
            self.store
                .set_order_payment_status(refund.order_id, PaymentStatus::Refunded)
                .await?;
            let order = self.load_order(refund.order_id).await?;
            if let Some(payment_id) = order.payment_id {
                if !self.store.mark_payment_refunded(payment_id).await? {
                    tracing::warn!(payment_id = %payment_id, refund_id = %refund.id, "linked payment was not paid, left unchanged");
                }
            }
        }
        Ok(refund)
    }

    pub async fn cancel_refund(
        &self,
        actor: &RefundActor,
        refund_id: RefundId,
        reason: Option<&str>,
    ) -> Result<Refund, EngineError> {
        let mut refund = self.refund_for(actor, refund_id).await?;
        if matches!(actor, RefundActor::Customer(_)) && refund.status != RefundStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "refund is {}, only pending refunds can be cancelled by the customer",
                refund.status
            )));
        }

        let previous = refund.status;
        let now = Utc::now();
        let label = actor.label();
        refund.transition_status(RefundStatus::Cancelled, now)?;
        let message = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Refund cancelled: {reason}"),
            None => "Refund cancelled".to_string(),
        };
        refund.log(CommunicationKind::Notification, message, &label, now);

        self.commit_transition(refund, previous, &label).await
    }

    pub async fn delete_refund(
        &self,
        actor: &RefundActor,
        refund_id: RefundId,
    ) -> Result<(), EngineError> {
        let refund = self.refund_for(actor, refund_id).await?;
        if !refund.status.is_deletable() {
            return Err(EngineError::Conflict(format!(
                "refund is {}, only pending or cancelled refunds can be deleted",
                refund.status
            )));
        }
        if !self.store.delete_refund(refund.id, &DELETABLE).await? {
            return Err(EngineError::conflict(
                "refund changed status concurrently, reload and retry",
            ));
        }

        let remaining = self.store.refunds_for_order(refund.order_id).await?;
        let latest = remaining.iter().max_by_key(|r| r.created_at).map(summary);
        self.store
            .set_order_refund(refund.order_id, latest.as_ref())
            .await?;

        tracing::info!(refund_id = %refund.id, order_id = %refund.order_id, actor = %actor.label(), "refund deleted");
        self.audit(refund.audit_entry(&actor.label(), "deleted", refund.status))
            .await;
        Ok(())
    }

    /// Customer supplies bank details once an admin chose bank transfer.
    pub async fn add_bank_details(
        &self,
        guest_id: &GuestId,
        refund_id: RefundId,
        details: BankDetails,
    ) -> Result<Refund, EngineError> {
        let actor = RefundActor::from(guest_id);
        let mut refund = self.refund_for(&actor, refund_id).await?;
        if refund.status != RefundStatus::Processing
            || refund.refund_method != Some(RefundMethod::BankTransfer)
        {
            return Err(EngineError::conflict(
                "bank details can only be added to a processing bank transfer refund",
            ));
        }
        details.ensure_complete()?;

        let now = Utc::now();
        refund.bank_details = Some(details);
        refund.updated_at = now;
        refund.log(
            CommunicationKind::Notification,
            "Bank details submitted",
            &actor.label(),
            now,
        );

        let status = refund.status;
        if !self.store.update_refund(&refund, status).await? {
            return Err(EngineError::conflict(
                "refund changed status concurrently, reload and retry",
            ));
        }
        Ok(refund)
    }

    pub async fn add_communication(
        &self,
        actor: &AdminActor,
        refund_id: RefundId,
        kind: CommunicationKind,
        message: &str,
    ) -> Result<Refund, EngineError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::validation("message is required"));
        }
        let mut refund = self.owned_refund(actor, refund_id).await?;
        let now = Utc::now();
        refund.updated_at = now;
        refund.log(kind, message, &actor.label(), now);

        let status = refund.status;
        if !self.store.update_refund(&refund, status).await? {
            return Err(EngineError::conflict(
                "refund changed status concurrently, reload and retry",
            ));
        }
        Ok(refund)
    }

    /// Loads a refund the actor may see: admins of the owning restaurant,
    /// or the customer it is owed to.
    pub async fn refund_for(
        &self,
        actor: &RefundActor,
        refund_id: RefundId,
    ) -> Result<Refund, EngineError> {
        let refund = self
            .store
            .refund(refund_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("refund {refund_id} not found")))?;
        match actor {
            RefundActor::Admin(admin) => admin.ensure_owns(refund.restaurant_id)?,
            RefundActor::Customer(customer) if *customer != refund.customer_id => {
                return Err(EngineError::Authorization(
                    "refund does not belong to this customer".to_string(),
                ));
            }
            RefundActor::Customer(_) => {}
        }
        Ok(refund)
    }

    async fn owned_refund(
        &self,
        actor: &AdminActor,
        refund_id: RefundId,
    ) -> Result<Refund, EngineError> {
        self.refund_for(&RefundActor::Admin(actor.clone()), refund_id)
            .await
    }

    async fn commit_transition(
        &self,
        refund: Refund,
        previous: RefundStatus,
        actor: &str,
    ) -> Result<Refund, EngineError> {
        if !self.store.update_refund(&refund, previous).await? {
            return Err(EngineError::Conflict(format!(
                "refund {} changed status concurrently, reload and retry",
                refund.id
            )));
        }
        self.store
            .set_order_refund(refund.order_id, Some(&summary(&refund)))
            .await?;

        tracing::info!(refund_id = %refund.id, from = %previous, to = %refund.status, actor, "refund status changed");
        self.audit(refund.audit_entry(actor, "status_changed", previous))
            .await;
        self.announce_refund(&refund);
        Ok(refund)
    }

    fn announce_refund(&self, refund: &Refund) {
        let payload = json!({
            "refundId": refund.id,
            "orderId": refund.order_id,
            "status": refund.status,
            "amount": refund.refund_amount,
            "currency": refund.currency,
            "method": refund.refund_method,
        });
        self.notifier
            .emit_to_restaurant(refund.restaurant_id, REFUND_STATUS_CHANGED, payload.clone());
        match GuestId::new(refund.customer_id.as_str()) {
            Ok(guest_id) => self.notifier.emit_to_guest(&guest_id, REFUND_STATUS_CHANGED, payload),
            Err(e) => tracing::warn!(refund_id = %refund.id, error = %e, "refund customer has no guest channel"),
        }
    }
}

fn summary(refund: &Refund) -> OrderRefundSummary {
    OrderRefundSummary {
        refund_id: refund.id,
        status: refund.status,
        amount: refund.refund_amount,
    }
}
