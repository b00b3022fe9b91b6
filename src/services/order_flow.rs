use {
    super::{
        Engine,
        pricing::{PricingRequest, price_cart},
    },
    crate::domain::{
        actor::AdminActor,
        cart::GuestCart,
        error::EngineError,
        id::{GuestId, OrderId, RestaurantId},
        money::within_tolerance,
        notify::{ORDER_CANCELLED, ORDER_REQUEST_RESOLVED, ORDER_STATUS_CHANGED},
        order::{InsertOrder, NewOrder, Order, OrderRequest, OrderStatus, PaymentOption},
    },
    chrono::Utc,
    serde_json::json,
};

impl Engine {
    /// Pay-later/COD entry point. Nothing is persisted until the restaurant accepts.
    pub async fn request_order(
        &self,
        restaurant_id: RestaurantId,
        guest_id: Option<&str>,
        payment_option: PaymentOption,
        cart: GuestCart,
    ) -> Result<OrderRequest, EngineError> {
        if payment_option == PaymentOption::PayNow {
            if let Some(raw) = guest_id.map(str::trim).filter(|s| !s.is_empty()) {
                let guest_id = GuestId::new(raw)?;
                let since = Utc::now() - self.settings.duplicate_order_window;
                if self
                    .store
                    .latest_paid_payment(restaurant_id, &guest_id, Some(since))
                    .await?
                    .is_some()
                {
                    return Err(EngineError::conflict(
                        "payment already completed, check your orders",
                    ));
                }
            }
            return Err(EngineError::validation(
                "pay_now orders must be placed through checkout",
            ));
        }

        let guest_id = self.resolve_guest_id(restaurant_id, guest_id).await?;
        let restaurant = self.restaurant(restaurant_id).await?;
        let cart = price_cart(
            &*self.catalog,
            &restaurant,
            PricingRequest {
                restaurant_id,
                guest_id,
                payment_option,
                cart,
            },
        )
        .await?;

        Ok(self.broadcast_order_request(cart))
    }

    /// Makes a pay-later/COD request durable. Repeated accepts of the same
    /// request return the order created by the first one.
    pub async fn accept_order(
        &self,
        actor: &AdminActor,
        request: OrderRequest,
    ) -> Result<Order, EngineError> {
        let restaurant_id = request.cart.restaurant_id;
        actor.ensure_owns(restaurant_id)?;
        self.ensure_approvable(&request).await?;

        let order = match self.store.insert_order(NewOrder::from_request(&request)).await? {
            InsertOrder::Created(order) => order,
            InsertOrder::Existing(order) => {
                tracing::info!(request_id = %request.request_id, order_no = %order.order_no, "duplicate accept");
                return Ok(order);
            }
        };

        tracing::info!(
            restaurant_id = %restaurant_id,
            request_id = %request.request_id,
            order_id = %order.id,
            order_no = %order.order_no,
            "order request accepted"
        );
        self.audit(order.audit_entry(
            &actor.label(),
            "accepted",
            json!({
                "request_id": request.request_id,
                "order_no": order.order_no,
                "payment_option": order.payment_option,
            }),
        ))
        .await;

        self.notifier.emit_customer_notification(
            &order.guest_id,
            json!({
                "type": "order_accepted",
                "message": format!("Your order {} has been accepted", order.order_no),
                "orderId": order.id,
                "orderNo": order.order_no,
            }),
        );
        self.notifier.emit_to_restaurant(
            restaurant_id,
            ORDER_REQUEST_RESOLVED,
            json!({
                "requestId": request.request_id,
                "status": "accepted",
                "orderId": order.id,
                "orderNo": order.order_no,
            }),
        );

        Ok(order)
    }

    pub async fn decline_order(
        &self,
        actor: &AdminActor,
        request: OrderRequest,
        reason: Option<&str>,
    ) -> Result<(), EngineError> {
        let restaurant_id = request.cart.restaurant_id;
        actor.ensure_owns(restaurant_id)?;
        self.ensure_approvable(&request).await?;

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        tracing::info!(restaurant_id = %restaurant_id, request_id = %request.request_id, reason, "order request declined");
        self.audit(request.audit_entry(&actor.label(), "declined", json!({ "reason": reason })))
            .await;

        self.notifier.emit_customer_notification(
            &request.cart.guest_id,
            json!({
                "type": "order_declined",
                "message": "Your order request was declined by the restaurant",
                "requestId": request.request_id,
                "reason": reason,
            }),
        );
        self.notifier.emit_to_restaurant(
            restaurant_id,
            ORDER_REQUEST_RESOLVED,
            json!({
                "requestId": request.request_id,
                "status": "declined",
            }),
        );
        Ok(())
    }

    /// Accept/decline guard: only unpaid pay-later/COD requests whose
    /// snapshot still adds up, and never for a guest holding a paid payment
    /// at this restaurant, however old.
    async fn ensure_approvable(&self, request: &OrderRequest) -> Result<(), EngineError> {
        let cart = &request.cart;
        if cart.payment_option == PaymentOption::PayNow || !cart.skip_payment {
            return Err(EngineError::validation(
                "pay_now orders cannot go through the approval flow",
            ));
        }
        if !within_tolerance(cart.items_total(), cart.total_amount) {
            return Err(EngineError::Conflict(format!(
                "Total amount mismatch. Calculated: {}, Cart total: {}",
                cart.items_total(),
                cart.total_amount
            )));
        }

        if let Some(payment) = self
            .store
            .latest_paid_payment(cart.restaurant_id, &cart.guest_id, None)
            .await?
        {
            tracing::warn!(
                request_id = %request.request_id,
                payment_id = %payment.id,
                "approval attempted for a guest with a paid payment"
            );
            return Err(EngineError::conflict(
                "a paid order cannot be accepted or declined through the approval flow",
            ));
        }
        Ok(())
    }

    /// Guest-initiated cancellation.
    pub async fn cancel_order(
        &self,
        guest_id: &GuestId,
        order_id: OrderId,
        reason: Option<&str>,
    ) -> Result<Order, EngineError> {
        let order = self.load_order(order_id).await?;
        if order.guest_id != *guest_id {
            return Err(EngineError::Authorization(
                "order does not belong to this guest".to_string(),
            ));
        }

        let order = self
            .apply_status(order, OrderStatus::Cancelled, reason, &format!("guest:{guest_id}"))
            .await?;

        self.notifier.emit_to_restaurant(
            order.restaurant_id,
            ORDER_CANCELLED,
            json!({
                "orderId": order.id,
                "orderNo": order.order_no,
                "cancellationReason": order.cancellation_reason,
                "customerName": order.customer_name(),
                "customerPhone": order.customer_phone(),
                "tableNo": order.table_no(),
            }),
        );
        Ok(order)
    }

    pub async fn change_order_status(
        &self,
        actor: &AdminActor,
        order_id: OrderId,
        next: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Order, EngineError> {
        let order = self.load_order(order_id).await?;
        actor.ensure_owns(order.restaurant_id)?;

        let order = self.apply_status(order, next, reason, &actor.label()).await?;

        self.notifier.emit_to_guest(
            &order.guest_id,
            ORDER_STATUS_CHANGED,
            json!({
                "orderId": order.id,
                "orderNo": order.order_no,
                "status": order.status,
                "cancellationReason": order.cancellation_reason,
            }),
        );
        Ok(order)
    }

    async fn apply_status(
        &self,
        order: Order,
        next: OrderStatus,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<Order, EngineError> {
        let reason = order.check_transition(next, reason)?;
        let previous = order.status;

        let updated = self
            .store
            .update_order_status(order.id, previous, next, reason.as_deref(), Utc::now())
            .await?
            .ok_or_else(|| {
                EngineError::Conflict(format!(
                    "order {} changed status concurrently, reload and retry",
                    order.order_no
                ))
            })?;

        tracing::info!(order_id = %updated.id, from = %previous, to = %next, actor, "order status changed");
        self.audit(updated.audit_entry(
            actor,
            "status_changed",
            json!({
                "old_status": previous,
                "new_status": next,
                "reason": reason,
            }),
        ))
        .await;
        Ok(updated)
    }

    pub async fn order_for_guest(
        &self,
        guest_id: &GuestId,
        order_id: OrderId,
    ) -> Result<Order, EngineError> {
        let order = self.load_order(order_id).await?;
        if order.guest_id != *guest_id {
            return Err(EngineError::not_found(format!("order {order_id} not found")));
        }
        Ok(order)
    }

    pub async fn order_for_admin(
        &self,
        actor: &AdminActor,
        order_id: OrderId,
    ) -> Result<Order, EngineError> {
        let order = self.load_order(order_id).await?;
        actor.ensure_owns(order.restaurant_id)?;
        Ok(order)
    }

    pub async fn restaurant_orders(
        &self,
        actor: &AdminActor,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, EngineError> {
        self.store
            .orders_for_restaurant(actor.restaurant_id, status)
            .await
    }

    pub async fn guest_orders(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
    ) -> Result<Vec<Order>, EngineError> {
        self.store.orders_for_guest(restaurant_id, guest_id).await
    }

    /// Deletes only orders owned by the caller's restaurant; others are skipped.
    pub async fn delete_orders(
        &self,
        actor: &AdminActor,
        ids: &[OrderId],
    ) -> Result<u64, EngineError> {
        if ids.is_empty() {
            return Err(EngineError::validation("no order ids given"));
        }
        let deleted = self.store.delete_orders(actor.restaurant_id, ids).await?;
        tracing::warn!(restaurant_id = %actor.restaurant_id, requested = ids.len(), deleted, actor = %actor.label(), "orders purged");
        Ok(deleted)
    }
}
