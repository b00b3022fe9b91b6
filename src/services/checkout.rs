use {
    super::{
        Engine,
        pricing::{PricingRequest, price_cart},
    },
    crate::domain::{
        cart::{GuestCart, ValidatedCart},
        catalog::Restaurant,
        error::EngineError,
        gateway::IntentRequest,
        id::{GuestId, PaymentId, RestaurantId},
        order::{Order, OrderRequest, PaymentOption},
        payment::{GatewayKind, NewPayment, PaymentLookup, PaymentStatus},
    },
    chrono::Utc,
    serde::Serialize,
    serde_json::json,
};

#[derive(Debug)]
pub struct CheckoutRequest {
    pub restaurant_id: RestaurantId,
    pub guest_id: Option<String>,
    pub payment_option: PaymentOption,
    pub cart: GuestCart,
}

#[derive(Debug)]
pub enum CheckoutOutcome {
    /// Guest must be sent to the gateway's hosted page.
    Redirect {
        guest_id: GuestId,
        payment_id: PaymentId,
        gateway: GatewayKind,
        session_id: String,
        redirect_url: String,
    },
    /// Pay-later/COD request broadcast to the restaurant; nothing persisted.
    RequiresApproval(OrderRequest),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub payment_id: PaymentId,
    pub gateway: GatewayKind,
    pub status: PaymentStatus,
    pub order: Option<Order>,
}

impl Engine {
    /// Keeps the guest's id when they already ordered here, otherwise mints one.
    pub async fn resolve_guest_id(
        &self,
        restaurant_id: RestaurantId,
        candidate: Option<&str>,
    ) -> Result<GuestId, EngineError> {
        if let Some(raw) = candidate.map(str::trim).filter(|s| !s.is_empty()) {
            let guest_id = GuestId::new(raw)?;
            if self.store.has_orders_for_guest(restaurant_id, &guest_id).await? {
                return Ok(guest_id);
            }
        }
        Ok(GuestId::generate())
    }

    pub async fn start_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, EngineError> {
        let guest_id = self
            .resolve_guest_id(request.restaurant_id, request.guest_id.as_deref())
            .await?;
        let restaurant = self.restaurant(request.restaurant_id).await?;
        let cart = price_cart(
            &*self.catalog,
            &restaurant,
            PricingRequest {
                restaurant_id: request.restaurant_id,
                guest_id,
                payment_option: request.payment_option,
                cart: request.cart,
            },
        )
        .await?;

        if cart.skip_payment {
            return Ok(CheckoutOutcome::RequiresApproval(
                self.broadcast_order_request(cart),
            ));
        }

        let kind = restaurant
            .payment_settings
            .selected_gateway
            .ok_or_else(|| EngineError::validation("no payment gateway selected for this restaurant"))?;
        let gateway = self.gateways.get(kind)?;
        let credentials = self.credentials(&restaurant, kind)?;
        let intent_request = self.intent_request(&restaurant, kind, cart);

        let intent = gateway
            .create_intent(&credentials, &intent_request)
            .await
            .inspect_err(|e| {
                tracing::warn!(restaurant_id = %restaurant.id, gateway = %kind, error = %e, "intent creation failed");
            })?;

        let payment = self
            .store
            .insert_payment(NewPayment::new(
                intent_request.cart,
                kind,
                intent.session_id,
                intent.special_reference,
            ))
            .await?;

        tracing::info!(
            payment_id = %payment.id,
            restaurant_id = %payment.restaurant_id,
            gateway = %kind,
            session_id = %payment.session_id,
            amount = %payment.amount,
            "payment intent created"
        );
        self.audit(payment.audit_entry(
            "checkout",
            "created",
            json!({
                "gateway": kind.as_str(),
                "session_id": payment.session_id,
                "amount": payment.amount,
                "currency": payment.currency.as_str(),
            }),
        ))
        .await;

        Ok(CheckoutOutcome::Redirect {
            guest_id: payment.guest_id,
            payment_id: payment.id,
            gateway: kind,
            session_id: payment.session_id,
            redirect_url: intent.redirect_url,
        })
    }

    pub async fn session_status(&self, session_id: &str) -> Result<SessionStatus, EngineError> {
        let payment = self
            .store
            .find_payment(&PaymentLookup::Session(session_id.to_string()))
            .await?
            .ok_or_else(|| EngineError::not_found(format!("payment session {session_id} not found")))?;

        let order = match payment.order_id {
            Some(order_id) => self.store.order(order_id).await?,
            None => None,
        };

        Ok(SessionStatus {
            payment_id: payment.id,
            gateway: payment.gateway,
            status: payment.status,
            order,
        })
    }

    /// Publishes an unpersisted request to the restaurant dashboard.
    pub(super) fn broadcast_order_request(&self, cart: ValidatedCart) -> OrderRequest {
        let request = OrderRequest::new(cart, Utc::now());
        tracing::info!(
            restaurant_id = %request.cart.restaurant_id,
            request_id = %request.request_id,
            order_type = %request.cart.order_type,
            "order request broadcast"
        );
        self.notifier.emit_order_notification(
            request.cart.restaurant_id,
            json!({
                "type": "order_request",
                "message": request.headline(),
                "requiresApproval": true,
                "request": request,
                "customerName": request.cart.customer_name(),
                "customerPhone": request.cart.customer_phone(),
                "tableNo": request.cart.table_no(),
            }),
        );
        request
    }

    fn intent_request(
        &self,
        restaurant: &Restaurant,
        kind: GatewayKind,
        cart: ValidatedCart,
    ) -> IntentRequest {
        let slug = if restaurant.slug.is_empty() {
            restaurant.id.to_string()
        } else {
            restaurant.slug.clone()
        };
        let page = format!(
            "{}/restaurant/{slug}",
            self.settings.frontend_url.trim_end_matches('/')
        );
        let api = self.settings.public_api_url.trim_end_matches('/');

        IntentRequest {
            success_url: format!("{page}?payment_success=true&session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{page}?payment_cancelled=true"),
            redirect_url: format!("{page}?payment_success=true"),
            webhook_url: format!("{api}/payments/{kind}/webhook"),
            restaurant_slug: slug,
            cart,
        }
    }
}
