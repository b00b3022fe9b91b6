use {
    crate::domain::{
        cart::{PricedCommonAddOn, PricedLineItem, ValidatedCart},
        error::EngineError,
        gateway::{
            CallbackSource, CreatedIntent, GatewayCallback, GatewayCredentials, GatewayFuture,
            GatewayRefundReceipt, GatewayRefundRequest, GatewayRefundStatus, IntentRequest,
            PaymentGateway,
        },
        money::{Currency, MoneyAmount},
        payment::{GatewayKind, Payment, PaymentLookup, PaymentOutcome},
    },
    std::collections::HashMap,
    stripe::{
        CheckoutSession, CheckoutSessionMode, CheckoutSessionPaymentStatus, Client,
        CreateCheckoutSession, CreateCheckoutSessionLineItems,
        CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
        CreateCustomer, CreateRefund, Customer, EventObject, EventType, Expandable, Webhook,
    },
};

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Stripe Checkout Sessions. Secrets come per call from the restaurant.
#[derive(Default)]
pub struct StripeGateway;

impl StripeGateway {
    pub fn new() -> Self {
        Self
    }
}

impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    fn create_intent<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        request: &'a IntentRequest,
    ) -> GatewayFuture<'a, CreatedIntent> {
        Box::pin(async move { self.create_session(credentials, request).await })
    }

    fn locate(&self, callback: &GatewayCallback) -> Result<Vec<PaymentLookup>, EngineError> {
        match callback.source {
            CallbackSource::Redirect => callback
                .query
                .get("session_id")
                .map(|id| vec![PaymentLookup::Session(id.clone())])
                .ok_or_else(|| EngineError::validation("session_id is required")),
            CallbackSource::Webhook => {
                // Unverified: only used to find whose secret verifies it.
                let event: serde_json::Value = serde_json::from_str(&callback.body)?;
                let object = &event["data"]["object"];
                let id = object["id"]
                    .as_str()
                    .ok_or_else(|| EngineError::validation("webhook event has no object id"))?;
                match object["object"].as_str() {
                    Some("checkout.session") => Ok(vec![PaymentLookup::Session(id.to_string())]),
                    Some("payment_intent") => Ok(vec![PaymentLookup::Transaction(id.to_string())]),
                    other => Err(EngineError::Validation(format!(
                        "unsupported webhook object: {other:?}"
                    ))),
                }
            }
        }
    }

    fn verify<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        callback: &'a GatewayCallback,
        payment: &'a Payment,
    ) -> GatewayFuture<'a, PaymentOutcome> {
        Box::pin(async move {
            let credentials = credentials.stripe()?;
            match callback.source {
                CallbackSource::Webhook => {
                    let signature = callback.signature.as_deref().ok_or_else(|| {
                        EngineError::WebhookSignature("missing Stripe-Signature header".into())
                    })?;
                    let event =
                        Webhook::construct_event(&callback.body, signature, &credentials.webhook_secret)
                            .map_err(|e| EngineError::WebhookSignature(e.to_string()))?;
                    event_outcome(event.type_, event.data.object, payment)
                }
                CallbackSource::Redirect => {
                    let client = Client::new(credentials.secret_key.clone());
                    let session_id = payment
                        .session_id
                        .parse::<stripe::CheckoutSessionId>()
                        .map_err(|e| EngineError::Validation(format!("invalid session id: {e}")))?;
                    let session = CheckoutSession::retrieve(&client, &session_id, &[])
                        .await
                        .map_err(api_error)?;
                    Ok(session_outcome(&session))
                }
            }
        })
    }

    fn refund<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        request: &'a GatewayRefundRequest,
    ) -> GatewayFuture<'a, GatewayRefundReceipt> {
        Box::pin(async move {
            let client = Client::new(credentials.stripe()?.secret_key.clone());
            let payment_intent = request
                .transaction_id
                .parse::<stripe::PaymentIntentId>()
                .map_err(|e| EngineError::Validation(format!("invalid PaymentIntent id: {e}")))?;

            let mut params = CreateRefund::new();
            params.payment_intent = Some(payment_intent);
            params.amount = Some(request.amount.amount().minor());
            params.metadata = Some(HashMap::from([
                ("refund_id".to_string(), request.refund_id.to_string()),
                ("reason".to_string(), truncate(&request.reason, MAX_DESCRIPTION_LEN)),
            ]));

            let refund = stripe::Refund::create(&client, params)
                .await
                .map_err(api_error)?;

            let status = match refund.status.as_deref() {
                Some("succeeded") => GatewayRefundStatus::Succeeded,
                Some("failed") | Some("canceled") => GatewayRefundStatus::Declined(
                    refund
                        .failure_reason
                        .map(|r| format!("{r:?}"))
                        .unwrap_or_else(|| "refund declined by stripe".to_string()),
                ),
                _ => GatewayRefundStatus::Pending,
            };

            Ok(GatewayRefundReceipt {
                gateway_refund_id: refund.id.to_string(),
                status,
            })
        })
    }
}

impl StripeGateway {
    async fn create_session(
        &self,
        credentials: &GatewayCredentials,
        request: &IntentRequest,
    ) -> Result<CreatedIntent, EngineError> {
        let client = Client::new(credentials.stripe()?.secret_key.clone());
        let cart = &request.cart;
        let currency = stripe_currency(cart.currency);

        let customer_name = cart.customer_name().unwrap_or("Guest Customer").to_string();
        let customer_email = format!("guest_{}@dineos.com", cart.guest_id);
        let customer = Customer::create(
            &client,
            CreateCustomer {
                name: Some(customer_name.as_str()),
                email: Some(customer_email.as_str()),
                ..Default::default()
            },
        )
        .await
        .map_err(api_error)?;

        let mut line_items = cart
            .line_items
            .iter()
            .map(|line| product_line(line, cart.currency, currency))
            .collect::<Result<Vec<_>, _>>()?;
        for add_on in &cart.add_ons_line_items {
            line_items.push(common_add_on_line(add_on, cart.currency, currency)?);
        }

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.customer = Some(customer.id);
        params.success_url = Some(request.success_url.as_str());
        params.cancel_url = Some(request.cancel_url.as_str());
        params.line_items = Some(line_items);
        params.metadata = Some(session_metadata(cart));

        let session = CheckoutSession::create(&client, params)
            .await
            .map_err(api_error)?;

        let redirect_url = session
            .url
            .clone()
            .ok_or_else(|| EngineError::Gateway("stripe session has no checkout url".into()))?;

        Ok(CreatedIntent {
            session_id: session.id.to_string(),
            redirect_url,
            special_reference: None,
        })
    }
}

fn event_outcome(
    event_type: EventType,
    object: EventObject,
    payment: &Payment,
) -> Result<PaymentOutcome, EngineError> {
    match (event_type, object) {
        (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => {
            ensure_same_session(&session, payment)?;
            Ok(session_outcome(&session))
        }
        (EventType::CheckoutSessionExpired, EventObject::CheckoutSession(session)) => {
            ensure_same_session(&session, payment)?;
            Ok(PaymentOutcome::Failed {
                transaction_id: None,
                reason: "checkout session expired".to_string(),
            })
        }
        (EventType::PaymentIntentPaymentFailed, EventObject::PaymentIntent(intent)) => {
            Ok(PaymentOutcome::Failed {
                transaction_id: Some(intent.id.to_string()),
                reason: "payment intent failed".to_string(),
            })
        }
        (other, _) => {
            tracing::debug!(event_type = ?other, "stripe event carries no verdict");
            Ok(PaymentOutcome::Pending)
        }
    }
}

fn ensure_same_session(session: &CheckoutSession, payment: &Payment) -> Result<(), EngineError> {
    if session.id.as_str() != payment.session_id {
        return Err(EngineError::Validation(format!(
            "webhook session {} does not belong to payment {}",
            session.id, payment.id
        )));
    }
    Ok(())
}

fn session_outcome(session: &CheckoutSession) -> PaymentOutcome {
    let transaction_id = session.payment_intent.as_ref().map(|e| match e {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(pi) => pi.id.to_string(),
    });

    match session.payment_status {
        CheckoutSessionPaymentStatus::Paid | CheckoutSessionPaymentStatus::NoPaymentRequired => {
            PaymentOutcome::Succeeded { transaction_id }
        }
        CheckoutSessionPaymentStatus::Unpaid => PaymentOutcome::Pending,
    }
}

fn product_line(
    line: &PricedLineItem,
    currency: Currency,
    stripe_currency: stripe::Currency,
) -> Result<CreateCheckoutSessionLineItems, EngineError> {
    let name = match &line.selected_size {
        Some(size) => format!("{} - {size}", line.product_name),
        None => line.product_name.clone(),
    };

    let mut parts = Vec::new();
    if !line.add_ons.is_empty() {
        let names: Vec<&str> = line.add_ons.iter().map(|a| a.name.as_str()).collect();
        parts.push(format!("Add-ons: {}", names.join(", ")));
    }
    if let Some(comments) = &line.comments {
        parts.push(format!("Note: {comments}"));
    }
    parts.push(format!("Qty: {}", line.quantity));

    Ok(price_line(
        truncate(&name, MAX_NAME_LEN),
        Some(truncate(&parts.join(" | "), MAX_DESCRIPTION_LEN)),
        MoneyAmount::from_major(line.item_subtotal, currency)?,
        line.quantity,
        stripe_currency,
    ))
}

fn common_add_on_line(
    add_on: &PricedCommonAddOn,
    currency: Currency,
    stripe_currency: stripe::Currency,
) -> Result<CreateCheckoutSessionLineItems, EngineError> {
    Ok(price_line(
        truncate(&format!("{} (Qty: {})", add_on.name, add_on.quantity), MAX_NAME_LEN),
        Some("Common Add-On".to_string()),
        MoneyAmount::from_major(add_on.price, currency)?,
        add_on.quantity,
        stripe_currency,
    ))
}

fn price_line(
    name: String,
    description: Option<String>,
    unit_amount: MoneyAmount,
    quantity: u32,
    currency: stripe::Currency,
) -> CreateCheckoutSessionLineItems {
    CreateCheckoutSessionLineItems {
        price_data: Some(CreateCheckoutSessionLineItemsPriceData {
            currency,
            product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                name,
                description,
                ..Default::default()
            }),
            unit_amount: Some(unit_amount.minor()),
            ..Default::default()
        }),
        quantity: Some(u64::from(quantity)),
        ..Default::default()
    }
}

fn session_metadata(cart: &ValidatedCart) -> HashMap<String, String> {
    HashMap::from([
        ("restaurantId".to_string(), cart.restaurant_id.to_string()),
        ("guestId".to_string(), cart.guest_id.to_string()),
        ("orderType".to_string(), cart.order_type.as_str().to_string()),
        ("paymentOption".to_string(), cart.payment_option.as_str().to_string()),
    ])
}

fn stripe_currency(currency: Currency) -> stripe::Currency {
    match currency {
        Currency::Aed => stripe::Currency::AED,
        Currency::Egp => stripe::Currency::EGP,
        Currency::Sar => stripe::Currency::SAR,
        Currency::Usd => stripe::Currency::USD,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
    }
}

fn api_error(e: stripe::StripeError) -> EngineError {
    EngineError::Gateway(format!("Stripe API: {e}"))
}

/// Char-boundary-safe truncation.
fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
