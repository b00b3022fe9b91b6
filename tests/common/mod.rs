#![allow(dead_code)]

use dine_sync::domain::actor::AdminActor;
use dine_sync::domain::cart::GuestCart;
use dine_sync::domain::catalog::{
    CommonAddOn, PaymentSettings, Product, ProductAddOn, ProductSize, Restaurant, StripeSettings,
    SubscriptionTier, Table,
};
use dine_sync::domain::error::EngineError;
use dine_sync::domain::gateway::{
    CallbackSource, CreatedIntent, GatewayCallback, GatewayCredentials, GatewayFuture,
    GatewayRefundReceipt, GatewayRefundRequest, GatewayRefundStatus, GatewayRegistry,
    IntentRequest, PaymentGateway,
};
use dine_sync::domain::id::{ProductId, RestaurantId, TableId};
use dine_sync::domain::money::Currency;
use dine_sync::domain::notify::{Channel, Notification, NotificationPort, NotificationSink};
use dine_sync::domain::payment::{GatewayKind, Payment, PaymentLookup, PaymentOutcome};
use dine_sync::infra::crypto::CredentialCipher;
use dine_sync::infra::memory::MemoryStore;
use dine_sync::services::{Engine, EngineSettings};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_KEY: &str = "test-encryption-key-for-dine-sync";
pub const VALID_SIGNATURE: &str = "sig_valid";
pub const COMMON_ADD_ON: &str = "Extra Sauce";
pub const SAUCE: &str = "Garlic Sauce";

// ── Scripted gateway ───────────────────────────────────────────────────────

/// Stands in for Stripe. Webhooks must carry [`VALID_SIGNATURE`]; the body
/// is the session id. Redirects carry `session_id` in the query.
pub struct FakeGateway {
    sessions: AtomicUsize,
    outcome: Mutex<PaymentOutcome>,
    refund_result: Mutex<Result<GatewayRefundStatus, String>>,
    pub refund_calls: Mutex<Vec<(String, i64)>>,
    pub intent_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            sessions: AtomicUsize::new(0),
            outcome: Mutex::new(PaymentOutcome::Succeeded {
                transaction_id: Some("pi_test".to_string()),
            }),
            refund_result: Mutex::new(Ok(GatewayRefundStatus::Succeeded)),
            refund_calls: Mutex::new(Vec::new()),
            intent_calls: AtomicUsize::new(0),
        }
    }

    pub fn script_outcome(&self, outcome: PaymentOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn script_refund(&self, result: Result<GatewayRefundStatus, String>) {
        *self.refund_result.lock().unwrap() = result;
    }
}

impl PaymentGateway for FakeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    fn create_intent<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        request: &'a IntentRequest,
    ) -> GatewayFuture<'a, CreatedIntent> {
        Box::pin(async move {
            credentials.stripe()?;
            self.intent_calls.fetch_add(1, Ordering::SeqCst);
            let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CreatedIntent {
                session_id: format!("cs_test_{n}"),
                redirect_url: format!("https://checkout.test/cs_test_{n}?total={}", request.cart.total_amount),
                special_reference: None,
            })
        })
    }

    fn locate(&self, callback: &GatewayCallback) -> Result<Vec<PaymentLookup>, EngineError> {
        let session = match callback.source {
            CallbackSource::Redirect => callback.query.get("session_id").cloned(),
            CallbackSource::Webhook => Some(callback.body.clone()).filter(|b| !b.is_empty()),
        };
        session
            .map(|s| vec![PaymentLookup::Session(s)])
            .ok_or_else(|| EngineError::validation("no session id in callback"))
    }

    fn verify<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        callback: &'a GatewayCallback,
        _payment: &'a Payment,
    ) -> GatewayFuture<'a, PaymentOutcome> {
        Box::pin(async move {
            credentials.stripe()?;
            if callback.source == CallbackSource::Webhook
                && callback.signature.as_deref() != Some(VALID_SIGNATURE)
            {
                return Err(EngineError::WebhookSignature("signature mismatch".into()));
            }
            // Both triggers race the settle, not the verification.
            tokio::task::yield_now().await;
            Ok(self.outcome.lock().unwrap().clone())
        })
    }

    fn refund<'a>(
        &'a self,
        _credentials: &'a GatewayCredentials,
        request: &'a GatewayRefundRequest,
    ) -> GatewayFuture<'a, GatewayRefundReceipt> {
        Box::pin(async move {
            self.refund_calls
                .lock()
                .unwrap()
                .push((request.transaction_id.clone(), request.amount.amount().minor()));
            match self.refund_result.lock().unwrap().clone() {
                Ok(status) => Ok(GatewayRefundReceipt {
                    gateway_refund_id: format!("re_{}", request.refund_id),
                    status,
                }),
                Err(reason) => Err(EngineError::Gateway(reason)),
            }
        })
    }
}

// ── Notification recorder ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    pub fn named(&self, event: &str) -> Vec<Notification> {
        self.events()
            .into_iter()
            .filter(|n| n.event == event)
            .collect()
    }

    pub fn on_channel(&self, channel: &Channel) -> Vec<Notification> {
        self.events()
            .into_iter()
            .filter(|n| n.channel == *channel)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, notification: Notification) {
        self.events.lock().unwrap().push(notification);
    }
}

// ── Engine fixture ─────────────────────────────────────────────────────────

pub struct TestEnv {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub sink: Arc<RecordingSink>,
    pub restaurant_id: RestaurantId,
    pub table_id: TableId,
    /// Price 20, no sizes, one add-on.
    pub burger_id: ProductId,
    /// Sized product: Small 8, Large 12 (offer 10).
    pub coffee_id: ProductId,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let cipher = CredentialCipher::new(TEST_KEY).unwrap();
        let store = Arc::new(MemoryStore::new());

        let restaurant_id = RestaurantId::generate();
        store.add_restaurant(Restaurant {
            id: restaurant_id,
            name: "Test Bistro".to_string(),
            slug: "test-bistro".to_string(),
            subscription: SubscriptionTier::Advanced,
            currency: Currency::Aed,
            payment_settings: PaymentSettings {
                is_payment_enabled: true,
                selected_gateway: Some(GatewayKind::Stripe),
                stripe: Some(StripeSettings {
                    secret_key: cipher.encrypt("sk_test_123").unwrap(),
                    webhook_secret: cipher.encrypt("whsec_test_123").unwrap(),
                }),
                paymob: None,
            },
        });

        let table_id = TableId::generate();
        store.add_table(Table {
            id: table_id,
            restaurant_id,
            table_no: "7".to_string(),
        });

        let burger_id = ProductId::generate();
        store.add_product(Product {
            id: burger_id,
            restaurant_id,
            name: "Burger".to_string(),
            price: Decimal::from(20),
            offer_price: None,
            is_available: true,
            sizes: Vec::new(),
            add_ons: vec![ProductAddOn {
                name: SAUCE.to_string(),
                price: Decimal::from(3),
                is_available: true,
            }],
        });

        let coffee_id = ProductId::generate();
        store.add_product(Product {
            id: coffee_id,
            restaurant_id,
            name: "Coffee".to_string(),
            price: Decimal::from(8),
            offer_price: None,
            is_available: true,
            sizes: vec![
                ProductSize {
                    name: "Small".to_string(),
                    price: Decimal::from(8),
                    offer_price: None,
                    is_available: true,
                },
                ProductSize {
                    name: "Large".to_string(),
                    price: Decimal::from(12),
                    offer_price: Some(Decimal::from(10)),
                    is_available: true,
                },
            ],
            add_ons: Vec::new(),
        });

        store.add_common_add_on(CommonAddOn {
            name: COMMON_ADD_ON.to_string(),
            price: Decimal::from(5),
            is_available: true,
        });

        let gateway = Arc::new(FakeGateway::new());
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::new(
            store.clone(),
            store.clone(),
            GatewayRegistry::new().with(gateway.clone()),
            NotificationPort::with_sink(sink.clone()),
            Arc::new(cipher),
            settings,
        );

        Self {
            engine,
            store,
            gateway,
            sink,
            restaurant_id,
            table_id,
            burger_id,
            coffee_id,
        }
    }

    pub fn admin(&self) -> AdminActor {
        AdminActor {
            user_id: "staff-1".to_string(),
            restaurant_id: self.restaurant_id,
        }
    }

    /// One burger plus two common add-ons: 20 + 5 × 2 = 30.
    pub fn dine_in_cart(&self, total: Decimal) -> GuestCart {
        cart(json!({
            "orderType": "Dine-In",
            "tableId": self.table_id,
            "lineItems": [{ "productId": self.burger_id, "quantity": 1 }],
            "addOnsLineItems": [{ "name": COMMON_ADD_ON, "quantity": 2 }],
            "totalAmount": total,
        }))
    }

    pub fn delivery_cart(&self, total: Decimal) -> GuestCart {
        cart(json!({
            "orderType": "Home-Delivery",
            "deliveryAddress": {
                "name": "Layla",
                "phone": { "countryCode": "+971", "number": "501234567" },
                "address": "12 Marina Walk",
            },
            "lineItems": [{ "productId": self.burger_id, "quantity": 1 }],
            "addOnsLineItems": [{ "name": COMMON_ADD_ON, "quantity": 2 }],
            "totalAmount": total,
        }))
    }
}

pub fn cart(value: serde_json::Value) -> GuestCart {
    serde_json::from_value(value).expect("fixture cart must deserialize")
}

pub fn redirect(session_id: &str) -> GatewayCallback {
    GatewayCallback::redirect([("session_id".to_string(), session_id.to_string())].into())
}

pub fn webhook(session_id: &str) -> GatewayCallback {
    GatewayCallback::webhook(session_id.to_string(), Some(VALID_SIGNATURE.to_string()))
}
