mod common;

use chrono::Utc;
use common::*;
use dine_sync::adapters::paymob_client::{PaymobGateway, sign_hmac};
use dine_sync::domain::cart::ValidatedCart;
use dine_sync::domain::error::EngineError;
use dine_sync::domain::gateway::{
    GatewayCallback, GatewayCredentials, GatewayRefundRequest, GatewayRefundStatus,
    IntentRequest, PaymentGateway, PaymobCredentials,
};
use dine_sync::domain::id::{GuestId, PaymentId, RefundId};
use dine_sync::domain::money::{Currency, Money};
use dine_sync::domain::order::PaymentOption;
use dine_sync::domain::payment::{GatewayKind, NewPayment, Payment, PaymentLookup, PaymentOutcome};
use dine_sync::services::pricing::{PricingRequest, validate_cart};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HMAC_SECRET: &str = "paymob-hmac-secret";

fn credentials() -> GatewayCredentials {
    GatewayCredentials::Paymob(PaymobCredentials {
        api_key: "api_key_1".to_string(),
        secret_key: "sk_paymob".to_string(),
        public_key: "pk_paymob".to_string(),
        integration_id: "4242".to_string(),
        hmac_secret: HMAC_SECRET.to_string(),
    })
}

async fn priced_cart() -> ValidatedCart {
    let env = TestEnv::new();
    validate_cart(
        &*env.store,
        PricingRequest {
            restaurant_id: env.restaurant_id,
            guest_id: GuestId::new("guest-1").unwrap(),
            payment_option: PaymentOption::PayNow,
            cart: env.delivery_cart(Decimal::from(30)),
        },
    )
    .await
    .unwrap()
}

async fn pending_payment() -> Payment {
    NewPayment::new(priced_cart().await, GatewayKind::Paymob, "int_1".to_string(), None)
        .into_payment(PaymentId::new(1), Utc::now())
}

/// A TRANSACTION callback object with the given amount and verdict.
fn transaction(amount_cents: i64, success: bool) -> Value {
    json!({
        "amount_cents": amount_cents, "created_at": "2024-01-01T00:00:00", "currency": "AED",
        "error_occured": false, "has_parent_transaction": false, "id": 77,
        "integration_id": 4242, "is_3d_secure": true, "is_auth": false, "is_capture": false,
        "is_refunded": false, "is_standalone_payment": true, "is_voided": false,
        "order": { "id": 9, "merchant_order_id": "order-ref-1" }, "owner": 1, "pending": false,
        "source_data": { "pan": "2346", "sub_type": "MasterCard", "type": "card" },
        "success": success,
        "data": { "message": "Do not honour" },
    })
}

fn signing_string(amount_cents: i64, success: bool) -> String {
    format!(
        "{amount_cents}2024-01-01T00:00:00AEDfalsefalse774242truefalsefalsefalsetruefalse91false2346MasterCardcard{success}"
    )
}

fn signed_webhook(obj: Value, signed_as: &str) -> GatewayCallback {
    let body = json!({ "type": "TRANSACTION", "obj": obj }).to_string();
    GatewayCallback::webhook(body, Some(sign_hmac(HMAC_SECRET, signed_as).unwrap()))
}

// ── Intention ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn creates_intention_and_builds_unified_checkout_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/tokens"))
        .and(body_partial_json(json!({ "api_key": "api_key_1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": "tok_1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/intention/"))
        .and(header("authorization", "Token tok_1"))
        .and(body_partial_json(json!({
            "amount": 3000,
            "currency": "AED",
            "payment_methods": [4242],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pi_paymob_1",
            "client_secret": "cs_secret",
            "special_reference": "order-ref-1",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = PaymobGateway::new(server.uri()).unwrap();
    let request = IntentRequest {
        cart: priced_cart().await,
        restaurant_slug: "test-bistro".to_string(),
        success_url: "https://app.test/success".to_string(),
        cancel_url: "https://app.test/cancel".to_string(),
        redirect_url: "https://api.test/payments/paymob/redirect".to_string(),
        webhook_url: "https://api.test/payments/paymob/webhook".to_string(),
    };

    let intent = gateway.create_intent(&credentials(), &request).await.unwrap();

    assert_eq!(intent.session_id, "pi_paymob_1");
    assert_eq!(intent.special_reference.as_deref(), Some("order-ref-1"));
    assert_eq!(
        intent.redirect_url,
        format!(
            "{}/unifiedcheckout/?publicKey=pk_paymob&clientSecret=cs_secret",
            server.uri()
        )
    );
}

#[tokio::test]
async fn failed_auth_surfaces_as_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/tokens"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad api key"))
        .mount(&server)
        .await;

    let gateway = PaymobGateway::new(server.uri()).unwrap();
    let request = IntentRequest {
        cart: priced_cart().await,
        restaurant_slug: "test-bistro".to_string(),
        success_url: String::new(),
        cancel_url: String::new(),
        redirect_url: String::new(),
        webhook_url: String::new(),
    };

    let err = gateway.create_intent(&credentials(), &request).await.unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)), "got {err:?}");
    assert!(err.to_string().contains("401"));
}

// ── Refunds ────────────────────────────────────────────────────────────────

fn refund_request() -> GatewayRefundRequest {
    GatewayRefundRequest {
        refund_id: RefundId::generate(),
        transaction_id: "77".to_string(),
        amount: Money::from_major(Decimal::new(1250, 2), Currency::Aed).unwrap(),
        reason: "cold food".to_string(),
    }
}

#[tokio::test]
async fn refund_posts_minor_units_with_secret_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/acceptance/void_refund/refund"))
        .and(header("authorization", "Token sk_paymob"))
        .and(body_partial_json(json!({ "transaction_id": "77", "amount_cents": 1250 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 901, "success": true, "pending": false,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = PaymobGateway::new(server.uri()).unwrap();
    let receipt = gateway.refund(&credentials(), &refund_request()).await.unwrap();

    assert_eq!(receipt.gateway_refund_id, "901");
    assert_eq!(receipt.status, GatewayRefundStatus::Succeeded);
}

#[tokio::test]
async fn refund_decline_and_pending_are_distinguished() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/acceptance/void_refund/refund"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 902, "success": false, "pending": false,
            "data": { "message": "Refund window closed" },
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/acceptance/void_refund/refund"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 903, "success": true, "pending": true,
        })))
        .mount(&server)
        .await;

    let gateway = PaymobGateway::new(server.uri()).unwrap();
    let declined = gateway.refund(&credentials(), &refund_request()).await.unwrap();
    assert_eq!(
        declined.status,
        GatewayRefundStatus::Declined("Refund window closed".to_string())
    );

    let pending = gateway.refund(&credentials(), &refund_request()).await.unwrap();
    assert_eq!(pending.status, GatewayRefundStatus::Pending);
}

#[tokio::test]
async fn refund_server_error_is_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/acceptance/void_refund/refund"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gateway = PaymobGateway::new(server.uri()).unwrap();
    let err = gateway.refund(&credentials(), &refund_request()).await.unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)), "got {err:?}");
}

// ── Callback verification ──────────────────────────────────────────────────

#[tokio::test]
async fn locate_prefers_transaction_then_reference() {
    let gateway = PaymobGateway::new("http://unused.test").unwrap();
    let callback = signed_webhook(transaction(3000, true), &signing_string(3000, true));

    let lookups = gateway.locate(&callback).unwrap();
    assert_eq!(
        lookups,
        vec![
            PaymentLookup::Transaction("77".to_string()),
            PaymentLookup::Reference("order-ref-1".to_string()),
        ]
    );
}

#[tokio::test]
async fn signed_success_with_matching_amount_is_succeeded() {
    let gateway = PaymobGateway::new("http://unused.test").unwrap();
    let payment = pending_payment().await;
    let callback = signed_webhook(transaction(3000, true), &signing_string(3000, true));

    let outcome = gateway.verify(&credentials(), &callback, &payment).await.unwrap();
    assert_eq!(
        outcome,
        PaymentOutcome::Succeeded {
            transaction_id: Some("77".to_string())
        }
    );
}

#[tokio::test]
async fn signed_failure_carries_gateway_message() {
    let gateway = PaymobGateway::new("http://unused.test").unwrap();
    let payment = pending_payment().await;
    let callback = signed_webhook(transaction(3000, false), &signing_string(3000, false));

    let outcome = gateway.verify(&credentials(), &callback, &payment).await.unwrap();
    assert!(matches!(
        outcome,
        PaymentOutcome::Failed { ref reason, .. } if reason == "Do not honour"
    ));
}

#[tokio::test]
async fn tampered_amount_fails_signature_check() {
    let gateway = PaymobGateway::new("http://unused.test").unwrap();
    let payment = pending_payment().await;
    // Signed for 3000, delivered claiming 100.
    let callback = signed_webhook(transaction(100, true), &signing_string(3000, true));

    let err = gateway.verify(&credentials(), &callback, &payment).await.unwrap_err();
    assert!(matches!(err, EngineError::WebhookSignature(_)), "got {err:?}");
}

#[tokio::test]
async fn authentic_but_short_payment_is_a_conflict() {
    let gateway = PaymobGateway::new("http://unused.test").unwrap();
    let payment = pending_payment().await;
    let callback = signed_webhook(transaction(2900, true), &signing_string(2900, true));

    let err = gateway.verify(&credentials(), &callback, &payment).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn missing_hmac_is_rejected() {
    let gateway = PaymobGateway::new("http://unused.test").unwrap();
    let payment = pending_payment().await;
    let body = json!({ "type": "TRANSACTION", "obj": transaction(3000, true) }).to_string();
    let callback = GatewayCallback::webhook(body, None);

    let err = gateway.verify(&credentials(), &callback, &payment).await.unwrap_err();
    assert!(matches!(err, EngineError::WebhookSignature(_)), "got {err:?}");
}

#[tokio::test]
async fn redirect_query_is_verified_like_a_webhook() {
    let gateway = PaymobGateway::new("http://unused.test").unwrap();
    let payment = pending_payment().await;

    let mut query: std::collections::BTreeMap<String, String> = [
        ("amount_cents", "3000"),
        ("created_at", "2024-01-01T00:00:00"),
        ("currency", "AED"),
        ("error_occured", "false"),
        ("has_parent_transaction", "false"),
        ("id", "77"),
        ("integration_id", "4242"),
        ("is_3d_secure", "true"),
        ("is_auth", "false"),
        ("is_capture", "false"),
        ("is_refunded", "false"),
        ("is_standalone_payment", "true"),
        ("is_voided", "false"),
        ("order", "9"),
        ("owner", "1"),
        ("pending", "false"),
        ("source_data.pan", "2346"),
        ("source_data.sub_type", "MasterCard"),
        ("source_data.type", "card"),
        ("success", "true"),
        ("merchant_order_id", "order-ref-1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    query.insert(
        "hmac".to_string(),
        sign_hmac(HMAC_SECRET, &signing_string(3000, true)).unwrap(),
    );

    let callback = GatewayCallback::redirect(query);
    let outcome = gateway.verify(&credentials(), &callback, &payment).await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::Succeeded { .. }));
}
