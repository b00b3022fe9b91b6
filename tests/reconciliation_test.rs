mod common;

use common::*;
use dine_sync::domain::error::EngineError;
use dine_sync::domain::gateway::GatewayCallback;
use dine_sync::domain::id::GuestId;
use dine_sync::domain::notify::{Channel, CUSTOMER_ORDER_NOTIFICATION, RESTAURANT_ORDER_NOTIFICATION};
use dine_sync::domain::order::PaymentOption;
use dine_sync::domain::payment::{GatewayKind, PaymentOutcome, PaymentStatus, ReconcileResult};
use dine_sync::domain::store::PaymentStore;
use dine_sync::services::checkout::{CheckoutOutcome, CheckoutRequest};
use rust_decimal::Decimal;

async fn checkout(env: &TestEnv) -> (String, GuestId) {
    let outcome = env
        .engine
        .start_checkout(CheckoutRequest {
            restaurant_id: env.restaurant_id,
            guest_id: None,
            payment_option: PaymentOption::PayNow,
            cart: env.dine_in_cart(Decimal::from(30)),
        })
        .await
        .unwrap();
    match outcome {
        CheckoutOutcome::Redirect {
            session_id,
            guest_id,
            gateway,
            ..
        } => {
            assert_eq!(gateway, GatewayKind::Stripe);
            (session_id, guest_id)
        }
        other => panic!("expected redirect, got {other:?}"),
    }
}

// ── Checkout ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn checkout_persists_pending_payment_without_order() {
    let env = TestEnv::new();
    let (session_id, guest_id) = checkout(&env).await;

    let status = env.engine.session_status(&session_id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Pending);
    assert!(status.order.is_none());
    assert_eq!(env.store.order_count(), 0);

    let audit = env.store.audit_entries();
    assert!(audit.iter().any(|e| e.entity_type == "payment" && e.action == "created"));
    assert!(!guest_id.as_str().is_empty());
}

#[tokio::test]
async fn checkout_rejects_mismatched_total_before_calling_gateway() {
    let env = TestEnv::new();
    let err = env
        .engine
        .start_checkout(CheckoutRequest {
            restaurant_id: env.restaurant_id,
            guest_id: None,
            payment_option: PaymentOption::PayNow,
            cart: env.dine_in_cart(Decimal::from(31)),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
    assert_eq!(env.gateway.intent_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pay_later_checkout_needs_approval_and_persists_nothing() {
    let env = TestEnv::new();
    let outcome = env
        .engine
        .start_checkout(CheckoutRequest {
            restaurant_id: env.restaurant_id,
            guest_id: None,
            payment_option: PaymentOption::PayLater,
            cart: env.dine_in_cart(Decimal::from(30)),
        })
        .await
        .unwrap();

    let CheckoutOutcome::RequiresApproval(request) = outcome else {
        panic!("expected approval request");
    };
    assert!(request.cart.skip_payment);
    assert_eq!(env.store.order_count(), 0);
    assert_eq!(request.headline(), "New Order Request from Table 7");

    let restaurant = Channel::Restaurant(env.restaurant_id);
    let sent = env.sink.on_channel(&restaurant);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, RESTAURANT_ORDER_NOTIFICATION);
    assert_eq!(sent[0].payload["requiresApproval"], true);
}

// ── Redirect and webhook ───────────────────────────────────────────────────

#[tokio::test]
async fn redirect_success_materializes_order_o1() {
    let env = TestEnv::new();
    let (session_id, guest_id) = checkout(&env).await;

    let result = env
        .engine
        .handle_callback(GatewayKind::Stripe, redirect(&session_id))
        .await
        .unwrap();

    let ReconcileResult::Materialized(order) = result else {
        panic!("expected a new order, got {result:?}");
    };
    assert_eq!(order.order_no.as_str(), "O1");
    assert!(order.is_paid);
    assert_eq!(order.payment_status, Some(PaymentStatus::Paid));
    assert_eq!(order.total_amount, Decimal::from(30));
    assert_eq!(order.guest_id, guest_id);

    let payment = env.store.payment(order.payment_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(payment.order_id, Some(order.id));
    assert_eq!(payment.transaction_id.as_deref(), Some("pi_test"));

    // No approval is asked for a paid order.
    let to_restaurant = env.sink.named(RESTAURANT_ORDER_NOTIFICATION);
    assert_eq!(to_restaurant.len(), 1);
    assert_eq!(to_restaurant[0].payload["requiresApproval"], false);
    assert_eq!(env.sink.named(CUSTOMER_ORDER_NOTIFICATION).len(), 1);
}

#[tokio::test]
async fn repeated_callbacks_return_the_same_order() {
    let env = TestEnv::new();
    let (session_id, _) = checkout(&env).await;

    let first = env
        .engine
        .handle_callback(GatewayKind::Stripe, webhook(&session_id))
        .await
        .unwrap();
    let second = env
        .engine
        .handle_callback(GatewayKind::Stripe, redirect(&session_id))
        .await
        .unwrap();

    assert!(matches!(first, ReconcileResult::Materialized(_)));
    assert!(matches!(second, ReconcileResult::AlreadyReconciled(_)));
    assert_eq!(first.order().unwrap().id, second.order().unwrap().id);
    assert_eq!(env.store.order_count(), 1);
}

#[tokio::test]
async fn webhook_with_bad_signature_changes_nothing() {
    let env = TestEnv::new();
    let (session_id, _) = checkout(&env).await;

    let forged = GatewayCallback::webhook(session_id.clone(), Some("forged".to_string()));
    let err = env
        .engine
        .handle_callback(GatewayKind::Stripe, forged)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::WebhookSignature(_)), "got {err:?}");
    let status = env.engine.session_status(&session_id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Pending);
    assert_eq!(env.store.order_count(), 0);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let env = TestEnv::new();
    let err = env
        .engine
        .handle_callback(GatewayKind::Stripe, redirect("cs_missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn pending_verdict_leaves_payment_pending() {
    let env = TestEnv::new();
    let (session_id, _) = checkout(&env).await;
    env.gateway.script_outcome(PaymentOutcome::Pending);

    let result = env
        .engine
        .handle_callback(GatewayKind::Stripe, redirect(&session_id))
        .await
        .unwrap();

    assert!(matches!(result, ReconcileResult::Pending(_)));
    assert_eq!(env.store.order_count(), 0);
}

#[tokio::test]
async fn failed_verdict_marks_payment_failed_without_order() {
    let env = TestEnv::new();
    let (session_id, _) = checkout(&env).await;
    env.gateway.script_outcome(PaymentOutcome::Failed {
        transaction_id: Some("pi_declined".to_string()),
        reason: "card declined".to_string(),
    });

    let result = env
        .engine
        .handle_callback(GatewayKind::Stripe, webhook(&session_id))
        .await
        .unwrap();
    assert!(matches!(result, ReconcileResult::Declined { .. }));

    let status = env.engine.session_status(&session_id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Failed);
    assert_eq!(env.store.order_count(), 0);

    // The same failure delivered twice is not an error.
    let again = env
        .engine
        .handle_callback(GatewayKind::Stripe, webhook(&session_id))
        .await
        .unwrap();
    assert!(matches!(again, ReconcileResult::Declined { .. }));
}

#[tokio::test]
async fn success_after_failure_is_an_audited_anomaly() {
    let env = TestEnv::new();
    let (session_id, _) = checkout(&env).await;
    env.gateway.script_outcome(PaymentOutcome::Failed {
        transaction_id: None,
        reason: "expired".to_string(),
    });
    env.engine
        .handle_callback(GatewayKind::Stripe, webhook(&session_id))
        .await
        .unwrap();

    env.gateway.script_outcome(PaymentOutcome::Succeeded {
        transaction_id: Some("pi_late".to_string()),
    });
    let err = env
        .engine
        .handle_callback(GatewayKind::Stripe, redirect(&session_id))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
    assert_eq!(env.store.order_count(), 0);
    let status = env.engine.session_status(&session_id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Failed, "never auto-corrected");
    assert!(env.store.audit_entries().iter().any(|e| e.action == "anomaly"));
}

#[tokio::test]
async fn failure_after_success_is_rejected_and_order_kept() {
    let env = TestEnv::new();
    let (session_id, _) = checkout(&env).await;
    env.engine
        .handle_callback(GatewayKind::Stripe, redirect(&session_id))
        .await
        .unwrap();

    env.gateway.script_outcome(PaymentOutcome::Failed {
        transaction_id: None,
        reason: "late failure".to_string(),
    });
    let result = env
        .engine
        .handle_callback(GatewayKind::Stripe, webhook(&session_id))
        .await
        .unwrap();

    // Already linked to an order: the verdict is irrelevant.
    assert!(matches!(result, ReconcileResult::AlreadyReconciled(_)));
    let status = env.engine.session_status(&session_id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn order_numbers_increase_per_restaurant() {
    let env = TestEnv::new();
    let mut numbers = Vec::new();
    for _ in 0..3 {
        let (session_id, _) = checkout(&env).await;
        let result = env
            .engine
            .handle_callback(GatewayKind::Stripe, redirect(&session_id))
            .await
            .unwrap();
        numbers.push(result.order().unwrap().order_no.to_string());
    }
    assert_eq!(numbers, ["O1", "O2", "O3"]);
}

#[tokio::test]
async fn stale_pending_payments_expire() {
    let env = TestEnv::new();
    let (session_id, _) = checkout(&env).await;

    let expired = env
        .engine
        .expire_stale_payments(chrono::Duration::seconds(-1))
        .await
        .unwrap();

    assert_eq!(expired, 1);
    let status = env.engine.session_status(&session_id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Failed);
}
