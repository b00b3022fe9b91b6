mod common;

use common::*;
use dine_sync::domain::actor::AdminActor;
use dine_sync::domain::error::EngineError;
use dine_sync::domain::id::{GuestId, RestaurantId};
use dine_sync::domain::notify::{
    Channel, ORDER_CANCELLED, ORDER_REQUEST_RESOLVED, ORDER_STATUS_CHANGED,
};
use dine_sync::domain::order::{Order, OrderStatus, PaymentOption};
use dine_sync::domain::payment::GatewayKind;
use dine_sync::services::EngineSettings;
use dine_sync::services::checkout::{CheckoutOutcome, CheckoutRequest};
use rust_decimal::Decimal;

async fn accepted_order(env: &TestEnv, guest: Option<&str>) -> Order {
    let request = env
        .engine
        .request_order(
            env.restaurant_id,
            guest,
            PaymentOption::PayLater,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap();
    env.engine.accept_order(&env.admin(), request).await.unwrap()
}

/// Pays for a checkout and returns the paying guest.
async fn paid_guest(env: &TestEnv) -> GuestId {
    let CheckoutOutcome::Redirect {
        session_id,
        guest_id,
        ..
    } = env
        .engine
        .start_checkout(CheckoutRequest {
            restaurant_id: env.restaurant_id,
            guest_id: None,
            payment_option: PaymentOption::PayNow,
            cart: env.dine_in_cart(Decimal::from(30)),
        })
        .await
        .unwrap()
    else {
        panic!("expected redirect");
    };
    env.engine
        .handle_callback(GatewayKind::Stripe, redirect(&session_id))
        .await
        .unwrap();
    guest_id
}

async fn assert_not_approvable(env: &TestEnv, guest_id: &GuestId) {
    let request = env
        .engine
        .request_order(
            env.restaurant_id,
            Some(guest_id.as_str()),
            PaymentOption::PayLater,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap();
    assert_eq!(request.cart.guest_id, *guest_id);

    let err = env
        .engine
        .accept_order(&env.admin(), request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "accept: got {err:?}");

    let err = env
        .engine
        .decline_order(&env.admin(), request, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "decline: got {err:?}");

    assert_eq!(env.store.order_count(), 1, "only the paid order exists");
}

// ── Request / accept / decline ─────────────────────────────────────────────

#[tokio::test]
async fn accepted_request_becomes_unpaid_order() {
    let env = TestEnv::new();
    let order = accepted_order(&env, None).await;

    assert_eq!(order.order_no.as_str(), "O1");
    assert_eq!(order.status, OrderStatus::OrderReceived);
    assert!(!order.is_paid);
    assert_eq!(order.payment_option, Some(PaymentOption::PayLater));
    assert!(order.payment_id.is_none());

    let resolved = env.sink.named(ORDER_REQUEST_RESOLVED);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].payload["status"], "accepted");
    assert_eq!(
        env.sink.on_channel(&Channel::Guest(order.guest_id.clone())).len(),
        1,
        "guest told about acceptance"
    );
}

#[tokio::test]
async fn accepting_the_same_request_twice_returns_the_first_order() {
    let env = TestEnv::new();
    let request = env
        .engine
        .request_order(
            env.restaurant_id,
            None,
            PaymentOption::PayLater,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap();

    let first = env.engine.accept_order(&env.admin(), request.clone()).await.unwrap();
    let second = env.engine.accept_order(&env.admin(), request).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(env.store.order_count(), 1);
}

#[tokio::test]
async fn other_restaurant_cannot_accept() {
    let env = TestEnv::new();
    let request = env
        .engine
        .request_order(
            env.restaurant_id,
            None,
            PaymentOption::PayLater,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap();

    let stranger = AdminActor {
        user_id: "intruder".to_string(),
        restaurant_id: RestaurantId::generate(),
    };
    let err = env.engine.accept_order(&stranger, request).await.unwrap_err();
    assert!(matches!(err, EngineError::Authorization(_)), "got {err:?}");
    assert_eq!(env.store.order_count(), 0);
}

#[tokio::test]
async fn tampered_request_snapshot_is_rejected() {
    let env = TestEnv::new();
    let mut request = env
        .engine
        .request_order(
            env.restaurant_id,
            None,
            PaymentOption::PayLater,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap();
    request.cart.total_amount = Decimal::from(3);

    let err = env.engine.accept_order(&env.admin(), request).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn decline_persists_nothing_and_notifies_guest() {
    let env = TestEnv::new();
    let request = env
        .engine
        .request_order(
            env.restaurant_id,
            None,
            PaymentOption::PayLater,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap();
    let guest = Channel::Guest(request.cart.guest_id.clone());

    env.engine
        .decline_order(&env.admin(), request, Some("kitchen closed"))
        .await
        .unwrap();

    assert_eq!(env.store.order_count(), 0);
    let to_guest = env.sink.on_channel(&guest);
    assert_eq!(to_guest.len(), 1);
    assert_eq!(to_guest[0].payload["reason"], "kitchen closed");
    assert!(env.store.audit_entries().iter().any(|e| e.action == "declined"));
}

#[tokio::test]
async fn pay_now_cannot_use_the_request_flow() {
    let env = TestEnv::new();
    let err = env
        .engine
        .request_order(
            env.restaurant_id,
            None,
            PaymentOption::PayNow,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn guest_who_just_paid_cannot_request_again() {
    let env = TestEnv::new();
    let CheckoutOutcome::Redirect {
        session_id,
        guest_id,
        ..
    } = env
        .engine
        .start_checkout(CheckoutRequest {
            restaurant_id: env.restaurant_id,
            guest_id: None,
            payment_option: PaymentOption::PayNow,
            cart: env.dine_in_cart(Decimal::from(30)),
        })
        .await
        .unwrap()
    else {
        panic!("expected redirect");
    };
    env.engine
        .handle_callback(GatewayKind::Stripe, redirect(&session_id))
        .await
        .unwrap();

    let err = env
        .engine
        .request_order(
            env.restaurant_id,
            Some(guest_id.as_str()),
            PaymentOption::PayNow,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn paid_guest_cannot_be_accepted_or_declined() {
    let env = TestEnv::new();
    let guest_id = paid_guest(&env).await;
    assert_not_approvable(&env, &guest_id).await;
}

#[tokio::test]
async fn paid_guest_guard_has_no_time_limit() {
    let env = TestEnv::with_settings(EngineSettings {
        duplicate_order_window: chrono::Duration::milliseconds(1),
        ..EngineSettings::default()
    });
    let guest_id = paid_guest(&env).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // Outside the window the pay-now duplicate message no longer applies.
    let err = env
        .engine
        .request_order(
            env.restaurant_id,
            Some(guest_id.as_str()),
            PaymentOption::PayNow,
            env.dine_in_cart(Decimal::from(30)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");

    assert_not_approvable(&env, &guest_id).await;
}

// ── Guest identity ─────────────────────────────────────────────────────────

#[tokio::test]
async fn guest_id_is_kept_only_once_it_has_orders() {
    let env = TestEnv::new();

    let fresh = env
        .engine
        .resolve_guest_id(env.restaurant_id, Some("never-seen"))
        .await
        .unwrap();
    assert_ne!(fresh.as_str(), "never-seen");

    let order = accepted_order(&env, None).await;
    let kept = env
        .engine
        .resolve_guest_id(env.restaurant_id, Some(order.guest_id.as_str()))
        .await
        .unwrap();
    assert_eq!(kept, order.guest_id);

    let second = accepted_order(&env, Some(order.guest_id.as_str())).await;
    assert_eq!(second.guest_id, order.guest_id);
    let history = env
        .engine
        .guest_orders(env.restaurant_id, &order.guest_id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

// ── Status machine ─────────────────────────────────────────────────────────

#[tokio::test]
async fn dine_in_moves_forward_and_may_skip_steps() {
    let env = TestEnv::new();
    let order = accepted_order(&env, None).await;
    let admin = env.admin();

    let preparing = env
        .engine
        .change_order_status(&admin, order.id, OrderStatus::Preparing, None)
        .await
        .unwrap();
    assert_eq!(preparing.status, OrderStatus::Preparing);

    let served = env
        .engine
        .change_order_status(&admin, order.id, OrderStatus::Served, None)
        .await
        .unwrap();
    assert_eq!(served.status, OrderStatus::Served);

    let err = env
        .engine
        .change_order_status(&admin, order.id, OrderStatus::Preparing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");

    let changes = env.sink.named(ORDER_STATUS_CHANGED);
    assert_eq!(changes.len(), 2);
}

#[tokio::test]
async fn status_from_another_order_type_is_rejected() {
    let env = TestEnv::new();
    let order = accepted_order(&env, None).await;

    let err = env
        .engine
        .change_order_status(&env.admin(), order.id, OrderStatus::OutForDelivery, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn cancellation_requires_a_reason() {
    let env = TestEnv::new();
    let order = accepted_order(&env, None).await;

    let err = env
        .engine
        .change_order_status(&env.admin(), order.id, OrderStatus::Cancelled, Some("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");

    let cancelled = env
        .engine
        .change_order_status(&env.admin(), order.id, OrderStatus::Cancelled, Some("out of stock"))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("out of stock"));
    assert!(cancelled.cancelled_at.is_some());
}

#[tokio::test]
async fn guest_cancels_own_order_and_restaurant_is_told() {
    let env = TestEnv::new();
    let order = accepted_order(&env, None).await;

    let stranger = GuestId::new("someone-else").unwrap();
    let err = env
        .engine
        .cancel_order(&stranger, order.id, Some("changed my mind"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Authorization(_)), "got {err:?}");

    let cancelled = env
        .engine
        .cancel_order(&order.guest_id, order.id, Some("changed my mind"))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(env.sink.named(ORDER_CANCELLED).len(), 1);
}

// ── Reads and purge ────────────────────────────────────────────────────────

#[tokio::test]
async fn guest_cannot_read_another_guests_order() {
    let env = TestEnv::new();
    let order = accepted_order(&env, None).await;

    let own = env.engine.order_for_guest(&order.guest_id, order.id).await.unwrap();
    assert_eq!(own.id, order.id);

    let other = GuestId::new("someone-else").unwrap();
    let err = env.engine.order_for_guest(&other, order.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn restaurant_orders_filter_by_status_and_delete_is_scoped() {
    let env = TestEnv::new();
    let admin = env.admin();
    let a = accepted_order(&env, None).await;
    let b = accepted_order(&env, None).await;
    env.engine
        .change_order_status(&admin, b.id, OrderStatus::Preparing, None)
        .await
        .unwrap();

    let received = env
        .engine
        .restaurant_orders(&admin, Some(OrderStatus::OrderReceived))
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, a.id);

    let stranger = AdminActor {
        user_id: "intruder".to_string(),
        restaurant_id: RestaurantId::generate(),
    };
    assert_eq!(env.engine.delete_orders(&stranger, &[a.id, b.id]).await.unwrap(), 0);
    assert_eq!(env.engine.delete_orders(&admin, &[a.id, b.id]).await.unwrap(), 2);
    assert_eq!(env.store.order_count(), 0);

    let err = env.engine.delete_orders(&admin, &[]).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
}
