mod common;

use common::*;
use dine_sync::domain::cart::GuestCart;
use dine_sync::domain::error::EngineError;
use dine_sync::domain::id::{GuestId, ProductId};
use dine_sync::domain::order::{OrderType, PaymentOption};
use dine_sync::services::pricing::{PricingRequest, validate_cart};
use rust_decimal::Decimal;
use serde_json::json;

fn request(env: &TestEnv, option: PaymentOption, cart: GuestCart) -> PricingRequest {
    PricingRequest {
        restaurant_id: env.restaurant_id,
        guest_id: GuestId::new("guest-1").unwrap(),
        payment_option: option,
        cart,
    }
}

// ── Authoritative totals ───────────────────────────────────────────────────

#[tokio::test]
async fn product_plus_common_add_ons_sums_to_thirty() {
    let env = TestEnv::new();
    let cart = env.dine_in_cart(Decimal::from(30));

    let priced = validate_cart(&*env.store, request(&env, PaymentOption::PayNow, cart))
        .await
        .unwrap();

    assert_eq!(priced.total_amount, Decimal::from(30));
    assert_eq!(priced.line_items[0].item_total, Decimal::from(20));
    assert_eq!(priced.add_ons_line_items[0].item_total, Decimal::from(10));
    assert_eq!(priced.order_type, OrderType::DineIn);
    assert_eq!(priced.table.as_ref().unwrap().table_no, "7");
    assert!(!priced.skip_payment);
}

#[tokio::test]
async fn total_within_one_hundredth_is_accepted() {
    let env = TestEnv::new();
    let cart = env.dine_in_cart(Decimal::new(30005, 3));

    let priced = validate_cart(&*env.store, request(&env, PaymentOption::PayNow, cart))
        .await
        .unwrap();

    // The server's own total wins.
    assert_eq!(priced.total_amount, Decimal::from(30));
}

#[tokio::test]
async fn total_mismatch_is_rejected() {
    let env = TestEnv::new();
    let cart = env.dine_in_cart(Decimal::from(25));

    let err = validate_cart(&*env.store, request(&env, PaymentOption::PayNow, cart))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");
    assert!(err.to_string().contains("Calculated: 30"));
}

#[tokio::test]
async fn size_offer_price_and_product_add_on_are_priced_per_unit() {
    let env = TestEnv::new();
    // Large coffee at offer 10, ×2 = 20. Burger 20 + sauce 3 = 23. Total 43.
    let cart = cart(json!({
        "orderType": "Dine-In",
        "tableId": env.table_id,
        "lineItems": [
            { "productId": env.coffee_id, "quantity": 2, "selectedSize": { "name": "Large" } },
            { "productId": env.burger_id, "quantity": 1, "productAddons": [{ "name": SAUCE }] },
        ],
        "totalAmount": 43,
    }));

    let priced = validate_cart(&*env.store, request(&env, PaymentOption::PayLater, cart))
        .await
        .unwrap();

    assert_eq!(priced.line_items[0].base_price, Decimal::from(10));
    assert_eq!(priced.line_items[0].item_total, Decimal::from(20));
    assert_eq!(priced.line_items[1].item_subtotal, Decimal::from(23));
    assert_eq!(priced.total_amount, Decimal::from(43));
    assert!(priced.skip_payment);
}

#[tokio::test]
async fn client_priced_lines_are_re_summed() {
    let env = TestEnv::new();
    let cart = cart(json!({
        "orderType": "Dine-In",
        "tableId": env.table_id,
        "lineItems": [{
            "productId": env.burger_id,
            "quantity": 2,
            "basePrice": 20,
            "itemSubtotal": 20,
            "itemTotal": 40,
        }],
        "totalAmount": 40,
    }));

    let priced = validate_cart(&*env.store, request(&env, PaymentOption::PayLater, cart))
        .await
        .unwrap();
    assert_eq!(priced.total_amount, Decimal::from(40));
}

// ── Catalog and destination checks ─────────────────────────────────────────

#[tokio::test]
async fn unknown_product_is_not_found() {
    let env = TestEnv::new();
    let cart = cart(json!({
        "orderType": "Dine-In",
        "tableId": env.table_id,
        "lineItems": [{ "productId": ProductId::generate(), "quantity": 1 }],
        "totalAmount": 20,
    }));

    let err = validate_cart(&*env.store, request(&env, PaymentOption::PayLater, cart))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn unknown_size_is_rejected() {
    let env = TestEnv::new();
    let cart = cart(json!({
        "orderType": "Dine-In",
        "tableId": env.table_id,
        "lineItems": [{ "productId": env.coffee_id, "quantity": 1, "selectedSize": { "name": "Huge" } }],
        "totalAmount": 8,
    }));

    let err = validate_cart(&*env.store, request(&env, PaymentOption::PayLater, cart))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn dine_in_without_table_is_rejected() {
    let env = TestEnv::new();
    let cart = cart(json!({
        "orderType": "Dine-In",
        "lineItems": [{ "productId": env.burger_id, "quantity": 1 }],
        "totalAmount": 20,
    }));

    let err = validate_cart(&*env.store, request(&env, PaymentOption::PayLater, cart))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn cash_on_delivery_is_only_for_home_delivery() {
    let env = TestEnv::new();

    let dine_in = env.dine_in_cart(Decimal::from(30));
    let err = validate_cart(&*env.store, request(&env, PaymentOption::CashOnDelivery, dine_in))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");

    let delivery = env.delivery_cart(Decimal::from(30));
    let priced = validate_cart(&*env.store, request(&env, PaymentOption::CashOnDelivery, delivery))
        .await
        .unwrap();
    assert_eq!(priced.order_type, OrderType::HomeDelivery);
    assert_eq!(priced.delivery_address.unwrap().name, "Layla");
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let env = TestEnv::new();
    let cart = cart(json!({
        "orderType": "Dine-In",
        "tableId": env.table_id,
        "lineItems": [{ "productId": env.burger_id, "quantity": 0 }],
        "totalAmount": 0,
    }));

    let err = validate_cart(&*env.store, request(&env, PaymentOption::PayLater, cart))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let env = TestEnv::new();
    let cart = cart(json!({
        "orderType": "Dine-In",
        "tableId": env.table_id,
        "totalAmount": 0,
    }));

    let err = validate_cart(&*env.store, request(&env, PaymentOption::PayLater, cart))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
}
