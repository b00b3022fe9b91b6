use {
    super::{checkout_routes, events, order_routes, paymob_webhook, refund_routes, stripe_webhook},
    crate::AppState,
    axum::{
        Router,
        extract::DefaultBodyLimit,
        http::StatusCode,
        routing::{get, patch, post, put},
    },
    std::time::Duration,
    tower::ServiceBuilder,
    tower_http::{timeout::TimeoutLayer, trace::TraceLayer},
};

/// Gateway events and carts are small.
pub const BODY_LIMIT: usize = 256 * 1024;

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    // SSE streams are long-lived and stay outside the timeout.
    let events = Router::new()
        .route("/events/restaurants/{id}", get(events::restaurant_events))
        .route("/events/guests/{id}", get(events::guest_events));

    let api = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/checkout", post(checkout_routes::checkout))
        .route(
            "/payments/sessions/{session_id}",
            get(checkout_routes::session_status),
        )
        .route("/payments/stripe/success", get(stripe_webhook::success_handler))
        .route("/payments/stripe/webhook", post(stripe_webhook::webhook_handler))
        .route("/payments/paymob/redirect", get(paymob_webhook::redirect_handler))
        .route("/payments/paymob/webhook", post(paymob_webhook::webhook_handler))
        .route("/orders/request", post(order_routes::request_order))
        .route("/orders/accept", post(order_routes::accept_order))
        .route("/orders/decline", post(order_routes::decline_order))
        .route(
            "/orders",
            get(order_routes::list_orders).delete(order_routes::delete_orders),
        )
        .route("/orders/{id}", get(order_routes::get_order))
        .route("/orders/{id}/cancel", post(order_routes::cancel_order))
        .route("/orders/{id}/status", patch(order_routes::change_status))
        .route("/orders/{id}/refunds", post(refund_routes::create_for_order))
        .route("/guests/{guest_id}/orders", get(order_routes::guest_orders))
        .route("/refunds", post(refund_routes::request_refund))
        .route(
            "/refunds/{id}",
            get(refund_routes::get_refund).delete(refund_routes::delete_refund),
        )
        .route("/refunds/{id}/process", post(refund_routes::process_refund))
        .route("/refunds/{id}/initiate", post(refund_routes::initiate_refund))
        .route("/refunds/{id}/complete", post(refund_routes::complete_refund))
        .route("/refunds/{id}/cancel", post(refund_routes::cancel_refund))
        .route("/refunds/{id}/bank-details", put(refund_routes::add_bank_details))
        .route(
            "/refunds/{id}/communications",
            post(refund_routes::add_communication),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ));

    api.merge(events)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(BODY_LIMIT)),
        )
        .with_state(state)
}
