use {
    super::api_errors::ApiError,
    crate::{
        AppState,
        domain::{
            error::EngineError,
            gateway::GatewayCallback,
            payment::{GatewayKind, ReconcileResult},
        },
    },
    axum::{
        Json,
        extract::{Query, State},
        http::HeaderMap,
    },
    serde_json::{Value, json},
    std::collections::BTreeMap,
    tracing::field::{Empty, display},
};

const HANDLED_EVENTS: [&str; 3] = [
    "checkout.session.completed",
    "checkout.session.expired",
    "payment_intent.payment_failed",
];

/// Browser return from Stripe Checkout.
pub async fn success_handler(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .engine
        .handle_callback(GatewayKind::Stripe, GatewayCallback::redirect(query))
        .await?;
    Ok(Json(reconcile_body(&result)))
}

#[tracing::instrument(
    name = "stripe_webhook",
    skip_all,
    fields(event_type = Empty, object_id = Empty)
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let sig = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| EngineError::WebhookSignature("missing Stripe-Signature header".into()))?
        .to_string();

    let peek: Value = serde_json::from_str(&body).map_err(EngineError::from)?;
    let event_type = peek["type"].as_str().unwrap_or("unknown").to_string();
    tracing::Span::current()
        .record("event_type", display(&event_type))
        .record("object_id", display(peek["data"]["object"]["id"].as_str().unwrap_or("")));

    if !HANDLED_EVENTS.contains(&event_type.as_str()) {
        tracing::info!("unhandled stripe event acknowledged");
        return Ok(Json(json!({ "received": true, "status": "ignored" })));
    }

    acknowledge(
        state
            .engine
            .handle_callback(GatewayKind::Stripe, GatewayCallback::webhook(body, Some(sig)))
            .await,
    )
}

/// Webhooks for payments we never created are acknowledged so the gateway
/// stops retrying them.
pub(super) fn acknowledge(
    result: Result<ReconcileResult, EngineError>,
) -> Result<Json<Value>, ApiError> {
    match result {
        Ok(result) => {
            let mut body = reconcile_body(&result);
            body["received"] = json!(true);
            Ok(Json(body))
        }
        Err(EngineError::NotFound(msg)) => {
            tracing::warn!("webhook for unknown payment: {msg}");
            Ok(Json(json!({ "received": true, "status": "unknown_payment" })))
        }
        Err(e) => Err(e.into()),
    }
}

pub(super) fn reconcile_body(result: &ReconcileResult) -> Value {
    match result {
        ReconcileResult::Materialized(order) => json!({
            "status": result.as_str(),
            "message": "Payment successful and order created",
            "order": order,
        }),
        ReconcileResult::AlreadyReconciled(order) => json!({
            "status": result.as_str(),
            "message": "Payment successful and order already created",
            "order": order,
        }),
        ReconcileResult::Declined { payment_id, reason } => json!({
            "status": result.as_str(),
            "message": "Payment declined",
            "paymentId": payment_id,
            "reason": reason,
        }),
        ReconcileResult::Pending(payment_id) => json!({
            "status": result.as_str(),
            "message": "Payment is still processing",
            "paymentId": payment_id,
        }),
    }
}
