use {
    super::{
        api_errors::ApiError,
        stripe_webhook::{acknowledge, reconcile_body},
    },
    crate::{
        AppState,
        domain::{gateway::GatewayCallback, payment::GatewayKind},
    },
    axum::{
        Json,
        extract::{Query, State},
        http::HeaderMap,
    },
    serde_json::Value,
    std::collections::BTreeMap,
};

/// Browser return from Paymob's hosted checkout. The query carries the
/// signed transaction fields.
pub async fn redirect_handler(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .engine
        .handle_callback(GatewayKind::Paymob, GatewayCallback::redirect(query))
        .await?;
    Ok(Json(reconcile_body(&result)))
}

#[tracing::instrument(name = "paymob_webhook", skip_all)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let signature = ["hmac", "x-paymob-signature"]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(str::to_string)
        .or_else(|| query.get("hmac").cloned());

    acknowledge(
        state
            .engine
            .handle_callback(GatewayKind::Paymob, GatewayCallback::webhook(body, signature))
            .await,
    )
}
