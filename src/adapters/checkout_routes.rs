use {
    super::{api_errors::ApiError, extract::MaybeGuest},
    crate::{
        AppState,
        domain::{cart::GuestCart, id::RestaurantId, order::PaymentOption},
        services::checkout::{CheckoutOutcome, CheckoutRequest, SessionStatus},
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    },
    serde::Deserialize,
    serde_json::{Value, json},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub restaurant_id: RestaurantId,
    #[serde(default)]
    pub guest_id: Option<String>,
    pub payment_option: PaymentOption,
    pub cart: GuestCart,
}

pub async fn checkout(
    State(state): State<AppState>,
    MaybeGuest(header_guest): MaybeGuest,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let outcome = state
        .engine
        .start_checkout(CheckoutRequest {
            restaurant_id: body.restaurant_id,
            guest_id: body.guest_id.or(header_guest),
            payment_option: body.payment_option,
            cart: body.cart,
        })
        .await?;

    let response = match outcome {
        CheckoutOutcome::Redirect {
            guest_id,
            payment_id,
            gateway,
            session_id,
            redirect_url,
        } => json!({
            "requiresApproval": false,
            "guestId": guest_id,
            "paymentId": payment_id,
            "gateway": gateway,
            "sessionId": session_id,
            "paymentUrl": redirect_url,
        }),
        CheckoutOutcome::RequiresApproval(request) => json!({
            "requiresApproval": true,
            "guestId": request.cart.guest_id,
            "message": "Order request sent to the restaurant for approval",
            "request": request,
        }),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(state.engine.session_status(&session_id).await?))
}
