use {
    super::{
        api_errors::ApiError,
        extract::{Admin, Caller, Guest, MaybeGuest},
    },
    crate::{
        AppState,
        domain::{
            cart::GuestCart,
            error::EngineError,
            id::{GuestId, OrderId, RestaurantId},
            order::{Order, OrderRequest, OrderStatus, PaymentOption},
        },
    },
    axum::{
        Json,
        extract::{Path, Query, State},
        http::StatusCode,
    },
    serde::Deserialize,
    serde_json::{Value, json},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOrderBody {
    pub restaurant_id: RestaurantId,
    #[serde(default)]
    pub guest_id: Option<String>,
    pub payment_option: PaymentOption,
    pub cart: GuestCart,
}

pub async fn request_order(
    State(state): State<AppState>,
    MaybeGuest(header_guest): MaybeGuest,
    Json(body): Json<RequestOrderBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let guest_id = body.guest_id.or(header_guest);
    let request = state
        .engine
        .request_order(
            body.restaurant_id,
            guest_id.as_deref(),
            body.payment_option,
            body.cart,
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "requiresApproval": true,
            "guestId": request.cart.guest_id,
            "request": request,
        })),
    ))
}

pub async fn accept_order(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.engine.accept_order(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Deserialize)]
pub struct DeclineBody {
    pub request: OrderRequest,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn decline_order(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Json(body): Json<DeclineBody>,
) -> Result<Json<Value>, ApiError> {
    let request_id = body.request.request_id;
    state
        .engine
        .decline_order(&actor, body.request, body.reason.as_deref())
        .await?;
    Ok(Json(json!({ "declined": true, "requestId": request_id })))
}

#[derive(Deserialize, Default)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Guest(guest_id): Guest,
    Path(order_id): Path<OrderId>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .engine
        .cancel_order(&guest_id, order_id, body.reason.as_deref())
        .await?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn change_status(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Path(order_id): Path<OrderId>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .engine
        .change_order_status(&actor, order_id, body.status, body.reason.as_deref())
        .await?;
    Ok(Json(order))
}

pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    let order = match caller {
        Caller::Admin(actor) => state.engine.order_for_admin(&actor, order_id).await?,
        Caller::Guest(guest_id) => state.engine.order_for_guest(&guest_id, order_id).await?,
    };
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.engine.restaurant_orders(&actor, query.status).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBody {
    pub order_ids: Vec<OrderId>,
}

pub async fn delete_orders(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Json(body): Json<DeleteBody>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.engine.delete_orders(&actor, &body.order_ids).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestOrdersQuery {
    pub restaurant_id: RestaurantId,
}

pub async fn guest_orders(
    State(state): State<AppState>,
    Guest(caller): Guest,
    Path(guest_id): Path<GuestId>,
    Query(query): Query<GuestOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    if caller != guest_id {
        return Err(EngineError::Authorization("cannot read another guest's orders".into()).into());
    }
    Ok(Json(
        state
            .engine
            .guest_orders(query.restaurant_id, &guest_id)
            .await?,
    ))
}
