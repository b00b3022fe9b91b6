use {
    super::{
        api_errors::ApiError,
        extract::{Admin, Caller, Guest},
    },
    crate::{
        AppState,
        domain::{
            id::{OrderId, RefundId},
            refund::{BankDetails, CommunicationKind, Refund, RefundMethod},
        },
        services::refund_flow::NewRefundRequest,
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    },
    rust_decimal::Decimal,
    serde::Deserialize,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequestBody {
    pub order_id: OrderId,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: String,
}

pub async fn request_refund(
    State(state): State<AppState>,
    Guest(guest_id): Guest,
    Json(body): Json<RefundRequestBody>,
) -> Result<(StatusCode, Json<Refund>), ApiError> {
    let refund = state
        .engine
        .request_refund(
            &guest_id,
            NewRefundRequest {
                order_id: body.order_id,
                amount: body.amount,
                reason: body.reason,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRefundBody {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn create_for_order(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Path(order_id): Path<OrderId>,
    Json(body): Json<AdminRefundBody>,
) -> Result<(StatusCode, Json<Refund>), ApiError> {
    let refund = state
        .engine
        .admin_create_refund(
            &actor,
            NewRefundRequest {
                order_id,
                amount: body.amount,
                reason: body.reason,
            },
            body.admin_notes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn get_refund(
    State(state): State<AppState>,
    caller: Caller,
    Path(refund_id): Path<RefundId>,
) -> Result<Json<Refund>, ApiError> {
    Ok(Json(
        state
            .engine
            .refund_for(&caller.refund_actor(), refund_id)
            .await?,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBody {
    pub method: RefundMethod,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn process_refund(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Path(refund_id): Path<RefundId>,
    Json(body): Json<ProcessBody>,
) -> Result<Json<Refund>, ApiError> {
    Ok(Json(
        state
            .engine
            .process_refund(&actor, refund_id, body.method, body.admin_notes)
            .await?,
    ))
}

pub async fn initiate_refund(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Path(refund_id): Path<RefundId>,
) -> Result<Json<Refund>, ApiError> {
    Ok(Json(
        state
            .engine
            .initiate_refund_payment(&actor, refund_id)
            .await?,
    ))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotesBody {
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn complete_refund(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Path(refund_id): Path<RefundId>,
    Json(body): Json<NotesBody>,
) -> Result<Json<Refund>, ApiError> {
    Ok(Json(
        state
            .engine
            .complete_refund(&actor, refund_id, body.admin_notes)
            .await?,
    ))
}

#[derive(Deserialize, Default)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn cancel_refund(
    State(state): State<AppState>,
    caller: Caller,
    Path(refund_id): Path<RefundId>,
    Json(body): Json<CancelBody>,
) -> Result<Json<Refund>, ApiError> {
    Ok(Json(
        state
            .engine
            .cancel_refund(&caller.refund_actor(), refund_id, body.reason.as_deref())
            .await?,
    ))
}

pub async fn add_bank_details(
    State(state): State<AppState>,
    Guest(guest_id): Guest,
    Path(refund_id): Path<RefundId>,
    Json(details): Json<BankDetails>,
) -> Result<Json<Refund>, ApiError> {
    Ok(Json(
        state
            .engine
            .add_bank_details(&guest_id, refund_id, details)
            .await?,
    ))
}

pub async fn delete_refund(
    State(state): State<AppState>,
    caller: Caller,
    Path(refund_id): Path<RefundId>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .delete_refund(&caller.refund_actor(), refund_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct CommunicationBody {
    pub kind: CommunicationKind,
    pub message: String,
}

pub async fn add_communication(
    State(state): State<AppState>,
    Admin(actor): Admin,
    Path(refund_id): Path<RefundId>,
    Json(body): Json<CommunicationBody>,
) -> Result<Json<Refund>, ApiError> {
    Ok(Json(
        state
            .engine
            .add_communication(&actor, refund_id, body.kind, &body.message)
            .await?,
    ))
}
