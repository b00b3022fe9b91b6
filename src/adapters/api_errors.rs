use {
    crate::domain::error::EngineError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// HTTP face of [`EngineError`].
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Authorization(_) => StatusCode::FORBIDDEN,
            EngineError::Gateway(_) => StatusCode::BAD_GATEWAY,
            EngineError::WebhookSignature(_) => StatusCode::BAD_REQUEST,
            EngineError::Database(_) | EngineError::Serialization(_) | EngineError::Crypto(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match &self.0 {
            EngineError::Validation(msg) => ("validation_error", msg.clone()),
            EngineError::Conflict(msg) => ("conflict", msg.clone()),
            EngineError::NotFound(msg) => ("not_found", msg.clone()),
            EngineError::Authorization(msg) => ("forbidden", msg.clone()),
            EngineError::Gateway(msg) => {
                tracing::warn!("gateway error: {msg}");
                ("gateway_error", msg.clone())
            }
            EngineError::WebhookSignature(msg) => {
                tracing::warn!("webhook signature rejected: {msg}");
                ("webhook_error", "invalid webhook signature".to_string())
            }
            EngineError::Database(err) => {
                tracing::error!("database error: {err}");
                ("internal_error", "internal error".to_string())
            }
            EngineError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                ("internal_error", "internal error".to_string())
            }
            EngineError::Crypto(err) => {
                tracing::error!("crypto error: {err}");
                ("internal_error", "internal error".to_string())
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
