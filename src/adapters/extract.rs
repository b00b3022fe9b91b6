//! Caller identity as asserted by the fronting auth layer.

use {
    super::api_errors::ApiError,
    crate::domain::{
        actor::{AdminActor, RefundActor},
        error::EngineError,
        id::{GuestId, RestaurantId},
    },
    axum::{extract::FromRequestParts, http::request::Parts},
};

pub const RESTAURANT_HEADER: &str = "x-restaurant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const GUEST_HEADER: &str = "x-guest-id";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Restaurant staff.
pub struct Admin(pub AdminActor);

impl<S: Send + Sync> FromRequestParts<S> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let restaurant_id: RestaurantId = header(parts, RESTAURANT_HEADER)
            .ok_or_else(|| EngineError::Authorization(format!("{RESTAURANT_HEADER} header is required")))?
            .parse()?;
        let user_id = header(parts, USER_HEADER)
            .ok_or_else(|| EngineError::Authorization(format!("{USER_HEADER} header is required")))?
            .to_string();

        Ok(Self(AdminActor {
            user_id,
            restaurant_id,
        }))
    }
}

/// Guest session.
pub struct Guest(pub GuestId);

impl<S: Send + Sync> FromRequestParts<S> for Guest {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header(parts, GUEST_HEADER)
            .ok_or_else(|| EngineError::Authorization(format!("{GUEST_HEADER} header is required")))?;
        Ok(Self(GuestId::new(raw)?))
    }
}

/// Guest header if present. Never rejects.
pub struct MaybeGuest(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeGuest {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(header(parts, GUEST_HEADER).map(str::to_string)))
    }
}

/// Either side of an order or refund: admin headers win when present.
pub enum Caller {
    Admin(AdminActor),
    Guest(GuestId),
}

impl Caller {
    pub fn refund_actor(&self) -> RefundActor {
        match self {
            Self::Admin(admin) => RefundActor::Admin(admin.clone()),
            Self::Guest(guest) => RefundActor::from(guest),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if header(parts, RESTAURANT_HEADER).is_some() {
            let Admin(admin) = Admin::from_request_parts(parts, state).await?;
            return Ok(Self::Admin(admin));
        }
        let Guest(guest) = Guest::from_request_parts(parts, state).await?;
        Ok(Self::Guest(guest))
    }
}
