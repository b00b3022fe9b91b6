use {
    super::error::EngineError,
    super::id::{CustomerId, GuestId, RestaurantId},
};

/// Restaurant staff member, as asserted by the fronting auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminActor {
    pub user_id: String,
    pub restaurant_id: RestaurantId,
}

impl AdminActor {
    pub fn ensure_owns(&self, restaurant_id: RestaurantId) -> Result<(), EngineError> {
        if self.restaurant_id != restaurant_id {
            return Err(EngineError::Authorization(
                "RestaurantId mismatch: you do not own this restaurant".to_string(),
            ));
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        format!("admin:{}", self.user_id)
    }
}

/// Who may cancel or delete a refund.
#[derive(Debug, Clone)]
pub enum RefundActor {
    Admin(AdminActor),
    Customer(CustomerId),
}

impl RefundActor {
    pub fn label(&self) -> String {
        match self {
            Self::Admin(admin) => admin.label(),
            Self::Customer(customer) => format!("customer:{customer}"),
        }
    }
}

impl From<&GuestId> for RefundActor {
    fn from(guest: &GuestId) -> Self {
        Self::Customer(CustomerId::from(guest))
    }
}
