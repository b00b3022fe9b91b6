pub mod checkout;
pub mod expiry;
pub mod order_flow;
pub mod pricing;
pub mod reconciliation;
pub mod refund_flow;

use {
    crate::{
        domain::{
            audit::NewAuditEntry,
            catalog::{Catalog, Restaurant},
            error::EngineError,
            gateway::{GatewayCredentials, GatewayRegistry, PaymobCredentials, StripeCredentials},
            id::{OrderId, RestaurantId},
            notify::NotificationPort,
            order::Order,
            payment::GatewayKind,
            store::Store,
        },
        infra::crypto::CredentialCipher,
    },
    std::sync::Arc,
};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Guest-facing web app; gateway success/cancel pages live under it.
    pub frontend_url: String,
    /// Public base of this service, used for gateway webhooks.
    pub public_api_url: String,
    pub duplicate_order_window: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3030".to_string(),
            public_api_url: "http://localhost:3000".to_string(),
            duplicate_order_window: chrono::Duration::minutes(10),
        }
    }
}

/// Order & payment reconciliation engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    catalog: Arc<dyn Catalog>,
    gateways: GatewayRegistry,
    notifier: NotificationPort,
    cipher: Arc<CredentialCipher>,
    settings: Arc<EngineSettings>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn Catalog>,
        gateways: GatewayRegistry,
        notifier: NotificationPort,
        cipher: Arc<CredentialCipher>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            gateways,
            notifier,
            cipher,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &dyn Store {
        &*self.store
    }

    pub fn notifier(&self) -> &NotificationPort {
        &self.notifier
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    async fn restaurant(&self, id: RestaurantId) -> Result<Restaurant, EngineError> {
        self.catalog
            .restaurant(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("restaurant {id} not found")))
    }

    async fn load_order(&self, id: OrderId) -> Result<Order, EngineError> {
        self.store
            .order(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("order {id} not found")))
    }

    /// Decrypts the restaurant's secrets for `kind` at call time.
    fn credentials(
        &self,
        restaurant: &Restaurant,
        kind: GatewayKind,
    ) -> Result<GatewayCredentials, EngineError> {
        let settings = &restaurant.payment_settings;
        let not_configured =
            || EngineError::Validation(format!("{kind} is not configured for this restaurant"));
        match kind {
            GatewayKind::Stripe => {
                let stripe = settings.stripe.as_ref().ok_or_else(not_configured)?;
                Ok(GatewayCredentials::Stripe(StripeCredentials {
                    secret_key: self.cipher.decrypt(&stripe.secret_key)?,
                    webhook_secret: self.cipher.decrypt(&stripe.webhook_secret)?,
                }))
            }
            GatewayKind::Paymob => {
                let paymob = settings.paymob.as_ref().ok_or_else(not_configured)?;
                Ok(GatewayCredentials::Paymob(PaymobCredentials {
                    api_key: self.cipher.decrypt(&paymob.api_key)?,
                    secret_key: self.cipher.decrypt(&paymob.secret_key)?,
                    public_key: self.cipher.decrypt(&paymob.public_key)?,
                    integration_id: self.cipher.decrypt(&paymob.integration_id)?,
                    hmac_secret: self.cipher.decrypt(&paymob.hmac_secret)?,
                }))
            }
        }
    }

    /// Audit writes happen after the state change they describe has
    /// committed, so a failure here is logged rather than surfaced.
    async fn audit(&self, entry: NewAuditEntry) {
        let entity = format!("{}:{}", entry.entity_type, entry.entity_id);
        if let Err(e) = self.store.record_audit(entry).await {
            tracing::error!(%entity, error = %e, "failed to write audit entry");
        }
    }
}
