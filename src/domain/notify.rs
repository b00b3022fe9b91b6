//! Notification port.
//!
//! The engine publishes lifecycle events to restaurant- and guest-scoped
//! channels through a [`NotificationPort`]. The port may be created before
//! its transport exists; until a sink is installed every publish is dropped
//! with a warning. Delivery is fire-and-forget and unordered relative to
//! persistence, so subscribers treat events as hints and re-fetch state.

use {
    super::id::{GuestId, RestaurantId},
    serde::Serialize,
    std::{
        fmt,
        sync::{Arc, OnceLock},
    },
};

pub const RESTAURANT_ORDER_NOTIFICATION: &str = "restaurant-order-notification";
pub const CUSTOMER_ORDER_NOTIFICATION: &str = "customer-order-notification";
pub const ORDER_REQUEST_RESOLVED: &str = "order_request_resolved";
pub const ORDER_CANCELLED: &str = "order_cancelled";
pub const ORDER_STATUS_CHANGED: &str = "order_status_changed";
pub const REFUND_STATUS_CHANGED: &str = "refund_status_changed";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum Channel {
    Restaurant(RestaurantId),
    Guest(GuestId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restaurant(id) => write!(f, "restaurant_{id}"),
            Self::Guest(id) => write!(f, "guest_{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub channel: Channel,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Transport behind the port (broadcast hub, socket server, test recorder).
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}

#[derive(Clone, Default)]
pub struct NotificationPort {
    sink: Arc<OnceLock<Arc<dyn NotificationSink>>>,
}

impl NotificationPort {
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        let port = Self::default();
        port.install(sink);
        port
    }

    /// Installs the transport. Returns false if one was already installed.
    pub fn install(&self, sink: Arc<dyn NotificationSink>) -> bool {
        self.sink.set(sink).is_ok()
    }

    pub fn is_initialized(&self) -> bool {
        self.sink.get().is_some()
    }

    pub fn emit_order_notification(&self, restaurant_id: RestaurantId, payload: serde_json::Value) {
        self.emit_to_restaurant(restaurant_id, RESTAURANT_ORDER_NOTIFICATION, payload);
    }

    pub fn emit_to_restaurant(
        &self,
        restaurant_id: RestaurantId,
        event: &str,
        payload: serde_json::Value,
    ) {
        self.publish(Channel::Restaurant(restaurant_id), event, payload);
    }

    pub fn emit_customer_notification(&self, guest_id: &GuestId, payload: serde_json::Value) {
        self.emit_to_guest(guest_id, CUSTOMER_ORDER_NOTIFICATION, payload);
    }

    pub fn emit_to_guest(&self, guest_id: &GuestId, event: &str, payload: serde_json::Value) {
        self.publish(Channel::Guest(guest_id.clone()), event, payload);
    }

    fn publish(&self, channel: Channel, event: &str, payload: serde_json::Value) {
        match self.sink.get() {
            Some(sink) => sink.publish(Notification {
                channel,
                event: event.to_string(),
                payload,
            }),
            None => {
                tracing::warn!(%channel, event, "notification port not initialized, dropping event");
            }
        }
    }
}
