use {
    crate::domain::notify::{Channel, Notification, NotificationSink},
    tokio::sync::broadcast,
    tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream},
};

/// In-process fan-out of notifications to SSE subscribers.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Events for one channel. Slow subscribers skip what they missed.
    pub fn subscribe(
        &self,
        channel: Channel,
    ) -> impl Stream<Item = Notification> + Send + use<> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| match item {
            Ok(notification) if notification.channel == channel => Some(notification),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%channel, error = %e, "subscriber lagged, events dropped");
                None
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for BroadcastHub {
    fn publish(&self, notification: Notification) {
        // No subscribers is not an error.
        if self.sender.send(notification).is_err() {
            tracing::debug!("no notification subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::domain::id::{GuestId, RestaurantId},
        serde_json::json,
    };

    #[tokio::test]
    async fn delivers_only_matching_channel() {
        let hub = BroadcastHub::new(16);
        let restaurant = RestaurantId::generate();
        let stream = hub.subscribe(Channel::Restaurant(restaurant));
        tokio::pin!(stream);

        hub.publish(Notification {
            channel: Channel::Guest(GuestId::generate()),
            event: "ignored".into(),
            payload: json!({}),
        });
        hub.publish(Notification {
            channel: Channel::Restaurant(restaurant),
            event: "order_cancelled".into(),
            payload: json!({ "orderNo": "O1" }),
        });

        let received = stream.next().await.unwrap();
        assert_eq!(received.event, "order_cancelled");
        assert_eq!(received.payload["orderNo"], "O1");
    }

    #[tokio::test]
    async fn stream_outlives_the_hub_borrow() {
        let hub = std::sync::Arc::new(BroadcastHub::new(16));
        let restaurant = RestaurantId::generate();
        let stream = {
            let borrowed = hub.clone();
            borrowed.subscribe(Channel::Restaurant(restaurant))
        };
        let reader = tokio::spawn(async move {
            tokio::pin!(stream);
            stream.next().await.map(|n| n.event)
        });

        while hub.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        hub.publish(Notification {
            channel: Channel::Restaurant(restaurant),
            event: "order_status_changed".into(),
            payload: json!({}),
        });
        assert_eq!(reader.await.unwrap().as_deref(), Some("order_status_changed"));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let hub = BroadcastHub::new(4);
        hub.publish(Notification {
            channel: Channel::Restaurant(RestaurantId::generate()),
            event: "x".into(),
            payload: json!(null),
        });
        assert_eq!(hub.subscriber_count(), 0);
    }
}
