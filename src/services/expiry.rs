use {
    super::Engine,
    crate::domain::error::EngineError,
    chrono::Utc,
    serde_json::json,
    std::time::Duration,
    tokio::sync::watch,
};

impl Engine {
    /// Fails every payment still pending after `ttl`. Returns how many moved.
    pub async fn expire_stale_payments(&self, ttl: chrono::Duration) -> Result<usize, EngineError> {
        let cutoff = Utc::now() - ttl;
        let expired = self.store.expire_pending_payments(cutoff).await?;

        for payment_id in &expired {
            if let Some(payment) = self.store.payment(*payment_id).await? {
                self.audit(payment.audit_entry(
                    "expiry",
                    "expired",
                    json!({
                        "old_status": "pending",
                        "new_status": "failed",
                        "cutoff": cutoff,
                    }),
                ))
                .await;
            }
        }
        Ok(expired.len())
    }
}

pub async fn run_payment_expiry(
    engine: Engine,
    ttl: chrono::Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(ttl_secs = ttl.num_seconds(), interval_secs = interval.as_secs(), "payment expiry started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("payment expiry shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match engine.expire_stale_payments(ttl).await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "expired stale pending payments"),
            Err(e) => tracing::error!(error = %e, "payment expiry error"),
        }
    }
}
