use {
    dine_sync::{
        AppState,
        adapters::{
            paymob_client::PaymobGateway, router::build_router, stripe_client::StripeGateway,
        },
        config::AppConfig,
        domain::{gateway::GatewayRegistry, notify::NotificationPort},
        infra::{crypto::CredentialCipher, notify_hub::BroadcastHub, postgres::PgStore},
        services::{Engine, expiry::run_payment_expiry},
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tracing_subscriber::EnvFilter,
};

const NOTIFICATION_BUFFER: usize = 1024;
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let store = Arc::new(PgStore::new(pool, config.default_currency));
    let cipher = CredentialCipher::new(&config.payment_encryption_key)
        .expect("invalid PAYMENT_ENCRYPTION_KEY");
    let gateways = GatewayRegistry::new()
        .with(Arc::new(StripeGateway::new()))
        .with(Arc::new(
            PaymobGateway::new(config.paymob_base_url.clone()).expect("failed to build Paymob client"),
        ));

    // Handlers emit through the port; the hub is the transport behind it.
    let notifier = NotificationPort::uninitialized();
    let hub = BroadcastHub::new(NOTIFICATION_BUFFER);
    notifier.install(Arc::new(hub.clone()));

    let engine = Engine::new(
        store.clone(),
        store,
        gateways,
        notifier,
        Arc::new(cipher),
        config.engine_settings(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let expiry = config.payment_expiry.and_then(|ttl| {
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        Some(tokio::spawn(run_payment_expiry(
            engine.clone(),
            ttl,
            EXPIRY_SWEEP_INTERVAL,
            shutdown_rx,
        )))
    });

    let app = build_router(AppState { engine, hub }, config.request_timeout);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = expiry {
        let _ = handle.await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
