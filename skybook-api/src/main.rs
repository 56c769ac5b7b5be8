use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use skybook_api::{app, AppState};
use skybook_booking::{BookingOrchestrator, Stores};
use skybook_core::events::{BroadcastPublisher, EventPublisher};
use skybook_store::app_config::Config;
use skybook_store::{
    DbClient, PgBookingRepository, PgCustomerRepository, PgFlightRepository, PgReleaseBacklog, RedisClient,
    RedisEventPublisher,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skybook_api=debug,skybook_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Skybook API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = match &config.redis {
        Some(redis) => Some(RedisClient::new(&redis.url).context("Invalid Redis URL")?),
        None => None,
    };

    let mut flights = PgFlightRepository::new(db.pool.clone());
    if let Some(redis) = &redis {
        flights = flights.with_mirror(redis.clone());
    }

    let stores = Stores {
        customers: Arc::new(PgCustomerRepository::new(db.pool.clone())),
        flights: Arc::new(flights),
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        backlog: Arc::new(PgReleaseBacklog::new(db.pool.clone())),
    };

    let events: Arc<dyn EventPublisher> = match redis {
        Some(redis) => Arc::new(RedisEventPublisher::new(redis)),
        None => {
            tracing::warn!("No redis configured, booking events stay in-process");
            Arc::new(BroadcastPublisher::new(256))
        }
    };

    let orchestrator = BookingOrchestrator::new(stores, config.booking.clone()).with_events(events);

    tokio::spawn(orchestrator.reconciler().run(config.booking.reconcile_interval()));

    let app = app(AppState::new(orchestrator));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
