//! Cutout Gateway
//!
//! Metered background-removal API using Rust + Actix-Web.
//! Anonymous visitors get a free allowance tracked in a cookie; signed-in
//! users spend credits from their package. Jobs run on an external
//! processing service and are polled to completion.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

mod api;
mod config;
mod db;
mod domain;
mod providers;
mod session;
mod store;

use crate::api::middleware::IdentityMiddleware;
use crate::config::Settings;
use crate::db::{spawn_profile_listener, DbPool, PgPackageCatalog, PgProfileStore, SessionTokenRepository};
use crate::providers::{HttpJobService, JobService};
use crate::session::{IdentityResolver, PollPolicy, ProfileProvisioner, RemovalFlow};
use crate::store::{MemoryStore, PackageCatalog, ProfileStore, StoreMode, TokenVerifier};

/// Profile, catalog and token backends chosen at startup
pub struct Backends {
    pub profiles: Arc<dyn ProfileStore>,
    pub catalog: Arc<dyn PackageCatalog>,
    pub tokens: Arc<dyn TokenVerifier>,
    pub mode: StoreMode,
}

impl Backends {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            profiles: store.clone(),
            catalog: store.clone(),
            tokens: store,
            mode: StoreMode::Memory,
        }
    }

    pub fn postgres(pool: DbPool, profiles: PgProfileStore) -> Self {
        Self {
            profiles: Arc::new(profiles),
            catalog: Arc::new(PgPackageCatalog::new(pool.clone())),
            tokens: Arc::new(SessionTokenRepository::new(pool)),
            mode: StoreMode::Postgres,
        }
    }
}

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub resolver: IdentityResolver,
    pub profiles: Arc<dyn ProfileStore>,
    pub catalog: Arc<dyn PackageCatalog>,
    pub provisioner: ProfileProvisioner,
    pub removals: RemovalFlow,
    pub store_mode: StoreMode,
    pub started_at: Instant,
    /// Cancelled on shutdown; in-flight polls stop and release their credits
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        settings: Settings,
        service: Arc<dyn JobService>,
        backends: Backends,
        shutdown: CancellationToken,
    ) -> Self {
        let policy = PollPolicy::from(&settings.polling);

        Self {
            resolver: IdentityResolver::new(backends.tokens),
            provisioner: ProfileProvisioner::new(backends.profiles.clone(), backends.catalog.clone()),
            removals: RemovalFlow::new(service, backends.profiles.clone(), policy),
            profiles: backends.profiles,
            catalog: backends.catalog,
            store_mode: backends.mode,
            started_at: Instant::now(),
            shutdown,
            settings,
        }
    }
}

/// Use PostgreSQL when configured and reachable, the in-memory store otherwise
async fn connect_backends(settings: &Settings, shutdown: &CancellationToken) -> Backends {
    if settings.database.url.is_empty() {
        info!("No database URL configured, running on the in-memory store");
        return Backends::memory(Arc::new(MemoryStore::with_default_catalog()));
    }

    let pool = match DbPool::new(&settings.database) {
        Ok(pool) => pool,
        Err(e) => {
            warn!("Failed to create database pool: {}. Running on the in-memory store.", e);
            return Backends::memory(Arc::new(MemoryStore::with_default_catalog()));
        }
    };

    if let Err(e) = pool.test_connection().await {
        warn!("Database connection test failed: {}. Running on the in-memory store.", e);
        return Backends::memory(Arc::new(MemoryStore::with_default_catalog()));
    }

    let profiles = PgProfileStore::new(pool.clone());
    spawn_profile_listener(settings.database.url.clone(), profiles.clone(), shutdown.clone());
    info!("Database pool initialized successfully");

    Backends::postgres(pool, profiles)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cutout_gateway=info".parse()?)
                .add_directive("actix_web=info".parse()?)
        )
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = settings.bind_addr();

    info!(
        "Starting Cutout Gateway v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    let shutdown = CancellationToken::new();

    let service: Arc<dyn JobService> = Arc::new(
        HttpJobService::new(&settings.processing).context("Failed to configure processing service client")?
    );
    let backends = connect_backends(&settings, &shutdown).await;
    info!(store = ?backends.mode, "Usage store ready");

    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);
    let app_state = web::Data::new(AppState::new(settings, service, backends, shutdown.clone()));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            // Resolves the caller for every API route
            .wrap(IdentityMiddleware::new(
                app_state.resolver.clone(),
                app_state.settings.quota.secure_cookies,
            ))
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "cutout-gateway"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION")))
            )
            .configure(api::configure_routes)
    })
    .workers(workers)
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
            handle.stop(true).await;
        }
    });

    server.await?;
    info!("Server stopped");
    Ok(())
}
