use anyhow::{anyhow, Context, Result};
use ashva_core::{
    FallbackPriceOracle, InMemoryWalletStore, MembershipEngine, PriceOracle, StaticPriceOracle,
    WalletStore,
};
use ashva_server::{
    build_router, config::Environment, sweep, AppConfig, AppState, HttpPriceOracle, PgWalletStore,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ASHVA membership and rewards service
#[derive(Parser)]
#[clap(name = "ashva-server", version, about = "ASHVA membership and rewards service")]
struct Cli {
    /// Commands (defaults to `serve`)
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override the PORT environment variable
        #[clap(short, long)]
        port: Option<u16>,
    },

    /// Apply pending database migrations and exit
    Migrate,

    /// Activate nodes whose deployment window has elapsed and exit
    SweepNodes,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ashva_server=debug,ashva_core=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Commands::Migrate => {
            let pool = connect(&config).await?;
            migrate(&pool).await
        }
        Commands::SweepNodes => {
            let pool = Arc::new(connect(&config).await?);
            let engine = build_engine(&config, Arc::new(PgWalletStore::new(pool)))?;
            let activated = engine.sweep_deployments(Utc::now()).await?;
            info!("Sweep complete: {} nodes activated", activated);
            Ok(())
        }
    }
}

async fn connect(config: &AppConfig) -> Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to database")
}

async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run migrations")?;
    info!("Database migrations applied");
    Ok(())
}

fn build_oracle(config: &AppConfig) -> Result<Arc<dyn PriceOracle>> {
    let timeout = config.oracle_timeout();
    let oracle: Arc<dyn PriceOracle> = match &config.price_oracle_url {
        Some(url) => {
            info!("Using price oracle at {} ({})", url, config.price_oracle_pointer);
            let http = HttpPriceOracle::new(url.clone(), config.price_oracle_pointer.clone(), timeout)?;
            Arc::new(FallbackPriceOracle::new(http, config.price_usd, timeout))
        }
        None => {
            info!("Using static price ${}", config.price_usd);
            Arc::new(StaticPriceOracle::new(config.price_usd))
        }
    };
    Ok(oracle)
}

fn build_engine(config: &AppConfig, store: Arc<dyn WalletStore>) -> Result<MembershipEngine> {
    let oracle = build_oracle(config)?;
    Ok(MembershipEngine::new(store, oracle, config.engine_config())?)
}

async fn serve(config: AppConfig) -> Result<()> {
    let (store, pool): (Arc<dyn WalletStore>, Option<Arc<PgPool>>) = match &config.database_url {
        Some(_) => {
            let pool = Arc::new(connect(&config).await?);
            migrate(&pool).await?;
            let store: Arc<dyn WalletStore> = Arc::new(PgWalletStore::new(Arc::clone(&pool)));
            (store, Some(pool))
        }
        None if config.environment == Environment::Production => {
            return Err(anyhow!("DATABASE_URL must be set in production"));
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            let store: Arc<dyn WalletStore> = Arc::new(InMemoryWalletStore::new());
            (store, None)
        }
    };

    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, admin routes are disabled");
    }

    let engine = build_engine(&config, store)?;

    let sweeper = config
        .sweep_interval()
        .map(|interval| sweep::spawn_sweeper(engine.clone(), interval));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::new(engine, pool, config));
    let app = build_router(state);

    info!("ASHVA server running on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    Ok(())
}
