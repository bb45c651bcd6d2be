//! questline-engine — LMS gamification engine
//!
//! Receives activity events from the learning platform, advances quest
//! progress and the XP ledger, and streams reward notifications to
//! connected learners.

use anyhow::Result;
use clap::Parser;
use questline_common::config::{self, EngineTuning};
use questline_common::db;
use tracing::info;

use questline_engine::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "questline-engine", about = "LMS gamification engine")]
struct Args {
    /// Root data folder (overrides QUESTLINE_ROOT and the config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Listen port
    #[arg(long, env = "QUESTLINE_PORT", default_value_t = 5860)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting Questline engine v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), "QUESTLINE_ROOT")?;
    std::fs::create_dir_all(&root_folder)?;

    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = db::connect(&db_path).await?;
    db::run_migrations(&pool).await?;
    info!("✓ Database ready");

    let state = AppState::new(pool, EngineTuning::default());
    let hub = state.hub.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("questline-engine listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received; closing notification channels");
            hub.shutdown();
        })
        .await?;

    Ok(())
}
