//! `emitraced` — the emitrace server binary.
//!
//! Usage:
//!   emitraced -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/emitrace/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use emitrace_core::Module;
use tracing::info;

use config::ServerConfig;

/// emitrace server.
#[derive(Parser, Debug)]
#[command(name = "emitraced", about = "emitrace server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides the configured value).
    #[arg(long = "listen")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load server configuration.
    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    let listen = cli.listen.unwrap_or(server_config.server.listen.clone());

    // Initialize storage.
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = emitrace_core::ServiceConfig {
        data_dir: Some(data_dir),
        listen: listen.clone(),
        ..Default::default()
    };

    let sql: Arc<dyn emitrace_sql::SqlStore> = Arc::new(
        emitrace_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    // Initialize modules.
    let iam_module = iam::IamModule::new(Arc::clone(&sql), iam::registry::Registry::builtin())?;
    info!("IAM module initialized");

    let module_routes = vec![(iam_module.name(), iam_module.routes())];

    // Build router and start server.
    let app = routes::build_router(module_routes);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("emitrace server listening on {}", listen);
    axum::serve(listener, app).await?;

    Ok(())
}
