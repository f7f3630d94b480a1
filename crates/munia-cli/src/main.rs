use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::Notify;

use munia_core::auth::StaticTokenProvider;
use munia_core::capture::replay_context;
use munia_core::config::{MuniaConfig, ReplayConfig, ReplayPacing};
use munia_core::playback::{abort_pair, HttpActionSource, ReplayController, ReplayState, TracingTarget};
use munia_core::query::retrieval::SessionPage;
use munia_core::query::ReplayEngine;
use munia_core::storage::duckdb::DuckDbStorage;
use munia_core::storage::ReplayStorage;

#[derive(Parser)]
#[command(name = "munia", about = "Replay capture and playback for Munia")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingest API (and the admin API unless disabled)
    Serve(ServeArgs),
    /// Print the session index from a running server
    Sessions(SessionsArgs),
    /// Replay a stored session against a logging target
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Path to the database file
    #[arg(long, default_value = "munia-replay.db", env = "MUNIA_DB_PATH")]
    db_path: PathBuf,

    /// PostgreSQL connection URL (enables PostgreSQL backend instead of DuckDB)
    #[arg(long, env = "MUNIA_POSTGRES_URL")]
    postgres_url: Option<String>,

    /// HTTP port
    #[arg(long, default_value = "8080", env = "MUNIA_REST_PORT")]
    rest_port: u16,

    /// Do not mount the admin retrieval API
    #[arg(long, env = "MUNIA_DISABLE_ADMIN")]
    disable_admin: bool,

    /// Bearer tokens as `token=user:role[,token=user:role...]`
    #[arg(long, env = "MUNIA_API_TOKENS", hide_env_values = true)]
    api_tokens: Option<String>,
}

impl From<ServeArgs> for MuniaConfig {
    fn from(args: ServeArgs) -> Self {
        MuniaConfig {
            db_path: args.db_path,
            postgres_url: args.postgres_url,
            rest_port: args.rest_port,
            admin_enabled: !args.disable_admin,
            api_tokens: args.api_tokens,
        }
    }
}

#[derive(Args)]
struct RemoteArgs {
    /// Base URL of a running `munia serve`
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "MUNIA_SERVER_URL")]
    server: String,

    /// Administrator bearer token
    #[arg(long, env = "MUNIA_ADMIN_TOKEN", hide_env_values = true)]
    token: String,
}

#[derive(Args)]
struct SessionsArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// Maximum number of sessions to print
    #[arg(long)]
    limit: Option<usize>,

    /// Number of newest sessions to skip
    #[arg(long)]
    offset: Option<usize>,
}

#[derive(Args)]
struct ReplayArgs {
    /// Session to replay
    session_id: String,

    #[command(flatten)]
    remote: RemoteArgs,

    /// Playback speed relative to the recording
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Longest wait between two actions, in milliseconds
    #[arg(long, default_value = "5000")]
    max_gap_ms: u64,

    /// Use a fixed delay between actions instead of recorded timing
    #[arg(long)]
    fixed_delay_ms: Option<u64>,

    /// Timeout for fetching the log, in seconds
    #[arg(long, default_value = "10", env = "MUNIA_FETCH_TIMEOUT")]
    fetch_timeout: u64,
}

impl ReplayArgs {
    fn replay_config(&self) -> ReplayConfig {
        let pacing = match self.fixed_delay_ms {
            Some(ms) => ReplayPacing::Fixed(Duration::from_millis(ms)),
            None => ReplayPacing::Recorded {
                speed: self.speed,
                max_gap: Duration::from_millis(self.max_gap_ms),
            },
        };
        ReplayConfig {
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            pacing,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("munia=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args.into()).await,
        Command::Sessions(args) => sessions(args).await,
        Command::Replay(args) => replay(args).await,
    }
}

async fn open_storage(config: &MuniaConfig) -> Result<Arc<dyn ReplayStorage>, Box<dyn std::error::Error>> {
    if let Some(_pg_url) = &config.postgres_url {
        #[cfg(feature = "postgres")]
        {
            let storage = munia_postgres::PgStorage::connect(_pg_url).await?;
            tracing::info!("Using PostgreSQL backend");
            return Ok(Arc::new(storage));
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err("PostgreSQL support not enabled. Rebuild with --features postgres".into());
        }
    }

    let storage = DuckDbStorage::open(&config.db_path)?;
    tracing::info!("Database opened at {:?}", config.db_path);
    Ok(Arc::new(storage))
}

async fn serve(config: MuniaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(&config).await?;

    let identity = match &config.api_tokens {
        Some(spec) => StaticTokenProvider::parse(spec)?,
        None => StaticTokenProvider::new(),
    };
    if identity.is_empty() {
        tracing::warn!("No MUNIA_API_TOKENS set, every request will be treated as anonymous");
    } else {
        tracing::info!("Loaded {} API tokens", identity.len());
    }

    let engine = Arc::new(ReplayEngine::new(storage, Arc::new(identity)));

    #[allow(unused_mut)]
    let mut app = munia_rest::router(engine.clone());
    if config.admin_enabled {
        #[cfg(feature = "admin")]
        {
            app = app.merge(munia_admin::router(engine.clone()));
            tracing::info!("Admin replay API mounted at /admin/api/");
        }
        #[cfg(not(feature = "admin"))]
        {
            tracing::warn!("Admin API requested but not compiled in. Rebuild with --features admin");
        }
    }

    // Signal handler for graceful shutdown (Ctrl+C / SIGTERM)
    let shutdown_notify = Arc::new(Notify::new());
    let signal_shutdown = shutdown_notify.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            return;
        }
        tracing::info!("Received shutdown signal");
        signal_shutdown.notify_one();
    });

    let port = config.rest_port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("Replay API listening on 0.0.0.0:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_notify.notified().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn sessions(args: SessionsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source = HttpActionSource::new(args.remote.server, args.remote.token);
    let page = SessionPage {
        limit: args.limit,
        offset: args.offset,
    };
    let index = source.list_sessions(page).await?;
    println!("{}", serde_json::to_string_pretty(&index)?);
    Ok(())
}

async fn replay(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.replay_config();
    let source = Arc::new(HttpActionSource::new(
        args.remote.server.clone(),
        args.remote.token.clone(),
    ));
    let (_status, switch) = replay_context();
    let mut controller = ReplayController::new(source, Arc::new(TracingTarget), switch, &config);

    let (abort, signal) = abort_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Aborting replay");
            abort.abort();
        }
    });

    let outcome = controller.run(&args.session_id, signal).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    match outcome {
        ReplayState::Error { reason, .. } => Err(reason.into()),
        _ => Ok(()),
    }
}
