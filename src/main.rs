use anyhow::{Context, Result};
use clap::Parser;
use reelsync::config::Config;
use reelsync::feed::{FeedKind, HttpAuthorDirectory, HttpPollingSource, SessionStore, Viewer};
use reelsync::session::{FeedSession, SessionOptions};
use reelsync::storage::{Database, DatabaseError, SqliteSessionStore, IN_MEMORY, SESSION_MAX_AGE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod app;
mod ui;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "reelsync", about = "Terminal social feed viewer with live sync")]
struct Args {
    /// Base URL of the feed service (overrides source_url)
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Id of the signed-in viewer
    #[arg(long, value_name = "ID")]
    viewer: String,

    /// Authors the viewer follows, comma separated
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    follow: Vec<String>,

    /// Which feed to open: reels or posts
    #[arg(long, default_value = "reels")]
    kind: FeedKind,

    /// Open the reels feed at this item
    #[arg(long, value_name = "ID")]
    item: Option<String>,

    /// Config file (default: ~/.config/reelsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite file for resume snapshots (overrides session_db)
    #[arg(long, value_name = "FILE")]
    session_db: Option<PathBuf>,
}

/// Create the config directory with user-only permissions.
fn ensure_config_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to set config directory permissions to 0700");
        }
    }
    Ok(())
}

/// Log to a file: stdout belongs to the TUI.
fn init_tracing(dir: &Path) -> Result<()> {
    let log_path = dir.join("reelsync.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn open_store(path: Option<&Path>) -> Result<SqliteSessionStore> {
    let path = match path {
        Some(p) => p
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in session database path"))?,
        None => IN_MEMORY,
    };
    let db = match Database::open(path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open session database: {}", e)),
    };
    SqliteSessionStore::resume_or_start(db, SESSION_MAX_AGE)
        .await
        .context("Failed to load browsing session")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = Config::dir();
    ensure_config_dir(&config_dir)?;
    init_tracing(&config_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(source) = args.source {
        config.source_url = Some(source);
    }
    if let Some(path) = args.session_db {
        config.session_db = Some(path);
    }
    tracing::debug!(?config, "Effective configuration");

    let base = config.source().context("No usable feed source")?;
    let token = config.api_token();

    let client = reqwest::Client::builder()
        .user_agent(concat!("reelsync/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;

    let store = open_store(config.session_db.as_deref()).await?;
    tracing::info!(session = %store.session_id(), kind = %args.kind, "Starting viewer");
    let store: Arc<dyn SessionStore> = Arc::new(store);

    let source = HttpPollingSource::new(
        client.clone(),
        base.clone(),
        token.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );
    let directory = Arc::new(HttpAuthorDirectory::new(client, base, token));

    let viewer = Viewer::new(args.viewer, args.follow);
    let (mut session, event_rx) = FeedSession::mount(
        SessionOptions::from_config(&config, args.kind),
        viewer,
        directory,
        store,
        args.item,
    );
    session.start(&source);

    let mut app = App::new(session, &config);
    let result = ui::run(&mut app, event_rx).await;

    app.into_session().unmount().await;
    result
}
