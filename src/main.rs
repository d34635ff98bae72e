//! cliprdr-bridge - headless clipboard redirection endpoint
//!
//! Entry point for the bridge binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cliprdr_bridge::clipboard::{FuseManager, MemoryClipboard, Notification, OsClipboard};
use cliprdr_bridge::config::{Config, LoggingConfig};
use cliprdr_bridge::session::{self, ChannelRole, SessionParams};

/// Command-line arguments for cliprdr-bridge
#[derive(Parser, Debug)]
#[command(name = "cliprdr-bridge")]
#[command(version, about = "Clipboard redirection bridge", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/cliprdr-bridge/config.toml")]
    pub config: String,

    /// Accept a peer on this address (IP:PORT)
    #[arg(short, long, env = "CLIPRDR_LISTEN_ADDR")]
    pub listen: Option<String>,

    /// Dial a listening peer instead of accepting one
    #[arg(long, env = "CLIPRDR_CONNECT_ADDR", conflicts_with = "listen")]
    pub connect: Option<String>,

    /// Put these files on the local clipboard at startup
    #[arg(long = "offer-file")]
    pub offer_files: Vec<PathBuf>,

    /// Put this text on the local clipboard at startup
    #[arg(long, conflicts_with = "offer_files")]
    pub offer_text: Option<String>,

    /// Expose received files through a read-only FUSE mount
    #[arg(long)]
    pub mount: bool,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = Config::load(&args.config);
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default_config()?,
    }
    .with_overrides(args.listen.clone(), args.connect.clone(), args.mount);

    let _log_guard = init_logging(&args, &config.logging)?;

    info!("════════════════════════════════════════════════════════");
    info!("  cliprdr-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Err(e) = &loaded {
        warn!("Failed to load config: {:#}, using defaults", e);
    }
    tracing::debug!("Config: {:?}", config);

    tokio::select! {
        result = run(config, &args) => {
            if let Err(e) = &result {
                eprintln!("{}", cliprdr_bridge::utils::format_user_error(e));
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

async fn run(config: Config, args: &Args) -> Result<()> {
    // Paste waits the full response timeout plus a margin for the render hop
    let render_timeout = Duration::from_secs(config.clipboard.response_wait_timeout_secs + 5);
    let clipboard = Arc::new(MemoryClipboard::new(render_timeout));

    if !args.offer_files.is_empty() {
        clipboard
            .set_files(args.offer_files.clone())
            .context("Failed to offer files")?;
        info!("Offering {} path(s)", args.offer_files.len());
    } else if let Some(text) = &args.offer_text {
        clipboard.set_text(text).context("Failed to offer text")?;
        info!("Offering {} character(s) of text", text.chars().count());
    }

    let os: Arc<dyn OsClipboard> = clipboard;

    let (notify_tx, notify_rx) = crossbeam_channel::unbounded::<Notification>();
    thread::Builder::new()
        .name("cliprdr-notify".to_string())
        .spawn(move || {
            for notification in notify_rx.iter() {
                warn!(
                    "[conn {}] {}: {}",
                    notification.conn_id, notification.title, notification.text
                );
            }
        })
        .context("Failed to spawn notification thread")?;

    let mut fuse = None;
    if config.fuse.enabled {
        let mut manager = FuseManager::new(config.fuse.mount_point.clone());
        manager
            .mount(Arc::clone(&os), config.clipboard.file_chunk_size)
            .context("Failed to mount FUSE view")?;
        info!("Received files appear under {:?}", manager.mount_point());
        fuse = Some(manager);
    }

    let result = match &config.transport.connect_addr {
        Some(addr) => {
            let params = SessionParams::from_config(&config, ChannelRole::Client)
                .with_notifications(notify_tx);
            session::connect(addr, os, params).await
        }
        None => {
            let params = SessionParams::from_config(&config, ChannelRole::Monitor)
                .with_notifications(notify_tx);
            session::listen(&config.transport.listen_addr, os, params).await
        }
    };

    drop(fuse);
    result
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("cliprdr_bridge={},warn", log_level))
    });

    // --log-file wins over the configured rotation directory
    let (file_writer, guard): (Option<NonBlocking>, Option<WorkerGuard>) =
        if let Some(log_file_path) = &args.log_file {
            let (writer, guard) = tracing_appender::non_blocking(File::create(log_file_path)?);
            (Some(writer), Some(guard))
        } else if let Some(dir) = &logging.log_dir {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "cliprdr-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        } else {
            (None, None)
        };

    match args.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .init();
        }
    }

    if let Some(path) = &args.log_file {
        info!("Logging to file: {}", path);
    }

    Ok(guard)
}
