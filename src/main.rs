use anyhow::Result;
use clap::{Parser, ValueEnum};
use openstack_mcp::config::Config;
use openstack_mcp::openstack::{Session, SessionSettings};
use openstack_mcp::resource::ListOptions;
use openstack_mcp::tools::{McpServer, ServerOptions, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// MCP server for read-only OpenStack queries
#[derive(Parser, Debug)]
#[command(name = "openstack-mcp", version, about, long_about = None)]
struct Args {
    /// OpenStack region (overrides OS_REGION_NAME)
    #[arg(short, long)]
    region: Option<String>,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Log file (stdout carries the protocol)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = log_file.unwrap_or_else(get_log_path);

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("openstack-mcp started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("openstack-mcp").join("openstack-mcp.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".openstack-mcp").join("openstack-mcp.log");
    }
    PathBuf::from("openstack-mcp.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.clone())?;

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let env_settings = SessionSettings::from_env();
    let settings = SessionSettings {
        region_override: args.region.clone(),
        region_config: config.region.clone(),
        interface: config.effective_interface(env_settings.interface.clone()),
        ..env_settings
    };

    // Authentication failures are fatal and never retried
    let session = match Session::establish(&settings).await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!("Error initializing OpenStack session: {}", err);
            return Err(anyhow::Error::new(err).context("Error initializing OpenStack session"));
        }
    };
    if let Some(expires_at) = session.expires_at() {
        tracing::info!("Token expires at {}", expires_at);
    }

    let registry = ToolRegistry::new(
        Arc::new(session),
        ListOptions {
            page_size: config.page_size,
        },
    );
    let server = McpServer::new(
        registry,
        ServerOptions {
            request_timeout: config.request_timeout(),
        },
    );

    tracing::info!("MCP server setup complete, serving on stdio");
    server.serve_stdio().await?;
    tracing::info!("MCP server stopped");

    Ok(())
}
