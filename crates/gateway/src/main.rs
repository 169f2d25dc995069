use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use mbx_gateway::memory_store::MemoryStore;
use mbx_gateway::session_token::SessionSigner;
use mbx_gateway::store::Scope;
use mbx_gateway::template::PlaceholderRenderer;
use mbx_gateway::{AppState, VERSION, config, router};
use mbx_http_tools::runtime::HttpToolExecutor;
use mbx_http_tools::safety::OutboundHttpSafety;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// CLI arguments for the gateway.
#[derive(Parser, Debug, Clone)]
#[command(name = "mbx-gateway")]
#[command(
    version,
    about = "Mock HTTP endpoints + HTTP-backed MCP tool servers on one listener"
)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to a YAML seed file (routes, datasets, tool servers).
    #[arg(short = 'c', long = "config", env = "MBX_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind address (ip:port).
    #[arg(short = 'b', long, env = "MBX_GATEWAY_BIND", default_value = "127.0.0.1:4000")]
    bind: String,

    /// HMAC secret for session tokens. Without it, no caller is authenticated.
    #[arg(long = "session-secret", env = "MBX_GATEWAY_SESSION_SECRET", hide_env_values = true)]
    session_secret: Option<String>,

    /// Timeout of each outbound tool request.
    #[arg(
        long = "outbound-timeout-secs",
        env = "MBX_GATEWAY_OUTBOUND_TIMEOUT_SECS",
        default_value_t = 30
    )]
    outbound_timeout_secs: u64,

    /// Maximum size of an outbound tool response body.
    #[arg(
        long = "max-response-bytes",
        env = "MBX_GATEWAY_MAX_RESPONSE_BYTES",
        default_value_t = 1024 * 1024
    )]
    max_response_bytes: usize,

    /// Restrict outbound tool requests to these hosts (comma-separated).
    #[arg(long = "allowed-hosts", env = "MBX_GATEWAY_ALLOWED_HOSTS", value_delimiter = ',')]
    allowed_hosts: Vec<String>,

    /// Log level. Supports tracing filter syntax.
    #[arg(
        short = 'l',
        long = "log-level",
        env = "MBX_GATEWAY_LOG",
        default_value = "info"
    )]
    log_level: String,

    #[arg(
        long = "log-format",
        env = "MBX_GATEWAY_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Print a session token for a tenant + project (requires --session-secret).
    MintSession {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        project: String,
        #[arg(long = "ttl-secs", default_value_t = 3600)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(&args.log_level, args.log_format);

    if let Some(Command::MintSession {
        tenant,
        project,
        ttl_secs,
    }) = &args.command
    {
        let token = mint_session(&args, tenant, project, *ttl_secs)?;
        println!("{token}");
        return Ok(());
    }

    tracing::info!("Starting mbx gateway v{VERSION}");
    run(args).await
}

fn session_signer(args: &CliArgs) -> anyhow::Result<Option<SessionSigner>> {
    args.session_secret
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| SessionSigner::new(s.as_bytes()).context("invalid --session-secret"))
        .transpose()
}

fn mint_session(args: &CliArgs, tenant: &str, project: &str, ttl_secs: u64) -> anyhow::Result<String> {
    let signer = session_signer(args)?.context("--session-secret is required to mint sessions")?;
    signer
        .issue(Scope::new(tenant, project), Duration::from_secs(ttl_secs))
        .context("mint session token")
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &args.config {
        let seed = config::load_seed(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let summary = config::seed_store(store.as_ref(), seed, base_dir)
            .await
            .with_context(|| format!("seed store from {}", path.display()))?;
        tracing::info!(
            routes = summary.routes,
            records = summary.records,
            servers = summary.servers,
            tools = summary.tools,
            "Loaded seed file {}",
            path.display()
        );
    }

    let sessions = session_signer(&args)?;
    if sessions.is_none() {
        tracing::warn!("No session secret configured; all callers are unauthenticated");
    }

    let safety = OutboundHttpSafety {
        max_response_bytes: Some(args.max_response_bytes),
        ..OutboundHttpSafety::default()
    }
    .with_allowed_hosts(&args.allowed_hosts);
    let executor = HttpToolExecutor::new(safety, Duration::from_secs(args.outbound_timeout_secs))
        .context("build outbound HTTP client")?;

    let state = AppState {
        store,
        templates: Arc::new(PlaceholderRenderer),
        sessions,
        executor,
    };

    let bind = parse_socket_addr(&args.bind, "bind")?;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind address '{bind}'"))?;
    let bound = listener.local_addr().context("get bind address")?;
    tracing::info!("Starting HTTP server on {bound}");

    let ct = CancellationToken::new();
    spawn_shutdown_watcher(ct.clone());

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .context("serve HTTP")?;

    tracing::info!("Gateway shut down gracefully");
    Ok(())
}

fn parse_socket_addr(value: &str, name: &str) -> anyhow::Result<SocketAddr> {
    value
        .parse()
        .with_context(|| format!("invalid --{name} address '{value}'"))
}

fn spawn_shutdown_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                }
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            () = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        ct.cancel();
    });
}

fn init_logging(log_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
