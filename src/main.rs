use anyhow::Context;
use clap::Parser;
use snipvault::AppConfig;
use snipvault::repositories::{AuthProvider, MemoryStore, RestStore, ShareStore, SnippetStore};
use snipvault::server::{AppState, start_server};
use snipvault::services::ShareLinkIssuer;
use std::panic;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snipvault")]
#[command(about = "Share-link server for the snipvault snippet manager")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Base URL of the hosted backend; omit to keep everything in memory
    #[arg(long, env = "SNIPVAULT_STORE_URL")]
    store_url: Option<String>,

    /// API key sent with every backend request
    #[arg(long, env = "SNIPVAULT_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Public base URL used to build share links
    #[arg(long, env = "SNIPVAULT_PUBLIC_URL", default_value = "http://localhost:8080")]
    public_url: String,

    #[arg(long, env = "SNIPVAULT_PORT", default_value_t = 8080)]
    port: u16,

    /// Timeout for backend requests
    #[arg(long, default_value_t = 10)]
    timeout_seconds: u64,
}

impl From<Args> for AppConfig {
    fn from(args: Args) -> Self {
        Self {
            store_url: args.store_url,
            api_key: args.api_key,
            public_url: args.public_url,
            port: args.port,
            timeout_seconds: args.timeout_seconds,
        }
    }
}

struct Backend {
    snippets: Arc<dyn SnippetStore>,
    shares: Arc<dyn ShareStore>,
    auth: Arc<dyn AuthProvider>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    // Set up panic hook to log panics instead of just exiting
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC in snipvault: {}", panic_info);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "Panic occurred in file '{}' at line {}",
                location.file(),
                location.line()
            );
        }

        if let Some(payload) = panic_info.payload().downcast_ref::<&str>() {
            eprintln!("Panic payload: {}", payload);
        } else if let Some(payload) = panic_info.payload().downcast_ref::<String>() {
            eprintln!("Panic payload: {}", payload);
        }

        std::process::exit(1);
    }));

    if let Err(e) = init_logging() {
        eprintln!(
            "Failed to initialize logging: {}, continuing without structured logging",
            e
        );
    }

    tracing::info!("Starting snipvault v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from(args);
    tracing::info!(
        "Configuration: store={}, public_url={}, port={}",
        config.store_url.as_deref().unwrap_or("<in-memory>"),
        config.public_url,
        config.port
    );

    let backend = match build_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("Backend setup failed: {:#}", e);
            eprintln!("Backend setup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    // Validate the store before accepting requests
    if let Err(e) = validate_backend(&backend, config.timeout_seconds).await {
        tracing::error!("Backend validation failed: {:#}", e);
        eprintln!("Backend validation failed: {:#}", e);
        std::process::exit(1);
    }

    let issuer = ShareLinkIssuer::new(backend.auth.clone(), backend.shares.clone(), &config.public_url);
    let state = AppState::new(issuer, backend.snippets.clone());

    if let Err(e) = start_server(state, config.port).await {
        tracing::error!("Server failed: {:#}", e);
        std::process::exit(1);
    }

    tracing::info!("Server shutdown gracefully");
}

/// Initialize logging with fallback options
fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("snipvault=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_env_filter(filter)
        .try_init()?;

    Ok(())
}

fn build_backend(config: &AppConfig) -> anyhow::Result<Backend> {
    if config.uses_remote_store() {
        let store = Arc::new(RestStore::new(config.clone().into()).context("create hosted store client")?);
        return Ok(Backend {
            snippets: store.clone(),
            shares: store.clone(),
            auth: store,
        });
    }

    tracing::warn!("No store URL configured, using the in-memory store; data is not persisted");
    let store = Arc::new(MemoryStore::new());
    Ok(Backend {
        snippets: store.clone(),
        shares: store.clone(),
        auth: store,
    })
}

async fn validate_backend(backend: &Backend, timeout_seconds: u64) -> anyhow::Result<()> {
    tokio::time::timeout(
        std::time::Duration::from_secs(timeout_seconds),
        backend.snippets.health_check(),
    )
    .await
    .context("reach store within timeout")?
    .context("check store health")
}
