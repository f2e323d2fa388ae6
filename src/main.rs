//! leadgate - webhook trust and dashboard session service
//!
//! Authenticates inbound lead/conversation webhooks per tenant and runs the
//! dashboard's JWT session lifecycle.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use config::{LogFormat, LogTarget, LoggingConfig};
use leadgate::{
    config, create_router,
    db::{self, OrganizationRepository, UserRepository},
    middleware::spawn_rate_limit_cleanup,
    models::{NewUser, ADMIN_ROLE},
    services::crypto::hash_secret,
    utils::validation::{check_password_policy, normalize_email},
    AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("leadgate {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must outlive the server so buffered file logs are flushed
    let _log_guard = init_logging(&config.logging);

    info!(environment = ?config.environment, "leadgate starting up");
    if !config.signing.required {
        warn!("Webhook signature verification is disabled");
    }

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    if args.iter().any(|arg| arg == "--bootstrap") {
        return bootstrap(&db, &config).await;
    }

    let state = AppState::new(config.clone(), db);

    let _cleanup = spawn_rate_limit_cleanup(
        state.rate_limiter.clone(),
        state.credential_limiter.clone(),
        config.rate_limit.cleanup_interval(),
    );

    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("HTTP server is ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("leadgate stopped");
    Ok(())
}

/// API router plus the global tracing and CORS layers
fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    create_router(state).layer(trace_layer).layer(cors)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging from configuration
///
/// Returns the file writer guard when logs go to a file.
fn init_logging(log_config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if matches!(log_config.target, LogTarget::Console | LogTarget::Both) {
        layers.push(fmt_layer(&log_config.format, std::io::stdout));
    }
    if matches!(log_config.target, LogTarget::File | LogTarget::Both) {
        let (writer, file_guard) = create_file_writer(log_config);
        layers.push(fmt_layer(&log_config.format, writer));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guard
}

fn fmt_layer<W>(format: &LogFormat, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(writer)
            .boxed(),
    }
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    tracing_appender::non_blocking(file_appender)
}

/// Ensure the directory holding the SQLite file exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(parent) = sqlite_parent_dir(&config.database.url) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
            info!("Created data directory: {:?}", parent);
        }
    }
    Ok(())
}

fn sqlite_parent_dir(url: &str) -> Option<&std::path::Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
}

/// Create the first organization and its admin from environment variables
async fn bootstrap(db: &db::DbPool, config: &AppConfig) -> Result<()> {
    let org_name = required_env("BOOTSTRAP_ORG_NAME")?;
    let email = normalize_email(&required_env("BOOTSTRAP_ADMIN_EMAIL")?);
    let password = required_env("BOOTSTRAP_ADMIN_PASSWORD")?;

    if let Err(reason) = check_password_policy(&password, config.auth.password_min_length) {
        bail!("BOOTSTRAP_ADMIN_PASSWORD rejected: {}", reason);
    }

    let users = UserRepository::new(db);
    if !users.find_by_email(&email).await?.is_empty() {
        bail!("A user with email {} already exists", email);
    }

    let password_hash = tokio::task::spawn_blocking(move || hash_secret(&password))
        .await
        .context("Password hashing task failed")??;

    let organization = OrganizationRepository::new(db).create(org_name.trim()).await?;
    let admin = users
        .create(&NewUser {
            organization_id: organization.id,
            sub_organization_id: None,
            email,
            name: None,
            password_hash,
            role: ADMIN_ROLE.to_string(),
            email_verified: true,
        })
        .await?;

    info!(
        organization_id = %organization.id,
        user_id = %admin.id,
        "Bootstrap organization and admin created"
    );
    println!("organization: {}", organization.id);
    println!("admin: {} ({})", admin.email, admin.id);
    Ok(())
}

fn required_env(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} must be set for --bootstrap", name))
}

/// Print help message
fn print_help() {
    println!(
        r#"leadgate {}

USAGE:
    leadgate [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --bootstrap             Create the first organization and admin user, then
                            exit. Reads BOOTSTRAP_ORG_NAME, BOOTSTRAP_ADMIN_EMAIL
                            and BOOTSTRAP_ADMIN_PASSWORD.

ENVIRONMENT:
    LEADGATE_CONFIG     Path to configuration file (default: config.yaml)
    APP_ENV             development | test | production
    JWT_SECRET          Token signing secret (at least 32 characters)
    DATABASE_URL        SQLite database URL
    RUST_LOG            Log filter, overrides logging.level

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by LEADGATE_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/leadgate/config.yaml
    5. The user configuration directory (leadgate/config.yaml)"#,
        env!("CARGO_PKG_VERSION")
    );
}
