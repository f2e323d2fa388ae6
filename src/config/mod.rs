//! Configuration management
//!
//! YAML-based configuration with:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//!
//! Security switches (request signing, limits, token lifetimes) live in explicit
//! structs that are handed to the components using them, so every state can be
//! exercised in tests without touching the process environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for buffered webhook bodies
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Peers whose `x-forwarded-for` header is believed. Empty means the socket
    /// peer is always the client.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4080
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Authentication and token lifetime configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime without "remember me"
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_secs: u64,
    /// Refresh token lifetime with "remember me"
    #[serde(default = "default_remember_me_ttl")]
    pub remember_me_refresh_token_ttl_secs: u64,
    #[serde(default = "default_reset_token_ttl")]
    pub reset_token_ttl_secs: u64,
    #[serde(default = "default_invite_token_ttl")]
    pub invite_token_ttl_secs: u64,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    /// Maximum concurrent password hashing jobs
    #[serde(default = "default_hash_workers")]
    pub hash_workers: usize,
}

impl AuthConfig {
    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    /// Refresh lifetime for the given session class
    pub fn refresh_ttl(&self, remember_me: bool) -> Duration {
        if remember_me {
            Duration::from_secs(self.remember_me_refresh_token_ttl_secs)
        } else {
            Duration::from_secs(self.refresh_token_ttl_secs)
        }
    }

    pub fn reset_token_ttl(&self) -> Duration {
        Duration::from_secs(self.reset_token_ttl_secs)
    }

    pub fn invite_token_ttl(&self) -> Duration {
        Duration::from_secs(self.invite_token_ttl_secs)
    }
}

fn default_access_token_ttl() -> u64 {
    15 * 60
}

fn default_refresh_token_ttl() -> u64 {
    24 * 3600
}

fn default_remember_me_ttl() -> u64 {
    30 * 24 * 3600
}

fn default_reset_token_ttl() -> u64 {
    3600
}

fn default_invite_token_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_password_min_length() -> usize {
    8
}

fn default_hash_workers() -> usize {
    4
}

/// Webhook request signing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SigningConfig {
    /// When false the signature step is a pass-through
    #[serde(default)]
    pub required: bool,
    /// Accepted clock skew between signer and server
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,
}

fn default_time_window() -> u64 {
    300
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            required: false,
            time_window_secs: default_time_window(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests allowed per API key within `window_ms`
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,
    #[serde(default = "default_rate_limit_window")]
    pub window_ms: u64,
    /// How often idle windows are swept
    #[serde(default = "default_rate_limit_cleanup")]
    pub cleanup_interval_ms: u64,
    /// Attempts allowed on credential endpoints (login, forgot-password)
    #[serde(default = "default_auth_max_attempts")]
    pub auth_max_attempts: u32,
    #[serde(default = "default_auth_window")]
    pub auth_window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn auth_window(&self) -> Duration {
        Duration::from_secs(self.auth_window_secs)
    }
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_rate_limit_window() -> u64 {
    60_000
}

fn default_rate_limit_cleanup() -> u64 {
    5 * 60_000
}

fn default_auth_max_attempts() -> u32 {
    10
}

fn default_auth_window() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_rate_limit_max(),
            window_ms: default_rate_limit_window(),
            cleanup_interval_ms: default_rate_limit_cleanup(),
            auth_max_attempts: default_auth_max_attempts(),
            auth_window_secs: default_auth_window(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/leadgate")
}

fn default_log_prefix() -> String {
    "leadgate".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                max_body_bytes: default_max_body_bytes(),
                trusted_proxies: Vec::new(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                access_token_ttl_secs: default_access_token_ttl(),
                refresh_token_ttl_secs: default_refresh_token_ttl(),
                remember_me_refresh_token_ttl_secs: default_remember_me_ttl(),
                reset_token_ttl_secs: default_reset_token_ttl(),
                invite_token_ttl_secs: default_invite_token_ttl(),
                password_min_length: default_password_min_length(),
                hash_workers: default_hash_workers(),
            },
            database: DatabaseConfig {
                url: "sqlite://./data/leadgate.db".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            signing: SigningConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("LEADGATE_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string (no environment overrides)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_norway::from_str(yaml).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/leadgate/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("leadgate/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("APP_ENV") {
            self.environment = Environment::parse(&env);
        }

        // Server
        if let Ok(host) = std::env::var("LEADGATE_HOST") {
            self.server.host = host;
        }
        override_parsed("LEADGATE_PORT", &mut self.server.port);
        if let Ok(proxies) = std::env::var("LEADGATE_TRUSTED_PROXIES") {
            self.server.trusted_proxies = parse_ip_list(&proxies);
        }

        // Database
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }

        // Auth
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        override_parsed("ACCESS_TOKEN_TTL_SECS", &mut self.auth.access_token_ttl_secs);
        override_parsed("REFRESH_TOKEN_TTL_SECS", &mut self.auth.refresh_token_ttl_secs);
        override_parsed(
            "REFRESH_TOKEN_REMEMBER_ME_TTL_SECS",
            &mut self.auth.remember_me_refresh_token_ttl_secs,
        );
        override_parsed("RESET_TOKEN_TTL_SECS", &mut self.auth.reset_token_ttl_secs);
        override_parsed("INVITE_TOKEN_TTL_SECS", &mut self.auth.invite_token_ttl_secs);

        // Signing
        if let Ok(required) = std::env::var("HMAC_SIGNING_REQUIRED") {
            self.signing.required = required.eq_ignore_ascii_case("true") || required == "1";
        }
        override_parsed("HMAC_TIME_WINDOW_SECONDS", &mut self.signing.time_window_secs);

        // Rate limiting
        override_parsed("RATE_LIMIT_MAX", &mut self.rate_limit.max_requests);
        override_parsed("RATE_LIMIT_WINDOW_MS", &mut self.rate_limit.window_ms);
        override_parsed(
            "RATE_LIMIT_CLEANUP_INTERVAL_MS",
            &mut self.rate_limit.cleanup_interval_ms,
        );
        override_parsed(
            "AUTH_RATE_LIMIT_MAX_ATTEMPTS",
            &mut self.rate_limit.auth_max_attempts,
        );
        override_parsed("AUTH_RATE_LIMIT_WINDOW_SECS", &mut self.rate_limit.auth_window_secs);

        // Logging
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LEADGATE_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters long");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.auth.access_token_ttl_secs == 0
            || self.auth.refresh_token_ttl_secs == 0
            || self.auth.reset_token_ttl_secs == 0
            || self.auth.invite_token_ttl_secs == 0
        {
            anyhow::bail!("Token lifetimes must be greater than zero");
        }

        if self.auth.remember_me_refresh_token_ttl_secs < self.auth.refresh_token_ttl_secs {
            anyhow::bail!("Remember-me refresh lifetime cannot be shorter than the default");
        }

        if self.auth.hash_workers == 0 {
            anyhow::bail!("auth.hash_workers must be at least 1");
        }

        if self.signing.time_window_secs == 0 {
            anyhow::bail!("Signature time window must be greater than zero");
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0 {
            anyhow::bail!("Rate limit max_requests and window_ms must be greater than zero");
        }

        if self.rate_limit.auth_max_attempts == 0 || self.rate_limit.auth_window_secs == 0 {
            anyhow::bail!("Credential rate limit settings must be greater than zero");
        }

        if self.environment.is_production()
            && self.auth.jwt_secret == AppConfig::default().auth.jwt_secret
        {
            anyhow::bail!("The default JWT secret cannot be used in production");
        }

        Ok(())
    }
}

/// Comma-separated IP list; unparseable entries are skipped with a warning
fn parse_ip_list(raw: &str) -> Vec<IpAddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                eprintln!("[CONFIG] Ignoring invalid trusted proxy address: {}", entry);
                None
            }
        })
        .collect()
}

/// Overwrite `target` with the parsed value of `var` when it is set and valid
fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => eprintln!("[CONFIG] Ignoring invalid value for {}: {:?}", var, raw),
        }
    }
}
