use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long";

/// Stripe-like gateway settings (synchronous payment-intent API).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct StripeGatewayConfig {
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub secret_key: String,
    /// Optional HMAC secret for webhook signature verification. When unset,
    /// webhook payloads are accepted without a signature check.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StripeGatewayConfig {
    fn default() -> Self {
        Self {
            api_base: default_stripe_api_base(),
            secret_key: String::new(),
            webhook_secret: None,
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// bKash-like gateway settings (redirect-then-callback API).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct BkashGatewayConfig {
    #[serde(default = "default_true")]
    pub mock_mode: bool,
    #[serde(default = "default_bkash_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Base URL the customer is redirected back to after completing payment.
    #[serde(default = "default_bkash_redirect_base")]
    pub redirect_base: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BkashGatewayConfig {
    fn default() -> Self {
        Self {
            mock_mode: true,
            base_url: default_bkash_base_url(),
            app_key: String::new(),
            app_secret: String::new(),
            username: String::new(),
            password: String::new(),
            redirect_base: default_bkash_redirect_base(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub stripe: StripeGatewayConfig,
    #[serde(default)]
    pub bkash: BkashGatewayConfig,
    /// After this many seconds a still-pending payment may be resolved to
    /// Failed by the read-through refresh path. 0 disables the expiry.
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            stripe: StripeGatewayConfig::default(),
            bkash: BkashGatewayConfig::default(),
            pending_timeout_secs: default_pending_timeout_secs(),
        }
    }
}

/// Application configuration, layered from `config/default.toml`, an optional
/// per-environment file and `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    pub database_url: String,

    /// JWT secret key used to verify the opaque principal token.
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT lifetime in seconds.
    #[serde(default = "default_jwt_expiration_secs")]
    pub jwt_expiration_secs: u64,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging).
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup.
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    #[serde(default)]
    pub payments: PaymentsConfig,
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}
fn default_bkash_base_url() -> String {
    "https://tokenized.sandbox.bka.sh/v1.2.0-beta".to_string()
}
fn default_bkash_redirect_base() -> String {
    "http://localhost:8080".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    10
}
fn default_pending_timeout_secs() -> u64 {
    3600
}
fn default_jwt_expiration_secs() -> u64 {
    3600
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_page_size() -> u64 {
    20
}
fn default_max_page_size() -> u64 {
    100
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn for_tests(database_url: String) -> Self {
        Self {
            database_url,
            jwt_secret: "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            jwt_expiration_secs: default_jwt_expiration_secs(),
            host: default_host(),
            port: 0,
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            payments: PaymentsConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Loads configuration, layering defaults, an optional per-environment file
/// and environment variables (`APP__SECTION__KEY`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env =
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    if cfg.is_production() && cfg.jwt_secret == DEV_DEFAULT_JWT_SECRET {
        return Err(ConfigError::Message(
            "the development JWT secret must not be used in production".to_string(),
        ));
    }

    Ok(cfg)
}

/// Initializes the global tracing subscriber. `log_level` acts as the
/// default directive and is overridable through `RUST_LOG`.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
