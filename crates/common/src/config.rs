use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Address the HTTP API listens on (default: 0.0.0.0:3000)
    pub api_bind_addr: String,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Maximum rows claimed by one processing cycle (default: 10)
    pub worker_batch_limit: usize,

    /// Upper bound on concurrent processing cycles per pass (default: 10)
    pub worker_max_workers: usize,

    /// Sleep between polls when the backlog is empty, in milliseconds (default: 1000)
    pub worker_idle_interval_ms: u64,

    /// Fixed delay before a failed notification is retried, in seconds (default: 5)
    pub retry_interval_secs: u64,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// SMS Aero account email
    pub smsaero_email: Option<String>,

    /// SMS Aero API key
    pub smsaero_api_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            worker_batch_limit: std::env::var("WORKER_BATCH_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_BATCH_LIMIT must be a valid usize"))?,
            worker_max_workers: std::env::var("WORKER_MAX_WORKERS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_MAX_WORKERS must be a valid usize"))?,
            worker_idle_interval_ms: std::env::var("WORKER_IDLE_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_IDLE_INTERVAL_MS must be a valid u64"))?,
            retry_interval_secs: std::env::var("RETRY_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_INTERVAL_SECS must be a valid u64"))?,
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            smsaero_email: std::env::var("SMSAERO_EMAIL").ok(),
            smsaero_api_key: std::env::var("SMSAERO_API_KEY").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject worker settings that would stall delivery.
    ///
    /// A zero batch limit claims nothing while the backlog stays non-empty, so
    /// the pool would spin without ever sleeping.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_batch_limit == 0 {
            return Err(anyhow::anyhow!("WORKER_BATCH_LIMIT must be greater than zero"));
        }
        if self.worker_max_workers == 0 {
            return Err(anyhow::anyhow!("WORKER_MAX_WORKERS must be greater than zero"));
        }
        if self.retry_interval_secs == 0 {
            return Err(anyhow::anyhow!("RETRY_INTERVAL_SECS must be greater than zero"));
        }
        Ok(())
    }

    /// Configuration with every optional channel disabled, for tests and tools
    /// that only need the database and JWT settings.
    pub fn minimal(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: 20,
            api_bind_addr: "0.0.0.0:3000".to_string(),
            jwt_secret: jwt_secret.into(),
            jwt_expiry_hours: 24,
            worker_batch_limit: 10,
            worker_max_workers: 10,
            worker_idle_interval_ms: 1000,
            retry_interval_secs: 5,
            resend_api_key: None,
            email_from: None,
            telegram_bot_token: None,
            smsaero_email: None,
            smsaero_api_key: None,
        }
    }
}
