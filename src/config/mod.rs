use std::env;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub api_pool_size: u32,
    pub worker_pool_size: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("DATABASE_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()?,
            username: env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("DATABASE_PASSWORD")?,
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "tubereply".to_string()),
            ssl_mode: env::var("DATABASE_SSL_MODE").unwrap_or_else(|_| "prefer".to_string()),
            // Hosted Postgres plans cap total connections around 20, and the
            // API, worker, and scheduler processes all draw from that budget.
            api_pool_size: env::var("DATABASE_API_POOL_SIZE")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            worker_pool_size: env::var("DATABASE_WORKER_POOL_SIZE")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
        })
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }

    /// Pool for the HTTP surface.
    pub async fn connect_api_pool(&self) -> Result<PgPool> {
        Ok(PgPoolOptions::new()
            .min_connections(1)
            .max_connections(self.api_pool_size)
            .acquire_timeout(Duration::from_secs(60))
            .idle_timeout(Duration::from_secs(300))
            .connect(&self.connection_string())
            .await?)
    }

    /// Smaller pool for background workers, so a busy reply run cannot
    /// starve the API of connections.
    pub async fn connect_worker_pool(&self) -> Result<PgPool> {
        Ok(PgPoolOptions::new()
            .min_connections(1)
            .max_connections(self.worker_pool_size)
            .acquire_timeout(Duration::from_secs(60))
            .idle_timeout(Duration::from_secs(60))
            .connect(&self.connection_string())
            .await?)
    }
}

/// Daily spend budgets for the external platform API.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Total API units the whole deployment may spend per day.
    pub daily_quota_limit: i64,
    /// Replies a single user may post per day.
    pub user_daily_reply_limit: i64,
    /// Units one posted reply costs.
    pub reply_cost: i64,
    /// Units one comment-list fetch costs.
    pub fetch_cost: i64,
}

impl QuotaConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            daily_quota_limit: env::var("DAILY_QUOTA_LIMIT")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()?,
            user_daily_reply_limit: env::var("USER_DAILY_REPLY_LIMIT")
                .unwrap_or_else(|_| "200".to_string())
                .parse()?,
            reply_cost: env::var("REPLY_COST").unwrap_or_else(|_| "50".to_string()).parse()?,
            fetch_cost: env::var("FETCH_COST").unwrap_or_else(|_| "1".to_string()).parse()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub jwt_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub quota: QuotaConfig,
    pub tick_interval_seconds: u64,
    pub worker_concurrency: usize,
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            jwt_secret: env::var("JWT_SECRET")?,
            google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            quota: QuotaConfig::from_env()?,
            tick_interval_seconds: env::var("TICK_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            worker_concurrency: env::var("WORKER_CONCURRENCY")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cors_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
