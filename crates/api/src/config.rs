use std::time::Duration;

use reface_pipeline::PipelineConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Dispatcher and worker settings.
    pub engine: EngineConfig,
    /// Frame pipeline settings (workspace root, collaborator timeouts).
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `8000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            engine: EngineConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
        }
    }
}

/// Job engine configuration: worker concurrency and dispatcher timing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of jobs processed concurrently (`W`).
    pub max_workers: usize,
    /// Fallback wake-up interval of the dispatcher loop.
    pub poll_interval: Duration,
    /// How long shutdown waits for in-flight workers.
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            poll_interval: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `MAX_WORKERS`               | `1`     |
    /// | `DISPATCH_POLL_INTERVAL_MS` | `1000`  |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`    |
    pub fn from_env() -> Self {
        let max_workers: usize = std::env::var("MAX_WORKERS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("MAX_WORKERS must be a valid usize");
        assert!(max_workers >= 1, "MAX_WORKERS must be at least 1");

        let poll_interval_ms: u64 = std::env::var("DISPATCH_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("DISPATCH_POLL_INTERVAL_MS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            max_workers,
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
        }
    }
}
