use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub side_channel: SideChannelConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Timing knobs for the background jobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Days a license stays in grace period after its end date
    pub grace_period_days: i64,
    /// Days before the end date an expiring-soon alert fires
    pub expiry_window_days: i64,
    /// Licenses committed per chunk during the monthly reset
    pub reset_batch_size: usize,
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SideChannelConfig {
    /// Bounded queue depth; submissions beyond it are dropped
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string; in-memory stores are used when unset
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
            expiry_window_days: 7,
            reset_batch_size: 100,
            tick_interval_secs: 3_600,
        }
    }
}

impl Default for SideChannelConfig {
    fn default() -> Self {
        Self { queue_depth: 1_024 }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
