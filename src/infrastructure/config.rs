use config::ConfigError;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub data: DataSettings,
    pub sessions: SessionSettings,
    pub reports: ReportSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSettings {
    /// Directory of CSV files loaded at startup; the file stem is the file id
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl SessionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
}

/// Defaults, then `config/server.toml` if present, then `TESTBENCH__*` variables
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    load_app_config_from("config/server")
}

pub fn load_app_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    let settings = config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("data.dir", "data")?
        .set_default("sessions.ttl_secs", 3600)?
        .set_default("sessions.cleanup_interval_secs", 60)?
        .set_default("reports.output_dir", "reports")?
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("TESTBENCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}
