use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use tracing::{level_filters::LevelFilter, trace};

use crate::{envelope::GroupMap, error::ConfigError, util};

pub const SYSTEM_GROUP: &str = "System";
pub const CRYPTO_GROUP: &str = "Crypto";
pub const WEATHER_GROUP: &str = "Weather";
pub const SPACE_GROUP: &str = "Space";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub monitoring: MonitoringConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AppConfig {
    /// Stamped as `metadata.source` on every envelope
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Identifies this machine towards the ingestion service (defaults to the host name)
    pub system_id: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            system_id: None,
        }
    }
}

impl AppConfig {
    pub fn system_id(&self) -> String {
        self.system_id.clone().unwrap_or_else(util::host_name)
    }
}

fn default_app_name() -> String {
    String::from("Metrics Monitor")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between two collection ticks
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    /// Upper bound in seconds for a single remote API call
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(rename = "System", alias = "system", default)]
    pub system: SystemGroup,
    /// Spot price monitors keyed by symbol (`BTC`, `XRP`, ...)
    #[serde(rename = "Crypto", alias = "crypto", default)]
    pub crypto: BTreeMap<String, CryptoConfig>,
    #[serde(rename = "Weather", alias = "weather", default)]
    pub weather: WeatherGroup,
    #[serde(rename = "Space", alias = "space", default)]
    pub space: SpaceGroup,
}

impl MonitoringConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    /// Remote monitors never wait longer than one tick
    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.min(self.update_interval))
    }

    /// Group membership of every configured monitor, enabled or not
    pub fn group_map(&self) -> GroupMap {
        GroupMap::new()
            .with_group(
                SYSTEM_GROUP,
                ["cpu_usage", "memory_usage", "disk_usage", "process_count"],
            )
            .with_group(CRYPTO_GROUP, self.crypto.keys().map(String::as_str))
            .with_group(WEATHER_GROUP, ["temperature", "humidity"])
            .with_group(SPACE_GROUP, ["people_in_space"])
    }
}

fn default_update_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Toggle {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SystemGroup {
    #[serde(default)]
    pub cpu_usage: Toggle,
    #[serde(default)]
    pub memory_usage: Toggle,
    #[serde(default)]
    pub disk_usage: DiskConfig,
    #[serde(default)]
    pub process_count: Toggle,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DiskConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Mount point whose disk is reported
    #[serde(default = "default_disk_path")]
    pub path: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_disk_path(),
        }
    }
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CryptoConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Defaults to the Binance ticker for `<symbol><currency>`
    pub api_url: Option<String>,
    /// Quote currency, also used as the metric unit
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl CryptoConfig {
    pub fn api_url(&self, symbol: &str) -> String {
        self.api_url.clone().unwrap_or_else(|| {
            format!(
                "https://api.binance.com/api/v3/ticker/price?symbol={}{}",
                symbol.to_uppercase(),
                self.currency.to_uppercase()
            )
        })
    }
}

fn default_currency() -> String {
    String::from("EUR")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RemoteToggle {
    #[serde(default)]
    pub enabled: bool,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct WeatherGroup {
    #[serde(default)]
    pub temperature: RemoteToggle,
    #[serde(default)]
    pub humidity: RemoteToggle,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SpaceGroup {
    #[serde(default)]
    pub people_in_space: RemoteToggle,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerConfig {
    /// Ingestion endpoint envelopes are POSTed to
    pub url: String,
    /// Base URL of the shutdown negotiation API (defaults to the origin of `url`)
    pub control_url: Option<String>,
    /// Seconds the delivery worker waits after a failed attempt
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Drop an envelope after this many failed attempts (unbounded if unset)
    pub retry_attempts: Option<u32>,
    /// Seconds before a delivery request is abandoned
    #[serde(default = "default_delivery_timeout")]
    pub timeout: u64,
}

impl ServerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Base URL for `/api/cancel-shutdown` and `/api/check-shutdown`
    pub fn control_base(&self) -> Result<Url, ConfigError> {
        if let Some(control_url) = &self.control_url {
            return parse_http_url("server.control_url", control_url);
        }

        let mut base = parse_http_url("server.url", &self.url)?;
        base.set_path("");
        base.set_query(None);
        base.set_fragment(None);
        Ok(base)
    }
}

fn default_retry_delay() -> u64 {
    5
}

fn default_delivery_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    /// Ask on the terminal
    #[default]
    Prompt,
    /// Always shut down
    Accept,
    /// Never shut down, always cancel on the server
    Decline,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ShutdownConfig {
    #[serde(default)]
    pub confirmation: ConfirmationMode,
    /// Seconds between two `/api/check-shutdown` polls (polling disabled if unset)
    pub poll_interval: Option<u64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Colored console output
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Additional plain-text log file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Reject values that would only fail later, deep inside a monitor or the queue
    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitoring = &self.monitoring;
        if monitoring.update_interval == 0 {
            return Err(ConfigError::Invalid(
                "monitoring.update_interval must be at least 1 second".into(),
            ));
        }
        if monitoring.request_timeout == 0 {
            return Err(ConfigError::Invalid(
                "monitoring.request_timeout must be at least 1 second".into(),
            ));
        }

        parse_http_url("server.url", &self.server.url)?;
        self.server.control_base()?;
        if self.server.timeout == 0 {
            return Err(ConfigError::Invalid(
                "server.timeout must be at least 1 second".into(),
            ));
        }
        if self.server.retry_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "server.retry_attempts must be at least 1 when set".into(),
            ));
        }

        for (symbol, crypto) in &monitoring.crypto {
            if crypto.enabled {
                parse_http_url(&format!("Crypto.{symbol}.api_url"), &crypto.api_url(symbol))?;
            }
        }

        let remotes = [
            ("Weather.temperature", &monitoring.weather.temperature),
            ("Weather.humidity", &monitoring.weather.humidity),
            ("Space.people_in_space", &monitoring.space.people_in_space),
        ];
        for (key, remote) in remotes {
            if !remote.enabled {
                continue;
            }
            let Some(url) = &remote.api_url else {
                return Err(ConfigError::Invalid(format!(
                    "{key} is enabled but has no api_url"
                )));
            };
            parse_http_url(&format!("{key}.api_url"), url)?;
        }

        if self.shutdown.poll_interval == Some(0) {
            return Err(ConfigError::Invalid(
                "shutdown.poll_interval must be at least 1 second".into(),
            ));
        }

        self.logging.level_filter()?;

        Ok(())
    }
}

fn parse_http_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::Invalid(format!("{key}: '{raw}' is not a valid URL ({e})")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::Invalid(format!(
            "{key}: unsupported scheme '{scheme}'"
        ))),
    }
}

/// Parse and validate a JSON or TOML (by extension) configuration file
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let file_content = std::fs::read_to_string(path)?;

    let config: Config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => {
            toml::from_str(&file_content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        _ => serde_json::from_str(&file_content).map_err(|e| ConfigError::Parse(e.to_string()))?,
    };

    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

/// Locate the configuration file.
///
/// Order: explicit path, `COURIER_CONFIG`, `./config.json`, then the user config
/// directory (`~/.config/metrics-courier/config.json` on Linux).
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit.or_else(util::get_config_path) {
        return Ok(path);
    }

    let mut candidates = vec![PathBuf::from("config.json")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("metrics-courier").join("config.json"));
    }

    candidates
        .iter()
        .find(|candidate| candidate.exists())
        .cloned()
        .ok_or_else(|| {
            ConfigError::NotFound(
                candidates
                    .iter()
                    .map(|candidate| candidate.display().to_string())
                    .collect(),
            )
        })
}
