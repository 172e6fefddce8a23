//! Environment-driven configuration structures shared by all binaries.

use std::{env, num::NonZeroU32, time::Duration};

use thiserror::Error;

/// Mempool endpoints polled when `SNIPER_QUERY_ENDPOINTS` is not set.
pub const DEFAULT_QUERY_ENDPOINTS: [&str; 3] = [
    "https://api.hiro.so/extended/v1/tx/mempool",
    "https://stacks-node-api.mainnet.stacks.co/extended/v1/tx/mempool",
    "https://api.mainnet.hiro.so/extended/v1/tx/mempool",
];

/// Broadcast relays used when `SNIPER_BROADCAST_ENDPOINTS` is not set.
pub const DEFAULT_BROADCAST_ENDPOINTS: [&str; 3] = [
    "https://api.hiro.so/v2/transactions",
    "https://stacks-node-api.mainnet.stacks.co/v2/transactions",
    "https://api.mainnet.hiro.so/v2/transactions",
];

const DEFAULT_RATE_LIMIT_PER_SECOND: NonZeroU32 = match NonZeroU32::new(50) {
    Some(value) => value,
    None => unreachable!(),
};

const DEFAULT_RATE_LIMIT_BURST: NonZeroU32 = match NonZeroU32::new(100) {
    Some(value) => value,
    None => unreachable!(),
};

/// API-specific configuration (HTTP bind targets) so the HTTP surface does not
/// depend on monitor-only environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    sniper: SniperSettings,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            sniper: SniperSettings::from_process_env()?,
        })
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn sniper(&self) -> &SniperSettings {
        &self.sniper
    }
}

/// Configuration of the headless monitor binary: a fixed target and payload on
/// top of the shared sniper settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    target_address: String,
    payload: String,
    sniper: SniperSettings,
}

impl MonitorConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            target_address: get_required_var("SNIPER_TARGET_ADDRESS")?,
            payload: get_required_var("SNIPER_PAYLOAD")?,
            sniper: SniperSettings::from_process_env()?,
        })
    }

    pub fn target_address(&self) -> &str {
        &self.target_address
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn sniper(&self) -> &SniperSettings {
        &self.sniper
    }
}

/// Tunables of the detect-then-broadcast core. `Default` mirrors the values
/// used when no environment overrides are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniperSettings {
    query_endpoints: Vec<String>,
    broadcast_endpoints: Vec<String>,
    poll_interval: Duration,
    rate_limit_per_second: NonZeroU32,
    rate_limit_burst: NonZeroU32,
    request_timeout: Duration,
    broadcast_timeout: Duration,
    quick_check_timeout: Duration,
}

impl Default for SniperSettings {
    fn default() -> Self {
        Self {
            query_endpoints: DEFAULT_QUERY_ENDPOINTS.map(String::from).to_vec(),
            broadcast_endpoints: DEFAULT_BROADCAST_ENDPOINTS.map(String::from).to_vec(),
            poll_interval: Duration::from_millis(500),
            rate_limit_per_second: DEFAULT_RATE_LIMIT_PER_SECOND,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            request_timeout: Duration::from_secs(5),
            broadcast_timeout: Duration::from_secs(10),
            quick_check_timeout: Duration::from_millis(1000),
        }
    }
}

impl SniperSettings {
    /// Hydrates `.env` (if present) and applies any `SNIPER_*` overrides on
    /// top of the defaults.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        Self::from_process_env()
    }

    fn from_process_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            query_endpoints: get_list_var("SNIPER_QUERY_ENDPOINTS")?
                .unwrap_or(defaults.query_endpoints),
            broadcast_endpoints: get_list_var("SNIPER_BROADCAST_ENDPOINTS")?
                .unwrap_or(defaults.broadcast_endpoints),
            poll_interval: get_millis_var("SNIPER_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval),
            rate_limit_per_second: get_non_zero_var("SNIPER_RATE_LIMIT_PER_SECOND")?
                .unwrap_or(defaults.rate_limit_per_second),
            rate_limit_burst: get_non_zero_var("SNIPER_RATE_LIMIT_BURST")?
                .unwrap_or(defaults.rate_limit_burst),
            request_timeout: get_millis_var("SNIPER_REQUEST_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout),
            broadcast_timeout: get_millis_var("SNIPER_BROADCAST_TIMEOUT_MS")?
                .unwrap_or(defaults.broadcast_timeout),
            quick_check_timeout: get_millis_var("SNIPER_QUICK_CHECK_TIMEOUT_MS")?
                .unwrap_or(defaults.quick_check_timeout),
        })
    }

    pub fn with_query_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_broadcast_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.broadcast_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_rate_limit(mut self, per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        self.rate_limit_per_second = per_second;
        self.rate_limit_burst = burst;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_broadcast_timeout(mut self, timeout: Duration) -> Self {
        self.broadcast_timeout = timeout;
        self
    }

    pub fn with_quick_check_timeout(mut self, timeout: Duration) -> Self {
        self.quick_check_timeout = timeout;
        self
    }

    pub fn query_endpoints(&self) -> &[String] {
        &self.query_endpoints
    }

    pub fn broadcast_endpoints(&self) -> &[String] {
        &self.broadcast_endpoints
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn rate_limit_per_second(&self) -> NonZeroU32 {
        self.rate_limit_per_second
    }

    pub fn rate_limit_burst(&self) -> NonZeroU32 {
        self.rate_limit_burst
    }

    /// Per-request bound used by the periodic loop when querying endpoints.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn broadcast_timeout(&self) -> Duration {
        self.broadcast_timeout
    }

    /// Bound applied to one-shot checks whose caller did not pick one.
    pub fn quick_check_timeout(&self) -> Duration {
        self.quick_check_timeout
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_list_var(key: &'static str) -> Result<Option<Vec<String>>, ConfigError> {
    let Some(raw) = get_optional_var(key) else {
        return Ok(None);
    };
    let entries: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();
    if entries.is_empty() {
        return Err(ConfigError::EmptyList { key });
    }
    Ok(Some(entries))
}

fn get_non_zero_var(key: &'static str) -> Result<Option<NonZeroU32>, ConfigError> {
    let Some(raw) = get_optional_var(key) else {
        return Ok(None);
    };
    let value: u32 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })?;
    NonZeroU32::new(value)
        .map(Some)
        .ok_or(ConfigError::ZeroValue { key })
}

fn get_millis_var(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = get_optional_var(key) else {
        return Ok(None);
    };
    let millis: u64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })?;
    if millis == 0 {
        return Err(ConfigError::ZeroValue { key });
    }
    Ok(Some(Duration::from_millis(millis)))
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("SNIPER_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    ZeroValue { key: &'static str },
    #[error("`{key}` must list at least one endpoint")]
    EmptyList { key: &'static str },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    const SNIPER_KEYS: [&str; 8] = [
        "SNIPER_QUERY_ENDPOINTS",
        "SNIPER_BROADCAST_ENDPOINTS",
        "SNIPER_POLL_INTERVAL_MS",
        "SNIPER_RATE_LIMIT_PER_SECOND",
        "SNIPER_RATE_LIMIT_BURST",
        "SNIPER_REQUEST_TIMEOUT_MS",
        "SNIPER_BROADCAST_TIMEOUT_MS",
        "SNIPER_QUICK_CHECK_TIMEOUT_MS",
    ];

    fn set_env() {
        std::env::set_var("SNIPER_SKIP_DOTENV", "1");
        std::env::set_var("API_BIND_ADDRESS", "127.0.0.1:8080");
        std::env::remove_var("API_UNIX_SOCKET");
        std::env::remove_var("API_INTERNAL_BIND_ADDRESS");
        std::env::remove_var("API_INTERNAL_UNIX_SOCKET");
        std::env::set_var("SNIPER_TARGET_ADDRESS", "SP2TARGET");
        std::env::set_var("SNIPER_PAYLOAD", "0x80800000");
        for key in SNIPER_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = SniperSettings::default();
        assert_eq!(settings.query_endpoints().len(), 3);
        assert_eq!(settings.broadcast_endpoints().len(), 3);
        assert_eq!(settings.poll_interval(), Duration::from_millis(500));
        assert_eq!(settings.rate_limit_per_second().get(), 50);
        assert_eq!(settings.rate_limit_burst().get(), 100);
        assert_eq!(settings.quick_check_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn api_config_only_requires_api_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::remove_var("SNIPER_TARGET_ADDRESS");
        std::env::remove_var("SNIPER_PAYLOAD");
        std::env::set_var("API_BIND_ADDRESS", "127.0.0.1:9999");

        let config = ApiConfig::load_from_env().expect("api config loads");
        assert_eq!(config.api_bind_address(), "127.0.0.1:9999");
        assert_eq!(config.sniper(), &SniperSettings::default());

        set_env();
    }

    #[test]
    fn api_config_supports_unix_and_internal_listeners() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("API_UNIX_SOCKET", "/tmp/sniper.sock");
        std::env::set_var("API_INTERNAL_BIND_ADDRESS", "127.0.0.1:9090");

        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(config.api_unix_socket(), Some("/tmp/sniper.sock"));
        assert_eq!(config.internal_bind_address(), Some("127.0.0.1:9090"));
        assert_eq!(config.internal_unix_socket(), None);
        assert!(config.has_internal_listener());

        set_env();
    }

    #[test]
    fn sniper_overrides_are_parsed() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var(
            "SNIPER_QUERY_ENDPOINTS",
            " http://a/mempool , http://b/mempool ,",
        );
        std::env::set_var("SNIPER_POLL_INTERVAL_MS", "250");
        std::env::set_var("SNIPER_RATE_LIMIT_BURST", "7");

        let settings = SniperSettings::load_from_env().expect("settings load");
        assert_eq!(
            settings.query_endpoints(),
            ["http://a/mempool".to_string(), "http://b/mempool".to_string()]
        );
        assert_eq!(settings.poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.rate_limit_burst().get(), 7);
        assert_eq!(settings.rate_limit_per_second().get(), 50);

        set_env();
    }

    #[test]
    fn zero_and_garbage_values_are_rejected() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("SNIPER_RATE_LIMIT_PER_SECOND", "0");
        let err = SniperSettings::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ZeroValue {
                key: "SNIPER_RATE_LIMIT_PER_SECOND"
            }
        ));

        set_env();
        std::env::set_var("SNIPER_REQUEST_TIMEOUT_MS", "soon");
        let err = SniperSettings::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "SNIPER_REQUEST_TIMEOUT_MS",
                ..
            }
        ));

        set_env();
        std::env::set_var("SNIPER_BROADCAST_ENDPOINTS", " , ,");
        let err = SniperSettings::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyList {
                key: "SNIPER_BROADCAST_ENDPOINTS"
            }
        ));

        set_env();
    }

    #[test]
    fn empty_required_env_var_is_treated_as_missing() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("SNIPER_TARGET_ADDRESS", "   ");

        let err = MonitorConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingVar {
                key: "SNIPER_TARGET_ADDRESS"
            }
        ));

        set_env();
    }

    #[test]
    fn monitor_config_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("SNIPER_PAYLOAD", "  0xdeadbeef  ");

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(config.target_address(), "SP2TARGET");
        assert_eq!(config.payload(), "0xdeadbeef");

        set_env();
    }
}
