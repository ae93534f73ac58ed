use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use geoproxy_auth::AuthConfig;
use geoproxy_cache::RedisOptions;
use serde::{Deserialize, Serialize};

/// Route reserved for the computed timezone lookup.
pub const GEOTZ_ROUTE: &str = "geotz";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Static credentials and token settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Upstream services, keyed by the name they are mounted under
    #[serde(default = "default_upstreams")]
    pub upstreams: BTreeMap<String, UpstreamConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            redis: RedisConfig::default(),
            cache: CacheConfig::default(),
            upstreams: default_upstreams(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Cache validations
        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0".into());
        }
        if self.redis.enabled {
            if self.redis.url.is_empty() {
                return Err("redis.enabled=true requires redis.url".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
        }
        // Upstream validations
        if self.upstreams.is_empty() {
            return Err("at least one upstream must be configured".into());
        }
        for (name, upstream) in &self.upstreams {
            if !is_valid_route_name(name) {
                return Err(format!(
                    "upstream name '{name}' must be non-empty and contain only [a-z0-9_-]"
                ));
            }
            if name == GEOTZ_ROUTE {
                return Err(format!("upstream name '{GEOTZ_ROUTE}' is reserved"));
            }
            let parsed = url::Url::parse(&upstream.url)
                .map_err(|e| format!("upstreams.{name}.url is invalid: {e}"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("upstreams.{name}.url must be http or https"));
            }
            if upstream.timeout_ms == 0 {
                return Err(format!("upstreams.{name}.timeout_ms must be > 0"));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Number of workers to supervise; `0` means one per CPU.
    pub fn worker_count(&self) -> usize {
        match self.server.worker_count {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn redis_options(&self) -> RedisOptions {
        RedisOptions {
            url: self.redis.url.clone(),
            pool_size: self.redis.pool_size,
            timeout: Duration::from_millis(self.redis.timeout_ms),
        }
    }
}

fn is_valid_route_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Worker processes to run. `0` uses the available CPU parallelism.
    #[serde(default)]
    pub worker_count: usize,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            worker_count: 0,
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Redis connection configuration.
///
/// ```toml
/// [redis]
/// enabled = true
/// url = "redis://127.0.0.1:6379/0"
/// pool_size = 10
/// timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// When disabled each worker keeps an in-process cache.
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    true
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".into()
}
fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of every cached response, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

impl UpstreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: default_upstream_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_upstream_timeout_ms() -> u64 {
    1000
}

fn default_upstreams() -> BTreeMap<String, UpstreamConfig> {
    BTreeMap::from([
        (
            "nominatim".to_string(),
            UpstreamConfig::new("https://nominatim.openstreetmap.org/"),
        ),
        (
            "osrm".to_string(),
            UpstreamConfig::new("http://router.project-osrm.org/"),
        ),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "geoproxy.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., GEOPROXY__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("GEOPROXY")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());

        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.cache.ttl_secs, 60);
        assert_eq!(cfg.upstreams.len(), 2);
        assert_eq!(cfg.upstreams["osrm"].timeout_ms, 1000);
    }

    #[test]
    fn test_worker_count_zero_uses_cpus() {
        let cfg = AppConfig::default();
        assert!(cfg.worker_count() >= 1);

        let mut cfg = AppConfig::default();
        cfg.server.worker_count = 3;
        assert_eq!(cfg.worker_count(), 3);
    }

    #[test]
    fn test_rejects_reserved_and_invalid_upstream_names() {
        let mut cfg = AppConfig::default();
        cfg.upstreams
            .insert("geotz".into(), UpstreamConfig::new("http://localhost/"));
        assert!(cfg.validate().unwrap_err().contains("reserved"));

        let mut cfg = AppConfig::default();
        cfg.upstreams
            .insert("Bad Name".into(), UpstreamConfig::new("http://localhost/"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_upstream_url() {
        let mut cfg = AppConfig::default();
        cfg.upstreams
            .insert("local".into(), UpstreamConfig::new("not a url"));
        assert!(cfg.validate().unwrap_err().contains("upstreams.local.url"));

        let mut cfg = AppConfig::default();
        cfg.upstreams
            .insert("ftp".into(), UpstreamConfig::new("ftp://example.com/"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_ttl_and_bad_level() {
        let mut cfg = AppConfig::default();
        cfg.cache.ttl_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());
    }
}
