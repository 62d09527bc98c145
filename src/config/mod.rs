use anyhow::Context;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::analytics::geoip::{DEFAULT_TIMEOUT, IP_API_URL};
use crate::shortcode::{DEFAULT_CODE_LENGTH, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    pub cache: CacheConfig,
    pub short_code: ShortCodeConfig,
    pub analytics: AnalyticsConfig,
    pub redirect_mode: RedirectMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 0 disables the read-through link cache
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCodeConfig {
    pub length: usize,
    pub max_attempts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoProviderKind {
    None,
    IpApi,
    MaxMind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub geoip_provider: GeoProviderKind,
    /// Lookup URL template; `{ip}` is replaced by the address
    pub geoip_api_url: String,
    pub geoip_city_db_path: Option<String>,
    pub geoip_timeout_ms: u64,
    pub geoip_cache_entries: u64,
    pub ip_anonymization: bool,
    /// Offset applied to day and hour buckets
    pub utc_offset_minutes: i32,
}

impl AnalyticsConfig {
    pub fn geoip_timeout(&self) -> Duration {
        Duration::from_millis(self.geoip_timeout_ms)
    }
}

/// Status code used by the redirect server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    #[default]
    Temporary,
    Permanent,
    Found,
}

impl RedirectMode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RedirectMode::Temporary => StatusCode::TEMPORARY_REDIRECT,
            RedirectMode::Permanent => StatusCode::PERMANENT_REDIRECT,
            RedirectMode::Found => StatusCode::FOUND,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn parse_backend(raw: &str) -> DatabaseBackend {
    match raw.to_lowercase().as_str() {
        "sqlite" => DatabaseBackend::Sqlite,
        "postgres" | "postgresql" => DatabaseBackend::Postgres,
        "memory" => DatabaseBackend::Memory,
        other => {
            tracing::warn!(
                "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
            );
            DatabaseBackend::Sqlite
        }
    }
}

fn parse_geo_provider(raw: &str) -> GeoProviderKind {
    match raw.to_lowercase().as_str() {
        "none" | "" => GeoProviderKind::None,
        "ip-api" | "ipapi" => GeoProviderKind::IpApi,
        "maxmind" => GeoProviderKind::MaxMind,
        other => {
            tracing::warn!(
                "Unknown GEOIP_PROVIDER '{other}', falling back to 'none'. Supported values: none, ip-api, maxmind"
            );
            GeoProviderKind::None
        }
    }
}

fn parse_redirect_mode(raw: &str) -> RedirectMode {
    match raw.to_lowercase().as_str() {
        "temporary" | "307" => RedirectMode::Temporary,
        "permanent" | "308" => RedirectMode::Permanent,
        "found" | "302" => RedirectMode::Found,
        other => {
            tracing::warn!(
                "Unknown REDIRECT_STATUS '{other}', falling back to 'temporary'. Supported values: temporary, permanent, found"
            );
            RedirectMode::Temporary
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = parse_backend(&env_or("DATABASE_BACKEND", "sqlite"));
        let database_url = env_or("DATABASE_URL", "sqlite://./tally.db?mode=rwc");
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let api_port = env_parse("API_PORT", 8080u16)?;
        let redirect_port = env_parse("REDIRECT_PORT", 3000u16)?;

        let geoip_provider = parse_geo_provider(&env_or("GEOIP_PROVIDER", "none"));
        let geoip_city_db_path = std::env::var("GEOIP_CITY_DB_PATH").ok();
        if geoip_provider == GeoProviderKind::MaxMind && geoip_city_db_path.is_none() {
            anyhow::bail!("GEOIP_CITY_DB_PATH must be set when GEOIP_PROVIDER=maxmind");
        }

        let utc_offset_minutes = env_parse("ANALYTICS_UTC_OFFSET_MINUTES", 0i32)?;
        if utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("ANALYTICS_UTC_OFFSET_MINUTES must be within +/-1439, got {utc_offset_minutes}");
        }

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: env_or("API_HOST", "127.0.0.1"),
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: env_or("REDIRECT_HOST", "127.0.0.1"),
                port: redirect_port,
            },
            cache: CacheConfig {
                max_entries: env_parse("CACHE_MAX_ENTRIES", 10_000u64)?,
                ttl_secs: env_parse("CACHE_TTL_SECS", 60u64)?,
            },
            short_code: ShortCodeConfig {
                length: env_parse("SHORT_CODE_LENGTH", DEFAULT_CODE_LENGTH)?,
                max_attempts: env_parse("SHORT_CODE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            },
            analytics: AnalyticsConfig {
                geoip_provider,
                geoip_api_url: env_or("GEOIP_API_URL", IP_API_URL),
                geoip_city_db_path,
                geoip_timeout_ms: env_parse(
                    "GEOIP_TIMEOUT_MS",
                    DEFAULT_TIMEOUT.as_millis() as u64,
                )?,
                geoip_cache_entries: env_parse("GEOIP_CACHE_ENTRIES", 10_000u64)?,
                ip_anonymization: env_flag("IP_ANONYMIZATION"),
                utc_offset_minutes,
            },
            redirect_mode: parse_redirect_mode(&env_or("REDIRECT_STATUS", "temporary")),
        })
    }
}
