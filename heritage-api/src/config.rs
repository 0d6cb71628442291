/// Configuration management for the API server
///
/// Configuration comes from environment variables, with a `.env` file loaded
/// first when present.
///
/// # Environment Variables
///
/// - `API_HOST`: host to bind to (default: 0.0.0.0)
/// - `API_PORT`: port to bind to (default: 8080)
/// - `CORS_ORIGINS`: comma-separated allowed origins (default: any in development)
/// - `PRODUCTION`: `true` enables production hardening (default: false)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS` / `DATABASE_MIN_CONNECTIONS`: pool bounds (10 / 1)
/// - `JWT_SECRET`: HS256 signing secret, at least 32 characters (required)
/// - `JWT_ACCESS_TTL_MINUTES`: access token lifetime (default: 1440)
/// - `JWT_REFRESH_TTL_DAYS`: refresh token lifetime (default: 30)
/// - `UPLOAD_DIR`: where media files are written (default: ./uploads)
/// - `MAX_UPLOAD_BYTES`: largest accepted upload (default: 20 MiB)
/// - `INVITATION_TTL_HOURS`: default invitation validity (default: 72)
/// - `INVITATION_SWEEP_INTERVAL_SECS`: expiry sweep period (default: 300)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
/// - `RUST_LOG`: log filter (default: heritage_api=debug,tower_http=debug)
///
/// # Example
///
/// ```no_run
/// use heritage_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use heritage_shared::auth::jwt::TokenTtl;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Minimum accepted `JWT_SECRET` length
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest invitation validity an admin may request, in hours
pub const MAX_INVITATION_TTL_HOURS: i64 = 720;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub uploads: UploadConfig,
    pub invitations: InvitationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Empty means any origin (development only)
    pub cors_origins: Vec<String>,

    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Never serialized
    #[serde(skip_serializing, default)]
    pub secret: String,

    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

impl JwtConfig {
    pub fn token_ttl(&self) -> TokenTtl {
        TokenTtl {
            access: chrono::Duration::minutes(self.access_ttl_minutes),
            refresh: chrono::Duration::days(self.refresh_ttl_days),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationConfig {
    pub default_ttl_hours: i64,
    pub sweep_interval_secs: u64,
}

impl InvitationConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Reads a variable through `lookup`, falling back to `default`
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from the process environment (and `.env`)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds and validates configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!("JWT_SECRET must be at least {} characters long", MIN_JWT_SECRET_LEN);
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "API_PORT", 8080)?,
                cors_origins,
                production: parse_or(&lookup, "PRODUCTION", false)?,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", 1)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_ttl_minutes: parse_or(&lookup, "JWT_ACCESS_TTL_MINUTES", 24 * 60)?,
                refresh_ttl_days: parse_or(&lookup, "JWT_REFRESH_TTL_DAYS", 30)?,
            },
            uploads: UploadConfig {
                dir: lookup("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./uploads")),
                max_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            },
            invitations: InvitationConfig {
                default_ttl_hours: parse_or(&lookup, "INVITATION_TTL_HOURS", 72)?,
                sweep_interval_secs: parse_or(&lookup, "INVITATION_SWEEP_INTERVAL_SECS", 300)?,
            },
            logging: LoggingConfig {
                format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                    Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                    _ => LogFormat::Text,
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!("DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS");
        }
        if self.jwt.access_ttl_minutes <= 0 || self.jwt.refresh_ttl_days <= 0 {
            anyhow::bail!("JWT token lifetimes must be positive");
        }
        if !(1..=MAX_INVITATION_TTL_HOURS).contains(&self.invitations.default_ttl_hours) {
            anyhow::bail!(
                "INVITATION_TTL_HOURS must be between 1 and {}",
                MAX_INVITATION_TTL_HOURS
            );
        }
        if self.invitations.sweep_interval_secs == 0 {
            anyhow::bail!("INVITATION_SWEEP_INTERVAL_SECS must be positive");
        }
        if self.uploads.max_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be positive");
        }
        if self.api.production && self.api.cors_origins.is_empty() {
            tracing::warn!("PRODUCTION is set without CORS_ORIGINS; cross-origin requests will be refused");
        }
        Ok(())
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn pool_config(&self) -> heritage_shared::db::pool::DatabaseConfig {
        heritage_shared::db::pool::DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            min_connections: self.database.min_connections,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE_URL", "postgresql://localhost/heritage"),
            ("JWT_SECRET", SECRET),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = load(&required()).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(config.api.cors_origins.is_empty());
        assert!(!config.api.production);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.jwt.token_ttl(), TokenTtl::default());
        assert_eq!(config.uploads.max_bytes, 20 * 1024 * 1024);
        assert_eq!(config.invitations.default_ttl_hours, 72);
        assert_eq!(config.invitations.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let mut vars = required();
        vars.extend([
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "3000"),
            ("CORS_ORIGINS", "https://a.example, https://b.example ,"),
            ("PRODUCTION", "true"),
            ("JWT_ACCESS_TTL_MINUTES", "15"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("LOG_FORMAT", "JSON"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.api.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert!(config.api.production);
        assert_eq!(config.jwt.token_ttl().access, chrono::Duration::minutes(15));
        assert_eq!(config.uploads.max_bytes, 1024);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_required_variables() {
        let err = load(&[("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = load(&[("DATABASE_URL", "postgresql://localhost/heritage")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgresql://localhost/heritage"),
            ("JWT_SECRET", "too-short"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let mut vars = required();
        vars.push(("API_PORT", "eighty"));
        assert!(load(&vars).unwrap_err().to_string().contains("API_PORT"));

        let mut vars = required();
        vars.push(("INVITATION_TTL_HOURS", "1000"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = load(&required()).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert!(json["jwt"].get("secret").is_none());
    }
}
