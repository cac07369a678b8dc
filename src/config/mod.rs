use axum::http::Uri;
use serde::Deserialize;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub gate: GateConfig,
    pub invites: InviteConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Key material and token lifetimes.
///
/// Keys are PEM text supplied through the environment; literal `\n` escape
/// sequences are normalized to real newlines before parsing so the values can
/// be stored in single-line secret slots.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub issuer: String,
    pub audience: String,
    pub leeway_secs: u64,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    /// Shorter session handed out at the end of an invite/verification flow.
    pub invite_access_minutes: i64,
    pub invite_refresh_minutes: i64,
}

/// Request-gate routing surface.
///
/// One gate serves every deployment mode; the landing path and the public
/// path list are configuration, not code.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Path prefixes reachable without a session.
    pub public_paths: Vec<String>,
    pub api_prefix: String,
    /// Placeholder path unauthenticated page requests are rewritten to.
    pub gate_path: String,
    /// Where authenticated visitors to the entry points end up.
    pub landing_path: String,
    pub setup_page: String,
    pub setup_api: String,
    pub logout_path: String,
    /// Entry points ("/", "/login") that bounce authenticated callers inward.
    pub entry_points: Vec<String>,
    /// Locales recognized by the locale-forwarding stage.
    pub locales: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteConfig {
    pub ttl_hours: i64,
    pub signup_ttl_hours: i64,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub secure_cookies: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::Config(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = AppConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("hearth-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("8080"), is_prod)?,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("hearth"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://localhost:6379"), is_prod)?,
            },
            jwt: JwtConfig {
                private_key_pem: normalize_pem(&get_env("JWT_PRIVATE_KEY", None, true)?),
                public_key_pem: normalize_pem(&get_env("JWT_PUBLIC_KEY", None, true)?),
                issuer: get_env("JWT_ISSUER", Some("hearth-auth"), is_prod)?,
                audience: get_env("JWT_AUDIENCE", Some("hearth"), is_prod)?,
                leeway_secs: parse_env("JWT_LEEWAY_SECS", Some("5"), is_prod)?,
                access_ttl_minutes: parse_env("JWT_ACCESS_TTL_MINUTES", Some("120"), is_prod)?,
                refresh_ttl_days: parse_env("JWT_REFRESH_TTL_DAYS", Some("30"), is_prod)?,
                invite_access_minutes: parse_env("JWT_INVITE_ACCESS_MINUTES", Some("10"), is_prod)?,
                invite_refresh_minutes: parse_env(
                    "JWT_INVITE_REFRESH_MINUTES",
                    Some("30"),
                    is_prod,
                )?,
            },
            gate: GateConfig {
                public_paths: get_env(
                    "GATE_PUBLIC_PATHS",
                    // Logout is public so it can clear cookies that no
                    // longer verify.
                    Some("/login,/invite,/health,/auth/gate,/api/auth/refresh,/api/auth/logout,/api/invites,/api/signup"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                api_prefix: get_env("GATE_API_PREFIX", Some("/api"), is_prod)?,
                gate_path: get_env("GATE_PLACEHOLDER_PATH", Some("/auth/gate"), is_prod)?,
                landing_path: get_env("GATE_LANDING_PATH", Some("/home"), is_prod)?,
                setup_page: get_env("GATE_SETUP_PAGE", Some("/account/setup"), is_prod)?,
                setup_api: get_env("GATE_SETUP_API", Some("/api/account/setup"), is_prod)?,
                logout_path: get_env("GATE_LOGOUT_PATH", Some("/api/auth/logout"), is_prod)?,
                entry_points: get_env("GATE_ENTRY_POINTS", Some("/,/login"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                locales: get_env("GATE_LOCALES", Some("en,de,fr"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            invites: InviteConfig {
                ttl_hours: parse_env("INVITE_TTL_HOURS", Some("24"), is_prod)?,
                signup_ttl_hours: parse_env("SIGNUP_TTL_HOURS", Some("48"), is_prod)?,
                base_url: get_env("BASE_URL", Some("http://localhost:8080"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                secure_cookies: is_prod,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(AppError::Config(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }
        if self.jwt.access_ttl_minutes <= 0 || self.jwt.refresh_ttl_days <= 0 {
            return Err(AppError::Config(anyhow::anyhow!(
                "token lifetimes must be positive"
            )));
        }
        if !self.jwt.private_key_pem.contains("PRIVATE KEY")
            || !self.jwt.public_key_pem.contains("PUBLIC KEY")
        {
            return Err(AppError::Config(anyhow::anyhow!(
                "JWT_PRIVATE_KEY / JWT_PUBLIC_KEY must be PEM-encoded"
            )));
        }
        if self.gate.gate_path.parse::<Uri>().is_err() {
            return Err(AppError::Config(anyhow::anyhow!(
                "GATE_PLACEHOLDER_PATH must be a valid request path"
            )));
        }
        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::Config(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }
        Ok(())
    }
}

/// Turn single-line secret values back into real PEM blocks.
pub fn normalize_pem(raw: &str) -> String {
    raw.replace("\\n", "\n")
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::Config(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::Config(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::Config(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
