use anyhow::{anyhow, Result};
use base64::prelude::*;
use rand::RngCore;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Token validity window asserted inside the signed credential.
pub const TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Browser-side lifetime of the `token` cookie. Intentionally shorter than [`TOKEN_TTL`].
pub const COOKIE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_BCRYPT_COST: u32 = 12;

#[derive(Debug, Clone)]
pub struct SocialenzConfig {
    pub api_port: u16,
    pub environment: Environment,
    pub cors_origin: String,
    pub paths: SocialenzPaths,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub mail: MailConfig,
}

impl SocialenzConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("SOCIALENZ_HOME") {
            Ok(home) if !home.trim().is_empty() => SocialenzPaths::from_base_dir(home.trim())?,
            _ => SocialenzPaths::discover()?,
        };
        let api_port = env::var("SOCIALENZ_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(3001);
        let cors_origin = non_empty_var("SOCIALENZ_CORS_ORIGIN")
            .unwrap_or_else(|| "http://localhost:5173".to_string());
        Ok(Self {
            api_port,
            environment: Environment::from_env(),
            cors_origin,
            paths,
            auth: AuthConfig::from_env(),
            media: MediaConfig::from_env(),
            mail: MailConfig::from_env(),
        })
    }

    /// Configuration with defaults for every collaborator, rooted at `paths`.
    pub fn new(api_port: u16, paths: SocialenzPaths, auth: AuthConfig) -> Self {
        Self {
            api_port,
            environment: Environment::Production,
            cors_origin: "http://localhost:5173".to_string(),
            paths,
            auth,
            media: MediaConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match env::var("SOCIALENZ_ENV") {
            Ok(raw) if raw.eq_ignore_ascii_case("development") => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub cookie_max_age: Duration,
    pub bcrypt_cost: u32,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("cookie_max_age", &self.cookie_max_age)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let jwt_secret = non_empty_var("SOCIALENZ_JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!(
                "SOCIALENZ_JWT_SECRET not set, generated an ephemeral secret; issued tokens will not survive a restart"
            );
            random_secret()
        });
        Self::with_secret(jwt_secret)
    }

    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl: TOKEN_TTL,
            cookie_max_age: COOKIE_MAX_AGE,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Upload endpoint of the external media host. `None` keeps media on local disk.
    pub upload_url: Option<String>,
    pub upload_preset: Option<String>,
    pub max_upload_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_url: None,
            upload_preset: None,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_upload_bytes = env::var("SOCIALENZ_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(defaults.max_upload_bytes);
        Self {
            upload_url: non_empty_var("SOCIALENZ_MEDIA_UPLOAD_URL"),
            upload_preset: non_empty_var("SOCIALENZ_MEDIA_UPLOAD_PRESET"),
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub from_address: Option<String>,
}

impl MailConfig {
    pub fn from_env() -> Self {
        Self {
            relay_url: non_empty_var("SOCIALENZ_MAIL_RELAY_URL"),
            from_address: non_empty_var("SOCIALENZ_MAIL_FROM"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SocialenzPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl SocialenzPaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("socialenz.db");
        let media_dir = base.join("media");
        let logs_dir = base.join("logs");

        Ok(Self {
            base,
            data_dir,
            db_path,
            media_dir,
            logs_dir,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    BASE64_STANDARD.encode(bytes)
}
