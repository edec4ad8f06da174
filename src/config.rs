//! Configuration (spec §6). Validated eagerly at startup; every missing or
//! invalid field is a hard failure, never a silent default substitution.

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Test,
    Development,
    Production,
}

impl Environment {
    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub admin_key: String,
    pub ledger_network_id: String,
    pub signer_seed: Option<Vec<u8>>,
    pub allowed_origins: Vec<String>,
    pub environment: Environment,
}

impl Config {
    /// Load and validate configuration from the process environment.
    /// Hard-fails on any missing or invalid field (spec §6).
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match std::env::var("LEDGER_ENVIRONMENT").as_deref() {
            Ok("production") => Environment::Production,
            Ok("test") => Environment::Test,
            _ => Environment::Development,
        };

        let database_url = require_env("DATABASE_URL")?;
        if environment.is_production() && !database_url.contains("sslmode=") {
            return Err(ConfigError::Invalid {
                name: "DATABASE_URL",
                reason: "must use TLS (sslmode=require or stronger) in production".into(),
            });
        }

        let admin_key = require_env("LEDGER_ADMIN_KEY")?;
        let min_admin_key_len = if environment.is_production() { 64 } else { 32 };
        if admin_key.len() < min_admin_key_len {
            return Err(ConfigError::Invalid {
                name: "LEDGER_ADMIN_KEY",
                reason: format!("must be at least {min_admin_key_len} characters"),
            });
        }

        let ledger_network_id = require_env("LEDGER_NETWORK_ID")?;
        if environment.is_production() {
            let lower = ledger_network_id.to_ascii_lowercase();
            if lower.contains("dev") || lower.contains("test") {
                return Err(ConfigError::Invalid {
                    name: "LEDGER_NETWORK_ID",
                    reason: "must not contain 'dev' or 'test' in production".into(),
                });
            }
        }

        let signer_seed = match std::env::var("LEDGER_SIGNER_SEED") {
            Ok(seed) if !seed.is_empty() => Some(seed.into_bytes()),
            _ => None,
        };
        if signer_seed.is_none() && environment != Environment::Test {
            return Err(ConfigError::Missing("LEDGER_SIGNER_SEED"));
        }

        let allowed_origins = std::env::var("LEDGER_ALLOWED_ORIGINS")
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        Ok(Config {
            database_url,
            admin_key,
            ledger_network_id,
            signer_seed,
            allowed_origins,
            environment,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}
