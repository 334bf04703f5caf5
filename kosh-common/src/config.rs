use std::env;

use crate::error::CoreError;
use crate::money::Paise;

/// Base URLs of sibling components, as seen from this process.
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    pub ledger: String,
    pub wallet: String,
    pub authority: String,
    pub identity: String,
    pub orchestrator: String,
    pub events: String,
    pub risk: String,
}

/// Process-wide bootstrap configuration, read once at start and threaded
/// explicitly into each component. Nothing here is rebound after boot.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    pub jwt_secret: Vec<u8>,
    pub service_port: u16,
    pub gateway_url: String,
    pub service_urls: ServiceUrls,
    pub migrations_dir: String,
    pub log_level: String,
    /// Transfers at or above this amount demand step-up verification.
    pub high_value_threshold: Paise,
    /// Bearer credential lifetime in seconds.
    pub token_ttl_secs: i64,
}

impl CoreConfig {
    /// Reads the enumerated environment inputs. A missing or undersized
    /// `JWT_SECRET` is a fatal boot error; everything else has a default.
    pub fn from_env() -> Result<Self, CoreError> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| CoreError::Config("JWT_SECRET is required".into()))?
            .into_bytes();
        if jwt_secret.len() < 32 {
            return Err(CoreError::Config(
                "JWT_SECRET must be at least 32 bytes".into(),
            ));
        }

        let service_port = match env::var("SERVICE_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| CoreError::Config(format!("invalid SERVICE_PORT: {raw}")))?,
            Err(_) => 8080,
        };

        let high_value_threshold = match env::var("HIGH_VALUE_THRESHOLD_PAISE") {
            Ok(raw) => Paise(raw.parse::<i64>().map_err(|_| {
                CoreError::Config(format!("invalid HIGH_VALUE_THRESHOLD_PAISE: {raw}"))
            })?),
            Err(_) => Paise(50_000),
        };

        let token_ttl_secs = match env::var("TOKEN_TTL_SECS") {
            Ok(raw) => raw
                .parse::<i64>()
                .map_err(|_| CoreError::Config(format!("invalid TOKEN_TTL_SECS: {raw}")))?,
            Err(_) => 24 * 3600,
        };

        let url_or = |var: &str, default: &str| env::var(var).unwrap_or_else(|_| default.into());

        Ok(Self {
            database_url: url_or("DATABASE_URL", "kosh://local"),
            jwt_secret,
            service_port,
            gateway_url: url_or("GATEWAY_URL", "http://127.0.0.1:8080"),
            service_urls: ServiceUrls {
                ledger: url_or("LEDGER_URL", "http://127.0.0.1:8081"),
                wallet: url_or("WALLET_URL", "http://127.0.0.1:8082"),
                authority: url_or("AUTHORITY_URL", "http://127.0.0.1:8083"),
                identity: url_or("IDENTITY_URL", "http://127.0.0.1:8084"),
                orchestrator: url_or("ORCHESTRATOR_URL", "http://127.0.0.1:8085"),
                events: url_or("EVENTS_URL", "http://127.0.0.1:8086"),
                risk: url_or("RISK_URL", "http://127.0.0.1:8090"),
            },
            migrations_dir: url_or("MIGRATIONS_DIR", "./migrations"),
            log_level: url_or("LOG_LEVEL", "info"),
            high_value_threshold,
            token_ttl_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test to avoid
    // interleaving with each other.
    #[test]
    fn test_from_env() {
        env::remove_var("JWT_SECRET");
        assert!(matches!(
            CoreConfig::from_env(),
            Err(CoreError::Config(_))
        ));

        env::set_var("JWT_SECRET", "short");
        assert!(matches!(
            CoreConfig::from_env(),
            Err(CoreError::Config(_))
        ));

        env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef");
        env::set_var("SERVICE_PORT", "9000");
        let cfg = CoreConfig::from_env().unwrap();
        assert_eq!(cfg.service_port, 9000);
        assert_eq!(cfg.high_value_threshold, Paise(50_000));
        env::remove_var("SERVICE_PORT");
        env::remove_var("JWT_SECRET");
    }
}
