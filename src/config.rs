use std::time::Duration;

use crate::game::runner::OracleConfig;

/// Server configuration, loaded from the environment (with `.env` support
/// in development).
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment ("development" or "production").
    pub env: String,
    /// Address for the HTTP/WS listener.
    pub http_addr: String,
    /// Bot token backing launch-token validation.
    pub bot_token: String,
    /// Keepalive ping interval per connection.
    pub ws_ping_interval: Duration,
    /// Oracle position for Alpha rooms; None leaves Alpha rooms on the
    /// skip-and-log path until a position is configured.
    pub oracle: Option<OracleConfig>,
    /// Product override for the tier-1 survival time.
    pub tier1_survival: Option<Duration>,
}

impl Config {
    /// Derived flag: development builds accept unsigned launch data.
    pub fn dev_mode(&self) -> bool {
        self.env == "development"
    }

    /// Loads configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let env = getenv("ENV", "development");
        let config = Self {
            env: env.clone(),
            http_addr: getenv("HTTP_ADDR", "0.0.0.0:8080"),
            bot_token: getenv("BOT_TOKEN", ""),
            ws_ping_interval: Duration::from_secs(getenv_u64("WS_PING_INTERVAL_SEC", 30)),
            oracle: load_oracle(),
            tier1_survival: std::env::var("TIER1_SURVIVAL_SEC")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bot_token.is_empty() && !self.dev_mode() {
            anyhow::bail!("BOT_TOKEN is required outside development");
        }
        if self.http_addr.is_empty() {
            anyhow::bail!("HTTP_ADDR must not be empty");
        }
        if self.ws_ping_interval.is_zero() {
            anyhow::bail!("WS_PING_INTERVAL_SEC must be > 0");
        }
        if let Some(survival) = self.tier1_survival {
            if survival < Duration::from_secs(30) {
                anyhow::bail!("TIER1_SURVIVAL_SEC must be at least 30");
            }
        }
        Ok(())
    }
}

fn load_oracle() -> Option<OracleConfig> {
    let url = std::env::var("ORACLE_URL").ok().filter(|v| !v.is_empty())?;
    Some(OracleConfig {
        url,
        position_id: getenv("ORACLE_POSITION_ID", ""),
        liquid_price: getenv_f64("ORACLE_LIQUID_PRICE", 0.0),
        entry_price: getenv_f64("ORACLE_ENTRY_PRICE", 0.0),
        is_long: getenv("ORACLE_DIRECTION", "long") != "short",
    })
}

fn getenv(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

fn getenv_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn getenv_f64(key: &str, fallback: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            env: "production".into(),
            http_addr: "0.0.0.0:8080".into(),
            bot_token: "123:token".into(),
            ws_ping_interval: Duration::from_secs(30),
            oracle: None,
            tier1_survival: None,
        }
    }

    #[test]
    fn test_valid_config() {
        base_config().validate().unwrap();
    }

    #[test]
    fn test_missing_bot_token_rejected_in_production() {
        let mut config = base_config();
        config.bot_token = String::new();
        assert!(config.validate().is_err());

        config.env = "development".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_survival_override_bounds() {
        let mut config = base_config();
        config.tier1_survival = Some(Duration::from_secs(90));
        config.validate().unwrap();

        config.tier1_survival = Some(Duration::from_secs(5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dev_mode_flag() {
        let mut config = base_config();
        assert!(!config.dev_mode());
        config.env = "development".into();
        assert!(config.dev_mode());
    }
}
