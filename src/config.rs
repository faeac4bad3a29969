use crate::domain::{Address, Decimal};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub hyperliquid_api_url: String,
    pub wallets: Vec<Address>,
    pub bot_fee_bps: Decimal,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let hyperliquid_api_url = env_map
            .get("HYPERLIQUID_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("HYPERLIQUID_API_URL".to_string()))?;

        let bot_fee_bps = Decimal::from_str_canonical(
            env_map.get("BOT_FEE_BPS").map(|s| s.as_str()).unwrap_or("5"),
        )
        .ok()
        .filter(|bps| !bps.is_negative())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "BOT_FEE_BPS".to_string(),
                "must be a non-negative decimal".to_string(),
            )
        })?;

        let poll_interval_ms = env_map
            .get("POLL_INTERVAL_MS")
            .map(|s| s.as_str())
            .unwrap_or("300000")
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "POLL_INTERVAL_MS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let wallets = parse_wallets_from_map(&env_map)?;
        if wallets.is_empty() {
            return Err(ConfigError::MissingEnv("WALLETS".to_string()));
        }

        Ok(Config {
            port,
            database_path,
            hyperliquid_api_url,
            wallets,
            bot_fee_bps,
            poll_interval_ms,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_wallets_from_map(env_map: &HashMap<String, String>) -> Result<Vec<Address>, ConfigError> {
    let raw: Vec<String> = if let Some(wallets_str) = env_map.get("WALLETS") {
        wallets_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    } else if let Some(file_path) = env_map.get("WALLETS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "WALLETS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|s| !s.is_empty() && !s.starts_with('#'))
            .collect()
    } else {
        Vec::new()
    };

    let mut wallets: Vec<Address> = Vec::with_capacity(raw.len());
    for wallet in raw {
        if !wallets.iter().any(|w| w.matches(&wallet)) {
            wallets.push(Address::new(wallet));
        }
    }
    Ok(wallets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "HYPERLIQUID_API_URL".to_string(),
            "https://api.hyperliquid.xyz".to_string(),
        );
        map.insert("WALLETS".to_string(), "0xaaa, 0xbbb".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bot_fee_bps, Decimal::from(5));
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
        assert_eq!(
            config.wallets,
            vec![
                Address::new("0xaaa".to_string()),
                Address::new("0xbbb".to_string())
            ]
        );
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_hyperliquid_api_url() {
        let mut env_map = setup_required_env();
        env_map.remove("HYPERLIQUID_API_URL");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "HYPERLIQUID_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_wallets() {
        let mut env_map = setup_required_env();
        env_map.insert("WALLETS".to_string(), " , ".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "WALLETS"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_wallets_deduplicated_case_insensitively() {
        let mut env_map = setup_required_env();
        env_map.insert("WALLETS".to_string(), "0xAbC,0xabc,0xdef".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.wallets.len(), 2);
        assert_eq!(config.wallets[0].as_str(), "0xAbC");
    }

    #[test]
    fn test_wallets_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# monitored").unwrap();
        writeln!(file, "0x111").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  0x222  ").unwrap();

        let mut env_map = setup_required_env();
        env_map.remove("WALLETS");
        env_map.insert(
            "WALLETS_FILE".to_string(),
            file.path().to_string_lossy().to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(
            config.wallets,
            vec![
                Address::new("0x111".to_string()),
                Address::new("0x222".to_string())
            ]
        );
    }

    #[test]
    fn test_unreadable_wallets_file() {
        let mut env_map = setup_required_env();
        env_map.remove("WALLETS");
        env_map.insert(
            "WALLETS_FILE".to_string(),
            "/nonexistent/wallets.txt".to_string(),
        );
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "WALLETS_FILE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_bot_fee_bps() {
        let mut env_map = setup_required_env();
        env_map.insert("BOT_FEE_BPS".to_string(), "2.5".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(
            config.bot_fee_bps,
            Decimal::from_str_canonical("2.5").unwrap()
        );

        let mut env_map = setup_required_env();
        env_map.insert("BOT_FEE_BPS".to_string(), "-1".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "BOT_FEE_BPS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_poll_interval() {
        let mut env_map = setup_required_env();
        env_map.insert("POLL_INTERVAL_MS".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "POLL_INTERVAL_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
