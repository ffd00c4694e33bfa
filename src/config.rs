use crate::error::ConfigError;
use crate::execution::{FillPolicy, PositionSettings};
use crate::indicators::IndicatorConfig;
use crate::models::Timeframe;
use crate::strategy::signals::SignalConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "SIGNALBOT";

/// Runtime configuration for a single-instrument strategy instance
///
/// Sources are layered: defaults, then the optional TOML file, then
/// `SIGNALBOT_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbol: String,
    pub base_asset: String,
    pub timeframe: Timeframe,
    pub balance_pct: f64,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_signal: usize,
    pub rsi_length: usize,
    pub rsi_long_below: f64,
    pub rsi_short_above: f64,
    pub fill_poll_interval_ms: u64,
    pub fill_max_attempts: Option<u32>,
    pub history_limit: u32,
    pub max_candles: usize,
    pub journal_len: usize,
    pub testnet: bool,
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(skip)]
    pub api_secret: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "ETHUSDT".to_string(),
            base_asset: "ETH".to_string(),
            timeframe: Timeframe::M1,
            balance_pct: 25.0,
            take_profit_pct: Some(0.5),
            stop_loss_pct: Some(0.5),
            ema_fast: 12,
            ema_slow: 26,
            ema_signal: 9,
            rsi_length: 14,
            rsi_long_below: 30.0,
            rsi_short_above: 40.0,
            fill_poll_interval_ms: 2000,
            fill_max_attempts: Some(150), // 5 minutes at 2s
            history_limit: 1000,
            max_candles: 1000,
            journal_len: 500,
            testnet: true,
            api_key: None,
            api_secret: None,
        }
    }
}

impl BotConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let mut cfg: BotConfig = settings.try_deserialize()?;
        cfg.api_key = std::env::var("BINANCE_API_KEY").ok();
        cfg.api_secret = std::env::var("BINANCE_API_SECRET").ok();

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".into()));
        }
        if self.base_asset.is_empty() || !self.symbol.starts_with(&self.base_asset) {
            return Err(ConfigError::Invalid(format!(
                "symbol {} does not trade base asset {:?}",
                self.symbol, self.base_asset
            )));
        }
        if !(self.balance_pct > 0.0 && self.balance_pct <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "balance_pct must be in (0, 100], got {}",
                self.balance_pct
            )));
        }
        if self.ema_fast == 0 || self.ema_slow == 0 || self.ema_signal == 0 || self.rsi_length == 0
        {
            return Err(ConfigError::Invalid(
                "indicator lengths must be positive".into(),
            ));
        }
        if self.ema_fast >= self.ema_slow {
            return Err(ConfigError::Invalid(format!(
                "ema_fast ({}) must be shorter than ema_slow ({})",
                self.ema_fast, self.ema_slow
            )));
        }
        for (name, pct) in [
            ("take_profit_pct", self.take_profit_pct),
            ("stop_loss_pct", self.stop_loss_pct),
        ] {
            if let Some(pct) = pct {
                if pct <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{} must be positive, got {}",
                        name, pct
                    )));
                }
            }
        }
        if self.fill_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "fill_poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Apply command-line overrides and re-validate
    pub fn apply_overrides(
        &mut self,
        symbol: Option<&str>,
        base_asset: Option<&str>,
        live: bool,
    ) -> Result<(), ConfigError> {
        if let Some(symbol) = symbol {
            self.symbol = symbol.to_uppercase();
        }
        if let Some(base_asset) = base_asset {
            self.base_asset = base_asset.to_uppercase();
        }
        if live {
            self.testnet = false;
        }
        self.validate()
    }

    pub fn interval_ms(&self) -> i64 {
        self.timeframe.interval_ms()
    }

    pub fn indicator_config(&self) -> IndicatorConfig {
        IndicatorConfig {
            rsi_length: self.rsi_length,
            ema_fast: self.ema_fast,
            ema_slow: self.ema_slow,
            ema_signal: self.ema_signal,
        }
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            rsi_long_below: self.rsi_long_below,
            rsi_short_above: self.rsi_short_above,
        }
    }

    pub fn position_settings(&self) -> PositionSettings {
        PositionSettings {
            symbol: self.symbol.clone(),
            base_asset: self.base_asset.clone(),
            balance_pct: self.balance_pct,
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
        }
    }

    pub fn fill_policy(&self) -> FillPolicy {
        FillPolicy {
            poll_interval: Duration::from_millis(self.fill_poll_interval_ms),
            max_attempts: self.fill_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_live_strategy() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.symbol, "ETHUSDT");
        assert_eq!(cfg.interval_ms(), 60_000);
        assert_eq!(cfg.rsi_length, 14);
        assert_eq!(cfg.fill_policy().poll_interval, Duration::from_secs(2));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_balance_pct() {
        let cfg = BotConfig {
            balance_pct: 150.0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("balance_pct"));
    }

    #[test]
    fn test_rejects_mismatched_base_asset() {
        let cfg = BotConfig {
            symbol: "BTCUSDT".to_string(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("base asset"));
    }

    #[test]
    fn test_symbol_override_needs_base_asset() {
        let mut cfg = BotConfig::default();
        assert!(cfg.apply_overrides(Some("btcusdt"), None, false).is_err());

        let mut cfg = BotConfig::default();
        cfg.apply_overrides(Some("btcusdt"), Some("btc"), true).unwrap();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.base_asset, "BTC");
        assert!(!cfg.testnet);
        assert_eq!(cfg.position_settings().base_asset, "BTC");
    }

    #[test]
    fn test_rejects_inverted_emas() {
        let cfg = BotConfig {
            ema_fast: 26,
            ema_slow: 12,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let cfg = BotConfig {
            fill_poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("signalbot-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("signalbot.toml");
        std::fs::write(
            &path,
            "symbol = \"BTCUSDT\"\nbase_asset = \"BTC\"\ntimeframe = \"5m\"\nrsi_length = 21\n",
        )
        .unwrap();

        let cfg = BotConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.timeframe, Timeframe::M5);
        assert_eq!(cfg.rsi_length, 21);
        // untouched keys keep defaults
        assert_eq!(cfg.ema_slow, 26);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
