//! Configuration management for the expiry-day seller.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Venue API credentials
    #[serde(default)]
    pub kite: KiteConfig,
    /// Strategy constants
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Execution parameters
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiteConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Access token from an already established session
    #[serde(default)]
    pub access_token: String,
    /// REST API root
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Option underlying name as it appears in tradingsymbols
    #[serde(default = "default_underlying")]
    pub underlying: String,
    /// Derivatives segment / exchange code
    #[serde(default = "default_segment")]
    pub segment: String,
    /// Instrument key for the spot index
    #[serde(default = "default_index_instrument")]
    pub index_instrument: String,
    /// Fixed quantity for every leg
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    /// Strike distance between the short leg and its hedge
    #[serde(default = "default_hedge_offset")]
    pub hedge_offset: u32,
    /// Strike rounding granularity
    #[serde(default = "default_strike_step")]
    pub strike_step: u32,
    /// Weekday the weekly contract expires on
    #[serde(default = "default_expiry_weekday")]
    pub expiry_weekday: Weekday,
    /// Exchange holidays that shift expiry one day earlier
    #[serde(default = "default_holidays")]
    pub holidays: Vec<NaiveDate>,
    /// Breakout evaluation instant (local time)
    #[serde(default = "default_entry_time")]
    pub entry_time: NaiveTime,
    /// Breakeven / hold decision instant (local time)
    #[serde(default = "default_cutoff_time")]
    pub cutoff_time: NaiveTime,
    /// Stop-loss threshold as a multiple of entry price
    #[serde(default = "default_stop_loss_multiplier")]
    pub stop_loss_multiplier: Decimal,
    /// Absolute premium at or below which profit is booked
    #[serde(default = "default_target_floor")]
    pub target_floor: Decimal,
    /// Max distance from entry price that counts as breakeven at cutoff
    #[serde(default = "default_breakeven_band")]
    pub breakeven_band: Decimal,
    /// Exit monitor poll interval in seconds
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Poll interval while waiting for the entry instant
    #[serde(default = "default_entry_poll_secs")]
    pub entry_poll_secs: u64,
    /// Position of the reference candle in the day's 15-minute series
    #[serde(default = "default_breakout_candle_index")]
    pub breakout_candle_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Attempts per order placement
    #[serde(default = "default_order_retries")]
    pub order_retries: u8,
    /// Linear backoff step between attempts in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How long to wait for a leg to report COMPLETE
    #[serde(default = "default_fill_timeout_secs")]
    pub fill_timeout_secs: u64,
    /// Order status poll interval in milliseconds
    #[serde(default = "default_fill_poll_ms")]
    pub fill_poll_ms: u64,
    /// Pause after both entry legs fill before reading the entry price
    #[serde(default = "default_fill_settle_secs")]
    pub fill_settle_secs: u64,
}

// Default value functions
fn default_base_url() -> String {
    "https://api.kite.trade".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_underlying() -> String {
    "NIFTY".to_string()
}

fn default_segment() -> String {
    "NFO".to_string()
}

fn default_index_instrument() -> String {
    "NSE:NIFTY 50".to_string()
}

fn default_lot_size() -> u32 {
    50
}

fn default_hedge_offset() -> u32 {
    300
}

fn default_strike_step() -> u32 {
    50
}

fn default_expiry_weekday() -> Weekday {
    Weekday::Thu
}

fn default_holidays() -> Vec<NaiveDate> {
    // Known Thursday holiday; expiry moves to Wednesday that week
    NaiveDate::from_ymd_opt(2025, 7, 17).into_iter().collect()
}

fn default_entry_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).expect("09:30:00 is a valid time")
}

fn default_cutoff_time() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 25, 0).expect("15:25:00 is a valid time")
}

fn default_stop_loss_multiplier() -> Decimal {
    Decimal::new(15, 1) // 1.5x = entry + entry / 2
}

fn default_target_floor() -> Decimal {
    Decimal::new(3, 0) // ₹3
}

fn default_breakeven_band() -> Decimal {
    Decimal::new(1, 0) // ±₹1
}

fn default_monitor_interval_secs() -> u64 {
    30
}

fn default_entry_poll_secs() -> u64 {
    1
}

fn default_breakout_candle_index() -> usize {
    1 // Skip the opening candle
}

fn default_order_retries() -> u8 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_fill_timeout_secs() -> u64 {
    10
}

fn default_fill_poll_ms() -> u64 {
    1000
}

fn default_fill_settle_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(Self::environment())
    }

    /// `NES__SECTION__KEY` overlay; `NES__STRATEGY__HOLIDAYS` is comma separated.
    fn environment() -> config::Environment {
        config::Environment::with_prefix("NES")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("strategy.holidays")
    }

    fn load_from(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(environment)
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let strategy = &self.strategy;

        anyhow::ensure!(strategy.lot_size > 0, "lot_size must be positive");
        anyhow::ensure!(strategy.strike_step > 0, "strike_step must be positive");
        anyhow::ensure!(
            strategy.hedge_offset > 0 && strategy.hedge_offset % strategy.strike_step == 0,
            "hedge_offset must be a positive multiple of strike_step"
        );
        anyhow::ensure!(
            strategy.stop_loss_multiplier > Decimal::ONE,
            "stop_loss_multiplier must be greater than 1"
        );
        anyhow::ensure!(
            strategy.target_floor >= Decimal::ZERO && strategy.breakeven_band >= Decimal::ZERO,
            "target_floor and breakeven_band must not be negative"
        );
        anyhow::ensure!(
            strategy.monitor_interval_secs > 0 && strategy.entry_poll_secs > 0,
            "poll intervals must be positive"
        );
        anyhow::ensure!(
            strategy.entry_time < strategy.cutoff_time,
            "entry_time must be before cutoff_time"
        );
        anyhow::ensure!(
            self.execution.order_retries >= 1,
            "order_retries must be at least 1"
        );

        Ok(())
    }
}

impl StrategyConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn entry_poll(&self) -> Duration {
        Duration::from_secs(self.entry_poll_secs)
    }
}

impl ExecutionConfig {
    pub fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_timeout_secs)
    }

    pub fn fill_poll(&self) -> Duration {
        Duration::from_millis(self.fill_poll_ms)
    }

    pub fn fill_settle(&self) -> Duration {
        Duration::from_secs(self.fill_settle_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kite: KiteConfig::default(),
            strategy: StrategyConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for KiteConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            access_token: String::new(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            underlying: default_underlying(),
            segment: default_segment(),
            index_instrument: default_index_instrument(),
            lot_size: default_lot_size(),
            hedge_offset: default_hedge_offset(),
            strike_step: default_strike_step(),
            expiry_weekday: default_expiry_weekday(),
            holidays: default_holidays(),
            entry_time: default_entry_time(),
            cutoff_time: default_cutoff_time(),
            stop_loss_multiplier: default_stop_loss_multiplier(),
            target_floor: default_target_floor(),
            breakeven_band: default_breakeven_band(),
            monitor_interval_secs: default_monitor_interval_secs(),
            entry_poll_secs: default_entry_poll_secs(),
            breakout_candle_index: default_breakout_candle_index(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_retries: default_order_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fill_timeout_secs: default_fill_timeout_secs(),
            fill_poll_ms: default_fill_poll_ms(),
            fill_settle_secs: default_fill_settle_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_strategy_constants() {
        let strategy = StrategyConfig::default();
        assert_eq!(strategy.lot_size, 50);
        assert_eq!(strategy.hedge_offset, 300);
        assert_eq!(strategy.strike_step, 50);
        assert_eq!(strategy.stop_loss_multiplier, dec!(1.5));
        assert_eq!(strategy.target_floor, dec!(3));
        assert_eq!(strategy.breakeven_band, dec!(1));
        assert_eq!(strategy.monitor_interval(), Duration::from_secs(30));
        assert_eq!(strategy.entry_time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(strategy.cutoff_time, NaiveTime::from_hms_opt(15, 25, 0).unwrap());
        assert_eq!(strategy.holidays, vec![NaiveDate::from_ymd_opt(2025, 7, 17).unwrap()]);
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let vars: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::environment().source(Some(vars))
    }

    #[test]
    fn test_load_reads_scalars_and_holiday_list_from_env() {
        let config = Config::load_from(env(&[
            ("NES__STRATEGY__LOT_SIZE", "75"),
            ("NES__STRATEGY__CUTOFF_TIME", "15:20:00"),
            ("NES__STRATEGY__HOLIDAYS", "2025-07-24,2025-08-14"),
        ]))
        .unwrap();

        assert_eq!(config.strategy.lot_size, 75);
        assert_eq!(
            config.strategy.cutoff_time,
            NaiveTime::from_hms_opt(15, 20, 0).unwrap()
        );
        assert_eq!(
            config.strategy.holidays,
            vec![
                NaiveDate::from_ymd_opt(2025, 7, 24).unwrap(),
                NaiveDate::from_ymd_opt(2025, 8, 14).unwrap(),
            ]
        );
        assert_eq!(config.strategy.hedge_offset, 300);
    }

    #[test]
    fn test_load_accepts_single_holiday() {
        let config =
            Config::load_from(env(&[("NES__STRATEGY__HOLIDAYS", "2025-10-02")])).unwrap();
        assert_eq!(
            config.strategy.holidays,
            vec![NaiveDate::from_ymd_opt(2025, 10, 2).unwrap()]
        );
    }

    #[test]
    fn test_hedge_offset_must_align_with_strike_step() {
        let mut config = Config::default();
        config.strategy.hedge_offset = 275;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_entry_must_precede_cutoff() {
        let mut config = Config::default();
        config.strategy.entry_time = NaiveTime::from_hms_opt(15, 30, 0).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stop_loss_multiplier_above_one() {
        let mut config = Config::default();
        config.strategy.stop_loss_multiplier = dec!(1);
        assert!(config.validate().is_err());
    }
}
