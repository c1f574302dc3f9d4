//! # NIFTY Expiry Seller
//!
//! Sells one hedged weekly NIFTY option on expiry day when spot breaks out of
//! the first post-open candle, then watches it to a stop-loss, a target or the
//! afternoon cutoff.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Typed failures of the trade lifecycle
//! - `exchange`: Kite Connect REST client and the in-memory paper venue
//! - `strategy`: Expiry and symbol rules, position recovery, execution and exits
//! - `utils`: Strike rounding and the clock abstraction

pub mod config;
pub mod error;
pub mod exchange;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{StrategyError, StrategyResult};
