//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - Weekly expiry resolution and option symbol construction
//! - Recovering an open trade from the position ledger
//! - Breakout evaluation and hedged order execution
//! - Exit monitoring until stop-loss, target or cutoff

mod engine;
mod executor;
mod expiry;
mod monitor;
mod position;
mod scanner;
mod symbol;

pub use engine::{evaluate_breakout, Breakout, RunOutcome, StrategyEngine};
pub use executor::{LegOrders, OrderExecutor};
pub use expiry::{compute_expiry, ExpiryLabel, HolidayCalendar};
pub use monitor::{ExitDecision, ExitMonitor, ExitReport, ExitRules};
pub use position::{Position, TradeLeg};
pub use scanner::PositionScanner;
pub use symbol::{OptionContract, OptionType, SymbolBuilder, SymbolParseError};
