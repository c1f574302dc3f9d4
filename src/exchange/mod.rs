//! Venue integrations for the expiry-day seller.
//!
//! ## Kite
//! REST connectivity for:
//! - Market data (last traded price, historical candles)
//! - Order placement and order status
//! - Net position ledger (the only state that survives a restart)
//!
//! ## Mock
//! In-memory ledger used for paper trading and tests.

mod client;
pub mod mock;
mod traits;
mod types;

pub use client::KiteClient;
pub use mock::MockKiteClient;
pub use traits::{MarketDataGateway, OrderGateway};
#[cfg(test)]
pub use traits::{MockMarketDataGateway, MockOrderGateway};
pub use types::*;
