//! Venue-agnostic gateway traits.
//!
//! The strategy only ever talks to these two seams:
//! - market data (last traded price, historical candles)
//! - orders (placement, status, net position ledger)
//!
//! The live REST client and the in-memory paper client both implement them,
//! so the lifecycle runs unchanged against either.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::types::{Candle, CandleInterval, LastPrice, NetPosition, OrderRequest, OrderStatus};

/// Supplies spot and option prices plus historical candles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Last traded price for an instrument key such as `NFO:NIFTY17JUL202522550PE`.
    async fn last_price(&self, instrument_key: &str) -> anyhow::Result<LastPrice>;

    /// Candles for `[from, to)` in chronological order.
    async fn historical_candles(
        &self,
        instrument_token: u64,
        from: NaiveDate,
        to: NaiveDate,
        interval: CandleInterval,
    ) -> anyhow::Result<Vec<Candle>>;
}

/// Accepts orders and exposes the account's position ledger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Place an order, returning the venue's order id.
    async fn place_order(&self, order: &OrderRequest) -> anyhow::Result<String>;

    /// Current status of a previously placed order.
    async fn order_status(&self, order_id: &str) -> anyhow::Result<OrderStatus>;

    /// Net positions for the trading day.
    async fn net_positions(&self) -> anyhow::Result<Vec<NetPosition>>;
}
