//! Type definitions for venue API requests and responses.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard response envelope returned by every endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Transaction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    /// The transaction that closes a leg opened with `self`.
    pub fn reverse(self) -> Self {
        match self {
            TransactionType::Buy => TransactionType::Sell,
            TransactionType::Sell => TransactionType::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Margin product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Product {
    /// Intraday margin
    Mis,
    /// Overnight F&O
    Nrml,
    /// Cash and carry
    Cnc,
}

impl Product {
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Mis => "MIS",
            Product::Nrml => "NRML",
            Product::Cnc => "CNC",
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
        }
    }
}

/// Order variety (URL path segment on placement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variety {
    Regular,
}

impl Variety {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variety::Regular => "regular",
        }
    }
}

/// Order status as reported by the order history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Complete,
    Rejected,
    Cancelled,
    Open,
    /// Any transient state (validation pending, put order req received, ...)
    #[serde(other)]
    Pending,
}

impl OrderStatus {
    /// Whether the order can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Complete | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }
}

/// New order request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// Tradingsymbol without the segment prefix
    pub tradingsymbol: String,
    pub exchange: String,
    pub transaction_type: TransactionType,
    pub quantity: u32,
    pub order_type: OrderType,
    pub product: Product,
    pub variety: Variety,
}

impl OrderRequest {
    /// Intraday market order, the only kind this strategy sends.
    pub fn market(
        tradingsymbol: impl Into<String>,
        exchange: impl Into<String>,
        transaction_type: TransactionType,
        quantity: u32,
    ) -> Self {
        Self {
            tradingsymbol: tradingsymbol.into(),
            exchange: exchange.into(),
            transaction_type,
            quantity,
            order_type: OrderType::Market,
            product: Product::Mis,
            variety: Variety::Regular,
        }
    }
}

/// Response body of an order placement.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
}

/// One entry of an order's state history.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderHistoryEntry {
    pub order_id: String,
    pub status: OrderStatus,
    /// Venue reason for a rejection or cancellation
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Net position from the venue's position ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetPosition {
    pub tradingsymbol: String,
    pub exchange: String,
    #[serde(default)]
    pub instrument_token: u64,
    pub product: Product,
    /// Signed quantity (negative = short)
    pub quantity: i64,
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub last_price: Decimal,
}

/// Positions endpoint payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionsResponse {
    pub net: Vec<NetPosition>,
}

/// Last traded price of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LastPrice {
    pub instrument_token: u64,
    pub last_price: Decimal,
}

/// Candle granularity accepted by the historical data endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleInterval {
    FifteenMinute,
}

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::FifteenMinute => "15minute",
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OHLC bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<FixedOffset>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Raw candle row: `[timestamp, open, high, low, close, volume]`.
pub(crate) type CandleRow = (String, Decimal, Decimal, Decimal, Decimal, u64);

/// Historical data endpoint payload.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CandlesResponse {
    pub candles: Vec<CandleRow>,
}

impl Candle {
    pub(crate) fn from_row(row: CandleRow) -> anyhow::Result<Self> {
        let (timestamp, open, high, low, close, volume) = row;
        let timestamp = DateTime::parse_from_str(&timestamp, "%Y-%m-%dT%H:%M:%S%z")
            .map_err(|e| anyhow::anyhow!("Invalid candle timestamp {:?}: {}", timestamp, e))?;

        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}
