//! Error taxonomy for the trade lifecycle.
//!
//! Gateway implementations speak `anyhow`; the strategy layer wraps those
//! failures into [`StrategyError`] so callers can tell an unreachable venue
//! apart from an unconfirmed fill or a failed hedge.

use crate::exchange::OrderStatus;
use thiserror::Error;

/// Failures that abort a strategy run.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// A market data or order gateway call failed.
    #[error("gateway unavailable during {operation}: {source:#}")]
    Gateway {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A placed leg never reached a completed state.
    #[error("order {order_id} for {tradingsymbol} not confirmed (last status: {status:?})")]
    OrderNotConfirmed {
        order_id: String,
        tradingsymbol: String,
        status: Option<OrderStatus>,
    },

    /// The short leg filled but its hedge did not.
    #[error("hedge leg {tradingsymbol} failed (short leg unwound: {unwound})")]
    HedgeFailed {
        tradingsymbol: String,
        unwound: bool,
        #[source]
        source: Box<StrategyError>,
    },

    /// The day's candle series does not contain the breakout candle yet.
    #[error("breakout candle #{index} unavailable ({available} candles returned)")]
    CandleUnavailable { index: usize, available: usize },
}

impl StrategyError {
    /// Wrap a gateway failure with the operation that produced it.
    pub fn gateway(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Gateway { operation, source }
    }
}

pub type StrategyResult<T> = std::result::Result<T, StrategyError>;
