//! Mock trading client for paper trading and tests.

use super::traits::{MarketDataGateway, OrderGateway};
use super::types::*;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Order accepted by the mock venue.
#[derive(Debug, Clone, PartialEq)]
pub struct MockOrder {
    pub order_id: String,
    pub request: OrderRequest,
    pub status: OrderStatus,
}

/// Simulated account state.
#[derive(Debug, Default)]
pub struct MockLedgerState {
    /// Net positions keyed by tradingsymbol
    pub positions: HashMap<String, NetPosition>,
    /// Every order in placement sequence
    pub orders: Vec<MockOrder>,
}

/// Scripted market data.
#[derive(Debug, Default)]
struct MockMarket {
    /// Pending prices per instrument key; the last one repeats
    prices: HashMap<String, VecDeque<Decimal>>,
    tokens: HashMap<String, u64>,
    candles: HashMap<u64, Vec<Candle>>,
}

/// Mock client that simulates the venue's market data and order APIs.
pub struct MockKiteClient {
    state: RwLock<MockLedgerState>,
    market: RwLock<MockMarket>,
    /// Tradingsymbols whose orders get rejected
    rejected_symbols: RwLock<HashSet<String>>,
    order_id_counter: AtomicU64,
}

impl Default for MockKiteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockKiteClient {
    /// Create an empty mock venue.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MockLedgerState::default()),
            market: RwLock::new(MockMarket::default()),
            rejected_symbols: RwLock::new(HashSet::new()),
            order_id_counter: AtomicU64::new(1),
        }
    }

    /// Set a constant price for an instrument key.
    pub async fn set_price(&self, instrument_key: &str, price: Decimal) {
        self.script_prices(instrument_key, vec![price]).await;
    }

    /// Queue a price sequence; each read consumes one value, the last repeats.
    pub async fn script_prices(&self, instrument_key: &str, prices: Vec<Decimal>) {
        self.market
            .write()
            .await
            .prices
            .insert(instrument_key.to_string(), prices.into());
    }

    /// Register the instrument token reported alongside an instrument's price.
    pub async fn set_instrument_token(&self, instrument_key: &str, token: u64) {
        self.market
            .write()
            .await
            .tokens
            .insert(instrument_key.to_string(), token);
    }

    /// Set the candle series returned for a token.
    pub async fn set_candles(&self, instrument_token: u64, candles: Vec<Candle>) {
        self.market
            .write()
            .await
            .candles
            .insert(instrument_token, candles);
    }

    /// Seed the ledger with a position carried over from an earlier run.
    pub async fn seed_position(&self, position: NetPosition) {
        self.state
            .write()
            .await
            .positions
            .insert(position.tradingsymbol.clone(), position);
    }

    /// Reject every subsequent order for a tradingsymbol.
    pub async fn reject_orders_for(&self, tradingsymbol: &str) {
        self.rejected_symbols
            .write()
            .await
            .insert(tradingsymbol.to_string());
    }

    /// Orders placed so far, in sequence.
    pub async fn orders(&self) -> Vec<MockOrder> {
        self.state.read().await.orders.clone()
    }

    /// Signed net quantity held in a tradingsymbol.
    pub async fn net_quantity(&self, tradingsymbol: &str) -> i64 {
        self.state
            .read()
            .await
            .positions
            .get(tradingsymbol)
            .map(|p| p.quantity)
            .unwrap_or(0)
    }

    fn next_order_id(&self) -> String {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl MarketDataGateway for MockKiteClient {
    async fn last_price(&self, instrument_key: &str) -> Result<LastPrice> {
        let mut market = self.market.write().await;
        let instrument_token = market.tokens.get(instrument_key).copied().unwrap_or(0);

        let queue = market
            .prices
            .get_mut(instrument_key)
            .filter(|queue| !queue.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No mock price for {}", instrument_key))?;

        let last_price = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().copied().unwrap_or_default()
        };

        debug!(%instrument_key, %last_price, "Mock last price");

        Ok(LastPrice {
            instrument_token,
            last_price,
        })
    }

    async fn historical_candles(
        &self,
        instrument_token: u64,
        _from: NaiveDate,
        _to: NaiveDate,
        _interval: CandleInterval,
    ) -> Result<Vec<Candle>> {
        Ok(self
            .market
            .read()
            .await
            .candles
            .get(&instrument_token)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrderGateway for MockKiteClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let order_id = self.next_order_id();
        let rejected = self
            .rejected_symbols
            .read()
            .await
            .contains(&order.tradingsymbol);

        let mut state = self.state.write().await;

        let status = if rejected {
            OrderStatus::Rejected
        } else {
            let position = state
                .positions
                .entry(order.tradingsymbol.clone())
                .or_insert_with(|| NetPosition {
                    tradingsymbol: order.tradingsymbol.clone(),
                    exchange: order.exchange.clone(),
                    instrument_token: 0,
                    product: order.product,
                    quantity: 0,
                    average_price: Decimal::ZERO,
                    last_price: Decimal::ZERO,
                });

            match order.transaction_type {
                TransactionType::Buy => position.quantity += i64::from(order.quantity),
                TransactionType::Sell => position.quantity -= i64::from(order.quantity),
            }
            OrderStatus::Complete
        };

        state.orders.push(MockOrder {
            order_id: order_id.clone(),
            request: order.clone(),
            status,
        });

        info!(
            %order_id,
            symbol = %order.tradingsymbol,
            side = %order.transaction_type,
            quantity = order.quantity,
            status = ?status,
            "Mock order executed"
        );

        Ok(order_id)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus> {
        self.state
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.order_id == order_id)
            .map(|o| o.status)
            .ok_or_else(|| anyhow::anyhow!("Unknown order {}", order_id))
    }

    async fn net_positions(&self) -> Result<Vec<NetPosition>> {
        let state = self.state.read().await;
        let mut positions: Vec<NetPosition> = state.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.tradingsymbol.cmp(&b.tradingsymbol));
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sell(symbol: &str) -> OrderRequest {
        OrderRequest::market(symbol, "NFO", TransactionType::Sell, 50)
    }

    #[tokio::test]
    async fn test_scripted_prices_consume_then_repeat() {
        let client = MockKiteClient::new();
        client
            .script_prices("NFO:X", vec![dec!(8), dec!(9), dec!(16)])
            .await;

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(client.last_price("NFO:X").await.unwrap().last_price);
        }
        assert_eq!(seen, vec![dec!(8), dec!(9), dec!(16), dec!(16)]);
    }

    #[tokio::test]
    async fn test_unknown_instrument_errors() {
        let client = MockKiteClient::new();
        assert!(client.last_price("NFO:UNKNOWN").await.is_err());
    }

    #[tokio::test]
    async fn test_orders_update_ledger() {
        let client = MockKiteClient::new();

        let id = client.place_order(&sell("NIFTY17JUL202522550PE")).await.unwrap();
        assert_eq!(client.order_status(&id).await.unwrap(), OrderStatus::Complete);
        assert_eq!(client.net_quantity("NIFTY17JUL202522550PE").await, -50);

        let buy_back = OrderRequest::market("NIFTY17JUL202522550PE", "NFO", TransactionType::Buy, 50);
        client.place_order(&buy_back).await.unwrap();
        assert_eq!(client.net_quantity("NIFTY17JUL202522550PE").await, 0);

        let positions = client.net_positions().await.unwrap();
        assert_eq!(positions[0].product, Product::Mis);
    }

    #[tokio::test]
    async fn test_rejected_orders_leave_ledger_untouched() {
        let client = MockKiteClient::new();
        client.reject_orders_for("NIFTY17JUL202522250PE").await;

        let id = client.place_order(&sell("NIFTY17JUL202522250PE")).await.unwrap();
        assert_eq!(client.order_status(&id).await.unwrap(), OrderStatus::Rejected);
        assert_eq!(client.net_quantity("NIFTY17JUL202522250PE").await, 0);
        assert_eq!(client.orders().await.len(), 1);
    }
}
