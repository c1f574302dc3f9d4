//! Order execution for the two-leg position.

use crate::config::ExecutionConfig;
use crate::error::{StrategyError, StrategyResult};
use crate::exchange::{OrderGateway, OrderRequest, OrderStatus};
use crate::strategy::position::{Position, TradeLeg};
use crate::utils::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Order ids of both legs after an entry or exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegOrders {
    pub sell_order_id: String,
    pub hedge_order_id: String,
}

/// Places and confirms orders for hedged positions.
pub struct OrderExecutor {
    config: ExecutionConfig,
    orders: Arc<dyn OrderGateway>,
    clock: Arc<dyn Clock>,
}

impl OrderExecutor {
    /// Create a new order executor.
    pub fn new(
        config: ExecutionConfig,
        orders: Arc<dyn OrderGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            orders,
            clock,
        }
    }

    /// Open both legs: short first, then the hedge.
    ///
    /// If the hedge cannot be placed or confirmed the short leg is bought back
    /// and [`StrategyError::HedgeFailed`] is returned, so no naked short is
    /// left behind silently.
    pub async fn open_position(
        &self,
        sell_leg: &TradeLeg,
        hedge_leg: &TradeLeg,
    ) -> StrategyResult<LegOrders> {
        info!(
            sell = %sell_leg.tradingsymbol(),
            hedge = %hedge_leg.tradingsymbol(),
            quantity = sell_leg.quantity(),
            "Entering hedged short position"
        );

        let sell_order_id = self.execute(&sell_leg.open_order()).await?;

        let hedge_order_id = match self.execute(&hedge_leg.open_order()).await {
            Ok(order_id) => order_id,
            Err(e) => {
                error!(
                    hedge = %hedge_leg.tradingsymbol(),
                    error = %e,
                    "Failed to place hedge leg - UNWINDING SHORT LEG"
                );
                let unwound = match self.execute(&sell_leg.close_order()).await {
                    Ok(order_id) => {
                        warn!(%order_id, sell = %sell_leg.tradingsymbol(), "Short leg unwound");
                        true
                    }
                    Err(unwind_err) => {
                        error!(
                            sell = %sell_leg.tradingsymbol(),
                            error = %unwind_err,
                            "CRITICAL: Failed to unwind short leg - NAKED SHORT OPEN"
                        );
                        false
                    }
                };
                return Err(StrategyError::HedgeFailed {
                    tradingsymbol: hedge_leg.tradingsymbol(),
                    unwound,
                    source: Box::new(e),
                });
            }
        };

        Ok(LegOrders {
            sell_order_id,
            hedge_order_id,
        })
    }

    /// Close both legs: buy back the short, then sell the hedge.
    ///
    /// A failed buy-back returns before the hedge is touched.
    pub async fn close_position(&self, position: &Position) -> StrategyResult<LegOrders> {
        info!(
            sell = %position.sell_leg.tradingsymbol(),
            hedge = %position.hedge_leg.tradingsymbol(),
            "Exiting position"
        );

        let sell_order_id = self.execute(&position.sell_leg.close_order()).await?;
        let hedge_order_id = self.execute(&position.hedge_leg.close_order()).await?;

        Ok(LegOrders {
            sell_order_id,
            hedge_order_id,
        })
    }

    /// Place an order and wait for it to complete.
    pub async fn execute(&self, order: &OrderRequest) -> StrategyResult<String> {
        let order_id = self.place_order_with_retry(order).await?;
        self.confirm_fill(&order_id, &order.tradingsymbol).await?;

        info!(
            %order_id,
            symbol = %order.tradingsymbol,
            side = %order.transaction_type,
            quantity = order.quantity,
            "Order filled"
        );

        Ok(order_id)
    }

    /// Place an order with retry logic.
    async fn place_order_with_retry(&self, order: &OrderRequest) -> StrategyResult<String> {
        let max_retries = self.config.order_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=max_retries {
            match self.orders.place_order(order).await {
                Ok(order_id) => return Ok(order_id),
                Err(e) => {
                    warn!(
                        symbol = %order.tradingsymbol,
                        attempt,
                        max_retries,
                        error = %e,
                        "Order failed, retrying"
                    );
                    last_error = Some(e);

                    if attempt < max_retries {
                        let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                        self.clock.sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(StrategyError::gateway(
            "place_order",
            last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")),
        ))
    }

    /// Poll order status until it completes, fails, or the fill timeout passes.
    async fn confirm_fill(&self, order_id: &str, tradingsymbol: &str) -> StrategyResult<()> {
        let timeout = chrono::Duration::from_std(self.config.fill_timeout())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let deadline = self.clock.now() + timeout;

        loop {
            let status = self
                .orders
                .order_status(order_id)
                .await
                .map_err(|e| StrategyError::gateway("order_status", e))?;

            match status {
                OrderStatus::Complete => return Ok(()),
                status if status.is_terminal() => {
                    error!(%order_id, %tradingsymbol, status = ?status, "Order not filled");
                    return Err(StrategyError::OrderNotConfirmed {
                        order_id: order_id.to_string(),
                        tradingsymbol: tradingsymbol.to_string(),
                        status: Some(status),
                    });
                }
                _ => {
                    if self.clock.now() >= deadline {
                        error!(%order_id, %tradingsymbol, status = ?status, "Fill confirmation timed out");
                        return Err(StrategyError::OrderNotConfirmed {
                            order_id: order_id.to_string(),
                            tradingsymbol: tradingsymbol.to_string(),
                            status: Some(status),
                        });
                    }
                    debug!(%order_id, status = ?status, "Waiting for fill");
                    self.clock.sleep(self.config.fill_poll()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockKiteClient, MockOrderGateway, TransactionType};
    use crate::strategy::expiry::ExpiryLabel;
    use crate::strategy::symbol::{OptionType, SymbolBuilder};
    use crate::utils::ManualClock;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 24)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn legs() -> (TradeLeg, TradeLeg) {
        let expiry = ExpiryLabel::new(NaiveDate::from_ymd_opt(2025, 7, 24).unwrap());
        let sold = SymbolBuilder::new("NFO", "NIFTY").contract(expiry, 22550, OptionType::Put);
        Position::legs(sold, 300, 50).unwrap()
    }

    fn executor(orders: Arc<dyn OrderGateway>, clock: Arc<ManualClock>) -> OrderExecutor {
        OrderExecutor::new(ExecutionConfig::default(), orders, clock)
    }

    #[tokio::test]
    async fn test_open_position_places_sell_then_hedge() {
        let venue = Arc::new(MockKiteClient::new());
        let clock = Arc::new(ManualClock::new(start()));
        let (sell, hedge) = legs();

        let orders = assert_ok!(executor(venue.clone(), clock).open_position(&sell, &hedge).await);
        assert_ne!(orders.sell_order_id, orders.hedge_order_id);

        let placed = venue.orders().await;
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].request.tradingsymbol, "NIFTY24JUL202522550PE");
        assert_eq!(placed[0].request.transaction_type, TransactionType::Sell);
        assert_eq!(placed[1].request.tradingsymbol, "NIFTY24JUL202522250PE");
        assert_eq!(placed[1].request.transaction_type, TransactionType::Buy);
        assert_eq!(venue.net_quantity("NIFTY24JUL202522550PE").await, -50);
        assert_eq!(venue.net_quantity("NIFTY24JUL202522250PE").await, 50);
    }

    #[tokio::test]
    async fn test_rejected_hedge_unwinds_short_leg() {
        let venue = Arc::new(MockKiteClient::new());
        venue.reject_orders_for("NIFTY24JUL202522250PE").await;
        let clock = Arc::new(ManualClock::new(start()));
        let (sell, hedge) = legs();

        let err = assert_err!(executor(venue.clone(), clock).open_position(&sell, &hedge).await);
        assert!(matches!(err, StrategyError::HedgeFailed { unwound: true, .. }));

        let placed = venue.orders().await;
        assert_eq!(placed.len(), 3);
        assert_eq!(placed[2].request.tradingsymbol, "NIFTY24JUL202522550PE");
        assert_eq!(placed[2].request.transaction_type, TransactionType::Buy);
        assert_eq!(venue.net_quantity("NIFTY24JUL202522550PE").await, 0);
    }

    #[tokio::test]
    async fn test_rejected_short_leg_places_nothing_else() {
        let venue = Arc::new(MockKiteClient::new());
        venue.reject_orders_for("NIFTY24JUL202522550PE").await;
        let clock = Arc::new(ManualClock::new(start()));
        let (sell, hedge) = legs();

        let err = assert_err!(executor(venue.clone(), clock).open_position(&sell, &hedge).await);
        assert!(matches!(
            err,
            StrategyError::OrderNotConfirmed { status: Some(OrderStatus::Rejected), .. }
        ));
        assert_eq!(venue.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_placement_retries_then_succeeds() {
        let mut gateway = MockOrderGateway::new();
        let mut calls = 0;
        gateway.expect_place_order().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(anyhow::anyhow!("503 Service Unavailable"))
            } else {
                Ok("order-3".to_string())
            }
        });
        gateway
            .expect_order_status()
            .returning(|_| Ok(OrderStatus::Complete));

        let clock = Arc::new(ManualClock::new(start()));
        let (sell, _) = legs();
        let order_id = executor(Arc::new(gateway), clock.clone())
            .execute(&sell.open_order())
            .await
            .unwrap();

        assert_eq!(order_id, "order-3");
        // 500ms + 1000ms of backoff
        assert_eq!(clock.now(), start() + chrono::Duration::milliseconds(1500));
    }

    #[tokio::test]
    async fn test_placement_gives_up_after_max_retries() {
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_place_order()
            .times(3)
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let clock = Arc::new(ManualClock::new(start()));
        let (sell, _) = legs();
        let err = executor(Arc::new(gateway), clock)
            .execute(&sell.open_order())
            .await
            .unwrap_err();

        assert!(matches!(err, StrategyError::Gateway { operation: "place_order", .. }));
    }

    #[tokio::test]
    async fn test_pending_order_times_out_loudly() {
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_place_order()
            .returning(|_| Ok("slow".to_string()));
        gateway
            .expect_order_status()
            .returning(|_| Ok(OrderStatus::Open));

        let clock = Arc::new(ManualClock::new(start()));
        let (sell, _) = legs();
        let err = executor(Arc::new(gateway), clock.clone())
            .execute(&sell.open_order())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StrategyError::OrderNotConfirmed { status: Some(OrderStatus::Open), .. }
        ));
        assert_eq!(clock.now(), start() + chrono::Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_close_position_buys_back_then_sells_hedge() {
        let venue = Arc::new(MockKiteClient::new());
        let clock = Arc::new(ManualClock::new(start()));
        let (sell, hedge) = legs();
        let executor = executor(venue.clone(), clock);

        executor.open_position(&sell, &hedge).await.unwrap();
        executor
            .close_position(&Position::new(sell, hedge, dec!(10)))
            .await
            .unwrap();

        let placed = venue.orders().await;
        assert_eq!(placed[2].request.transaction_type, TransactionType::Buy);
        assert_eq!(placed[3].request.transaction_type, TransactionType::Sell);
        assert_eq!(venue.net_quantity("NIFTY24JUL202522550PE").await, 0);
        assert_eq!(venue.net_quantity("NIFTY24JUL202522250PE").await, 0);
    }
}
