//! Exit monitoring for an open position.
//!
//! Polls the short leg's premium and applies, in priority order:
//! 1. stop-loss (premium at or above `entry × multiplier`)
//! 2. target (premium at or below the absolute floor)
//! 3. breakeven exit at the cutoff (premium within the band of entry)
//! 4. hold to expiry at the cutoff (otherwise)

use crate::config::StrategyConfig;
use crate::error::{StrategyError, StrategyResult};
use crate::exchange::MarketDataGateway;
use crate::strategy::executor::{LegOrders, OrderExecutor};
use crate::strategy::position::Position;
use crate::utils::decimal::abs_diff;
use crate::utils::Clock;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    StopLoss,
    Target,
    BreakevenCutoff,
    HoldToExpiry,
    Continue,
}

impl ExitDecision {
    /// Whether this decision flattens both legs.
    pub fn closes_position(&self) -> bool {
        matches!(
            self,
            ExitDecision::StopLoss | ExitDecision::Target | ExitDecision::BreakevenCutoff
        )
    }
}

impl fmt::Display for ExitDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitDecision::StopLoss => "stop-loss",
            ExitDecision::Target => "target",
            ExitDecision::BreakevenCutoff => "breakeven-cutoff",
            ExitDecision::HoldToExpiry => "hold-to-expiry",
            ExitDecision::Continue => "continue",
        };
        f.write_str(name)
    }
}

/// Thresholds for the exit decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRules {
    pub stop_loss_multiplier: Decimal,
    pub target_floor: Decimal,
    pub breakeven_band: Decimal,
    pub cutoff_time: NaiveTime,
}

impl ExitRules {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            stop_loss_multiplier: config.stop_loss_multiplier,
            target_floor: config.target_floor,
            breakeven_band: config.breakeven_band,
            cutoff_time: config.cutoff_time,
        }
    }

    /// Premium that triggers the stop-loss.
    pub fn stop_loss(&self, entry_price: Decimal) -> Decimal {
        entry_price * self.stop_loss_multiplier
    }

    /// Classify a poll.
    pub fn evaluate(&self, price: Decimal, entry_price: Decimal, now: NaiveTime) -> ExitDecision {
        if price >= self.stop_loss(entry_price) {
            ExitDecision::StopLoss
        } else if price <= self.target_floor {
            ExitDecision::Target
        } else if now >= self.cutoff_time {
            if abs_diff(price, entry_price) <= self.breakeven_band {
                ExitDecision::BreakevenCutoff
            } else {
                ExitDecision::HoldToExpiry
            }
        } else {
            ExitDecision::Continue
        }
    }
}

/// How monitoring ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitReport {
    pub decision: ExitDecision,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub polls: u32,
    /// Closing orders; `None` when held to expiry
    pub closing_orders: Option<LegOrders>,
}

/// Watches one position until an exit rule fires.
pub struct ExitMonitor {
    rules: ExitRules,
    interval: Duration,
    market: Arc<dyn MarketDataGateway>,
    executor: Arc<OrderExecutor>,
    clock: Arc<dyn Clock>,
}

impl ExitMonitor {
    pub fn new(
        config: &StrategyConfig,
        market: Arc<dyn MarketDataGateway>,
        executor: Arc<OrderExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules: ExitRules::from_config(config),
            interval: config.monitor_interval(),
            market,
            executor,
            clock,
        }
    }

    /// Poll until an exit fires, closing both legs unless holding to expiry.
    pub async fn monitor_exit(&self, position: &Position) -> StrategyResult<ExitReport> {
        let instrument_key = position.sell_leg.instrument_key();
        let stop_loss = self.rules.stop_loss(position.entry_price);

        info!(
            symbol = %instrument_key,
            entry = %position.entry_price,
            %stop_loss,
            target = %self.rules.target_floor,
            cutoff = %self.rules.cutoff_time,
            "Monitoring exit"
        );

        let mut polls = 0u32;
        loop {
            let price = self
                .market
                .last_price(&instrument_key)
                .await
                .map_err(|e| StrategyError::gateway("last_price", e))?
                .last_price;
            polls += 1;

            let now = self.clock.now();
            let decision = self.rules.evaluate(price, position.entry_price, now.time());

            match decision {
                ExitDecision::Continue => {
                    debug!(%price, poll = polls, "Holding position");
                    self.clock.sleep(self.interval).await;
                }
                ExitDecision::HoldToExpiry => {
                    info!(%price, entry = %position.entry_price, "Holding till expiry");
                    return Ok(ExitReport {
                        decision,
                        entry_price: position.entry_price,
                        exit_price: price,
                        polls,
                        closing_orders: None,
                    });
                }
                _ => {
                    match decision {
                        ExitDecision::StopLoss => warn!(%price, %stop_loss, "Stop-loss hit"),
                        ExitDecision::Target => info!(%price, "Target hit"),
                        _ => info!(%price, entry = %position.entry_price, "Breakeven exit"),
                    }

                    let orders = self.executor.close_position(position).await?;
                    info!(decision = %decision, "Trade exited");

                    return Ok(ExitReport {
                        decision,
                        entry_price: position.entry_price,
                        exit_price: price,
                        polls,
                        closing_orders: Some(orders),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::exchange::{MockKiteClient, MockMarketDataGateway, TransactionType};
    use crate::strategy::expiry::ExpiryLabel;
    use crate::strategy::symbol::{OptionType, SymbolBuilder};
    use crate::utils::ManualClock;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;

    const SELL_KEY: &str = "NFO:NIFTY24JUL202522550PE";

    fn rules() -> ExitRules {
        ExitRules::from_config(&StrategyConfig::default())
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 24)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn position(entry_price: Decimal) -> Position {
        let expiry = ExpiryLabel::new(NaiveDate::from_ymd_opt(2025, 7, 24).unwrap());
        let sold = SymbolBuilder::new("NFO", "NIFTY").contract(expiry, 22550, OptionType::Put);
        let (sell, hedge) = Position::legs(sold, 300, 50).unwrap();
        Position::new(sell, hedge, entry_price)
    }

    fn monitor(
        market: Arc<dyn MarketDataGateway>,
        venue: Arc<MockKiteClient>,
        clock: Arc<ManualClock>,
    ) -> ExitMonitor {
        let executor = Arc::new(OrderExecutor::new(
            ExecutionConfig::default(),
            venue,
            clock.clone(),
        ));
        ExitMonitor::new(&StrategyConfig::default(), market, executor, clock)
    }

    #[test]
    fn test_stop_loss_is_one_and_a_half_times_entry() {
        assert_eq!(rules().stop_loss(dec!(10)), dec!(15));
        assert_eq!(rules().stop_loss(dec!(42.5)), dec!(63.75));
    }

    #[test]
    fn test_stop_loss_takes_priority_over_target() {
        // Degenerate: entry 2 -> stop 3, price 3 meets both
        let decision = rules().evaluate(dec!(3), dec!(2), time(10, 0));
        assert_eq!(decision, ExitDecision::StopLoss);
    }

    #[test]
    fn test_target_floor_inclusive() {
        assert_eq!(rules().evaluate(dec!(3), dec!(10), time(10, 0)), ExitDecision::Target);
        assert_eq!(rules().evaluate(dec!(3.05), dec!(10), time(10, 0)), ExitDecision::Continue);
    }

    #[test]
    fn test_breakeven_band_boundaries_at_cutoff() {
        let cutoff = time(15, 25);
        assert_eq!(rules().evaluate(dec!(11), dec!(10), cutoff), ExitDecision::BreakevenCutoff);
        assert_eq!(rules().evaluate(dec!(9), dec!(10), cutoff), ExitDecision::BreakevenCutoff);
        assert_eq!(rules().evaluate(dec!(11.01), dec!(10), cutoff), ExitDecision::HoldToExpiry);
        assert_eq!(rules().evaluate(dec!(8.99), dec!(10), cutoff), ExitDecision::HoldToExpiry);
    }

    #[test]
    fn test_before_cutoff_continues() {
        assert_eq!(rules().evaluate(dec!(10), dec!(10), time(15, 24)), ExitDecision::Continue);
    }

    #[test]
    fn test_closes_position() {
        assert!(ExitDecision::StopLoss.closes_position());
        assert!(ExitDecision::BreakevenCutoff.closes_position());
        assert!(!ExitDecision::HoldToExpiry.closes_position());
        assert!(!ExitDecision::Continue.closes_position());
    }

    #[tokio::test]
    async fn test_stop_loss_on_third_poll_closes_both_legs() {
        let venue = Arc::new(MockKiteClient::new());
        venue
            .script_prices(SELL_KEY, vec![dec!(8), dec!(9), dec!(16)])
            .await;
        let clock = Arc::new(ManualClock::new(at(10, 0, 0)));

        let report = monitor(venue.clone(), venue.clone(), clock.clone())
            .monitor_exit(&position(dec!(10)))
            .await
            .unwrap();

        assert_eq!(report.decision, ExitDecision::StopLoss);
        assert_eq!(report.polls, 3);
        assert_eq!(report.exit_price, dec!(16));
        assert_eq!(clock.now(), at(10, 1, 0));

        let orders = venue.orders().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].request.transaction_type, TransactionType::Buy);
        assert_eq!(orders[0].request.tradingsymbol, "NIFTY24JUL202522550PE");
        assert_eq!(orders[1].request.transaction_type, TransactionType::Sell);
        assert_eq!(orders[1].request.tradingsymbol, "NIFTY24JUL202522250PE");
    }

    #[tokio::test]
    async fn test_hold_to_expiry_places_no_orders() {
        let venue = Arc::new(MockKiteClient::new());
        venue.set_price(SELL_KEY, dec!(6)).await;
        let clock = Arc::new(ManualClock::new(at(15, 24, 0)));

        let report = monitor(venue.clone(), venue.clone(), clock.clone())
            .monitor_exit(&position(dec!(10)))
            .await
            .unwrap();

        assert_eq!(report.decision, ExitDecision::HoldToExpiry);
        assert_eq!(report.polls, 3);
        assert!(report.closing_orders.is_none());
        assert!(venue.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_breakeven_at_cutoff_closes() {
        let venue = Arc::new(MockKiteClient::new());
        venue.set_price(SELL_KEY, dec!(10.5)).await;
        let clock = Arc::new(ManualClock::new(at(15, 25, 0)));

        let report = monitor(venue.clone(), venue.clone(), clock)
            .monitor_exit(&position(dec!(10)))
            .await
            .unwrap();

        assert_eq!(report.decision, ExitDecision::BreakevenCutoff);
        assert!(report.closing_orders.is_some());
        assert_eq!(venue.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn test_price_feed_failure_propagates() {
        let mut market = MockMarketDataGateway::new();
        market
            .expect_last_price()
            .returning(|_| Err(anyhow::anyhow!("timeout")));
        let venue = Arc::new(MockKiteClient::new());
        let clock = Arc::new(ManualClock::new(at(10, 0, 0)));

        let err = monitor(Arc::new(market), venue.clone(), clock)
            .monitor_exit(&position(dec!(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, StrategyError::Gateway { operation: "last_price", .. }));
        assert!(venue.orders().await.is_empty());
    }
}
