//! Trade lifecycle for one expiry day.
//!
//! Gate on the expiry weekday, resume an existing trade if the ledger has
//! one, otherwise wait for the entry instant, evaluate the breakout against
//! the post-open candle, open the hedged short and hand it to the exit
//! monitor.

use crate::config::{Config, ExecutionConfig, StrategyConfig};
use crate::error::{StrategyError, StrategyResult};
use crate::exchange::{Candle, CandleInterval, MarketDataGateway, OrderGateway};
use crate::strategy::executor::OrderExecutor;
use crate::strategy::expiry::{compute_expiry, ExpiryLabel, HolidayCalendar};
use crate::strategy::monitor::{ExitDecision, ExitMonitor, ExitReport};
use crate::strategy::position::Position;
use crate::strategy::scanner::PositionScanner;
use crate::strategy::symbol::{OptionType, SymbolBuilder};
use crate::utils::decimal::atm_strike;
use crate::utils::{wait_until, Clock};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Where spot sits relative to the reference candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breakout {
    /// Spot above the candle high: sell a put
    Upside,
    /// Spot below the candle low: sell a call
    Downside,
    /// Spot within `[low, high]`: no trade
    Inside,
}

impl Breakout {
    /// Option type to sell for this breakout.
    pub fn option_to_sell(&self) -> Option<OptionType> {
        match self {
            Breakout::Upside => Some(OptionType::Put),
            Breakout::Downside => Some(OptionType::Call),
            Breakout::Inside => None,
        }
    }
}

/// Classify spot against the candle range; touching a boundary is not a breakout.
pub fn evaluate_breakout(spot: Decimal, candle: &Candle) -> Breakout {
    if spot > candle.high {
        Breakout::Upside
    } else if spot < candle.low {
        Breakout::Downside
    } else {
        Breakout::Inside
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Today is not the expiry weekday
    NotExpiryDay,
    /// Started at or after the cutoff with nothing to resume
    EntryWindowClosed,
    /// Spot stayed inside the reference candle
    NoBreakout {
        spot: Decimal,
        high: Decimal,
        low: Decimal,
    },
    /// Both legs closed
    Exited(ExitReport),
    /// Left open to expire
    HeldToExpiry(ExitReport),
}

impl RunOutcome {
    /// Whether any trade was monitored this run.
    pub fn traded(&self) -> bool {
        matches!(self, RunOutcome::Exited(_) | RunOutcome::HeldToExpiry(_))
    }
}

/// Orchestrates the whole lifecycle against the configured gateways.
pub struct StrategyEngine {
    config: StrategyConfig,
    execution: ExecutionConfig,
    symbols: SymbolBuilder,
    holidays: HolidayCalendar,
    market: Arc<dyn MarketDataGateway>,
    clock: Arc<dyn Clock>,
    scanner: PositionScanner,
    executor: Arc<OrderExecutor>,
    monitor: ExitMonitor,
}

impl StrategyEngine {
    pub fn new(
        config: &Config,
        market: Arc<dyn MarketDataGateway>,
        orders: Arc<dyn OrderGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let strategy = config.strategy.clone();
        let executor = Arc::new(OrderExecutor::new(
            config.execution.clone(),
            orders.clone(),
            clock.clone(),
        ));

        Self {
            symbols: SymbolBuilder::new(strategy.segment.clone(), strategy.underlying.clone()),
            holidays: HolidayCalendar::new(strategy.holidays.iter().copied()),
            scanner: PositionScanner::new(&strategy, market.clone(), orders),
            monitor: ExitMonitor::new(&strategy, market.clone(), executor.clone(), clock.clone()),
            execution: config.execution.clone(),
            config: strategy,
            market,
            clock,
            executor,
        }
    }

    /// Expiry label for the week containing `today`.
    pub fn expiry_for(&self, today: NaiveDate) -> ExpiryLabel {
        compute_expiry(today, self.config.expiry_weekday, &self.holidays)
    }

    /// Run one lifecycle to a terminal state.
    pub async fn run(&self) -> StrategyResult<RunOutcome> {
        let today = self.clock.now().date();
        if today.weekday() != self.config.expiry_weekday {
            info!(%today, weekday = ?today.weekday(), "Not expiry day. Exiting.");
            return Ok(RunOutcome::NotExpiryDay);
        }

        if let Some(position) = self.scanner.detect_existing_trade().await? {
            info!("Resuming monitoring of existing position");
            return self.monitor(position).await;
        }

        if self.clock.now().time() >= self.config.cutoff_time {
            warn!(cutoff = %self.config.cutoff_time, "Entry window closed. No trade today.");
            return Ok(RunOutcome::EntryWindowClosed);
        }

        let entry_time = self.config.entry_time;
        info!(%entry_time, "Waiting for entry window");
        wait_until(
            self.clock.as_ref(),
            self.config.entry_poll(),
            None,
            |now| now.time() >= entry_time,
        )
        .await;

        let spot = self
            .market
            .last_price(&self.config.index_instrument)
            .await
            .map_err(|e| StrategyError::gateway("last_price", e))?;
        let candle = self.breakout_candle(spot.instrument_token, today).await?;

        let breakout = evaluate_breakout(spot.last_price, &candle);
        info!(
            spot = %spot.last_price,
            high = %candle.high,
            low = %candle.low,
            breakout = ?breakout,
            "Evaluated breakout"
        );

        let Some(option_type) = breakout.option_to_sell() else {
            info!("No breakout. No trade today.");
            return Ok(RunOutcome::NoBreakout {
                spot: spot.last_price,
                high: candle.high,
                low: candle.low,
            });
        };

        let position = self.enter(today, spot.last_price, option_type).await?;
        self.monitor(position).await
    }

    /// The candle following the opening candle of `today`.
    async fn breakout_candle(&self, instrument_token: u64, today: NaiveDate) -> StrategyResult<Candle> {
        let candles = self
            .market
            .historical_candles(
                instrument_token,
                today,
                today + ChronoDuration::days(1),
                CandleInterval::FifteenMinute,
            )
            .await
            .map_err(|e| StrategyError::gateway("historical_candles", e))?;

        let index = self.config.breakout_candle_index;
        let available = candles.len();
        candles
            .into_iter()
            .nth(index)
            .ok_or(StrategyError::CandleUnavailable { index, available })
    }

    /// Open the hedged short at the ATM strike and read back its entry price.
    async fn enter(
        &self,
        today: NaiveDate,
        spot: Decimal,
        option_type: OptionType,
    ) -> StrategyResult<Position> {
        let expiry = self.expiry_for(today);
        let invalid_spot =
            || StrategyError::gateway("last_price", anyhow::anyhow!("invalid spot price {}", spot));

        let strike = atm_strike(spot, self.config.strike_step).ok_or_else(invalid_spot)?;
        let sold = self.symbols.contract(expiry, strike, option_type);
        let (sell_leg, hedge_leg) =
            Position::legs(sold, self.config.hedge_offset, self.config.lot_size)
                .ok_or_else(invalid_spot)?;

        self.executor.open_position(&sell_leg, &hedge_leg).await?;
        self.clock.sleep(self.execution.fill_settle()).await;

        let entry_price = self
            .market
            .last_price(&sell_leg.instrument_key())
            .await
            .map_err(|e| StrategyError::gateway("last_price", e))?
            .last_price;

        info!(
            sell = %sell_leg.instrument_key(),
            hedge = %hedge_leg.instrument_key(),
            %entry_price,
            "Trade placed"
        );

        Ok(Position::new(sell_leg, hedge_leg, entry_price))
    }

    async fn monitor(&self, position: Position) -> StrategyResult<RunOutcome> {
        let report = self.monitor.monitor_exit(&position).await?;
        Ok(match report.decision {
            ExitDecision::HoldToExpiry => RunOutcome::HeldToExpiry(report),
            _ => RunOutcome::Exited(report),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockKiteClient, TransactionType};
    use crate::utils::ManualClock;
    use chrono::{DateTime, NaiveDateTime};
    use rust_decimal_macros::dec;

    const INDEX: &str = "NSE:NIFTY 50";
    const INDEX_TOKEN: u64 = 256265;

    fn candle(high: Decimal, low: Decimal) -> Candle {
        Candle {
            timestamp: DateTime::parse_from_rfc3339("2025-07-24T09:30:00+05:30").unwrap(),
            open: low,
            high,
            low,
            close: high,
            volume: 0,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    async fn venue_with_candles(spot: Decimal) -> Arc<MockKiteClient> {
        let venue = Arc::new(MockKiteClient::new());
        venue.set_instrument_token(INDEX, INDEX_TOKEN).await;
        venue.set_price(INDEX, spot).await;
        venue
            .set_candles(
                INDEX_TOKEN,
                vec![candle(dec!(22450), dec!(22380)), candle(dec!(22500), dec!(22420))],
            )
            .await;
        venue
    }

    fn engine(venue: Arc<MockKiteClient>, clock: Arc<ManualClock>) -> StrategyEngine {
        StrategyEngine::new(&Config::default(), venue.clone(), venue, clock)
    }

    #[test]
    fn test_breakout_boundaries_are_inside() {
        let c = candle(dec!(22500), dec!(22420));
        assert_eq!(evaluate_breakout(dec!(22500), &c), Breakout::Inside);
        assert_eq!(evaluate_breakout(dec!(22420), &c), Breakout::Inside);
        assert_eq!(evaluate_breakout(dec!(22500.05), &c), Breakout::Upside);
        assert_eq!(evaluate_breakout(dec!(22419.95), &c), Breakout::Downside);
    }

    #[test]
    fn test_breakout_option_mapping() {
        assert_eq!(Breakout::Upside.option_to_sell(), Some(OptionType::Put));
        assert_eq!(Breakout::Downside.option_to_sell(), Some(OptionType::Call));
        assert_eq!(Breakout::Inside.option_to_sell(), None);
    }

    #[tokio::test]
    async fn test_not_expiry_day_does_nothing() {
        let venue = Arc::new(MockKiteClient::new());
        // Wednesday
        let clock = Arc::new(ManualClock::new(at(2025, 7, 23, 9, 0)));

        let outcome = engine(venue.clone(), clock).run().await.unwrap();

        assert_eq!(outcome, RunOutcome::NotExpiryDay);
        assert!(venue.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_spot_inside_candle_is_no_trade() {
        let venue = venue_with_candles(dec!(22500)).await;
        let clock = Arc::new(ManualClock::new(at(2025, 7, 24, 9, 20)));

        let outcome = engine(venue.clone(), clock.clone()).run().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::NoBreakout {
                spot: dec!(22500),
                high: dec!(22500),
                low: dec!(22420)
            }
        );
        assert!(!outcome.traded());
        assert_eq!(clock.now(), at(2025, 7, 24, 9, 30));
        assert!(venue.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_downside_breakout_sells_call_with_higher_hedge() {
        let venue = venue_with_candles(dec!(22390)).await;
        venue
            .script_prices("NFO:NIFTY24JUL202522400CE", vec![dec!(40), dec!(2.5)])
            .await;
        let clock = Arc::new(ManualClock::new(at(2025, 7, 24, 9, 30)));

        let outcome = engine(venue.clone(), clock).run().await.unwrap();

        let RunOutcome::Exited(report) = outcome else {
            panic!("expected exit, got {:?}", outcome);
        };
        assert_eq!(report.decision, ExitDecision::Target);
        assert_eq!(report.entry_price, dec!(40));

        let orders = venue.orders().await;
        assert_eq!(orders[0].request.tradingsymbol, "NIFTY24JUL202522400CE");
        assert_eq!(orders[0].request.transaction_type, TransactionType::Sell);
        assert_eq!(orders[1].request.tradingsymbol, "NIFTY24JUL202522700CE");
        assert_eq!(orders[1].request.transaction_type, TransactionType::Buy);
    }

    #[tokio::test]
    async fn test_missing_breakout_candle_is_error() {
        let venue = Arc::new(MockKiteClient::new());
        venue.set_instrument_token(INDEX, INDEX_TOKEN).await;
        venue.set_price(INDEX, dec!(22550)).await;
        venue
            .set_candles(INDEX_TOKEN, vec![candle(dec!(22450), dec!(22380))])
            .await;
        let clock = Arc::new(ManualClock::new(at(2025, 7, 24, 9, 30)));

        let err = engine(venue.clone(), clock).run().await.unwrap_err();

        assert!(matches!(err, StrategyError::CandleUnavailable { index: 1, available: 1 }));
        assert!(venue.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_after_cutoff_without_position_skips_entry() {
        let venue = venue_with_candles(dec!(22550)).await;
        let clock = Arc::new(ManualClock::new(at(2025, 7, 24, 15, 26)));

        let outcome = engine(venue.clone(), clock).run().await.unwrap();

        assert_eq!(outcome, RunOutcome::EntryWindowClosed);
        assert!(venue.orders().await.is_empty());
    }

    #[test]
    fn test_expiry_for_uses_holiday_calendar() {
        let venue = Arc::new(MockKiteClient::new());
        let clock = Arc::new(ManualClock::new(at(2025, 7, 14, 9, 0)));
        let engine = engine(venue, clock);

        let label = engine.expiry_for(NaiveDate::from_ymd_opt(2025, 7, 14).unwrap());
        assert_eq!(label.to_string(), "16JUL2025");
    }
}
