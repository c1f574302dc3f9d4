//! Recovery of an already open trade from the venue's position ledger.

use crate::config::{Config, StrategyConfig};
use crate::error::{StrategyError, StrategyResult};
use crate::exchange::{KiteClient, MarketDataGateway, NetPosition, OrderGateway, Product};
use crate::strategy::position::Position;
use crate::strategy::symbol::SymbolBuilder;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Detects a short leg opened by an earlier run and rebuilds its position.
pub struct PositionScanner {
    symbols: SymbolBuilder,
    lot_size: u32,
    hedge_offset: u32,
    market: Arc<dyn MarketDataGateway>,
    orders: Arc<dyn OrderGateway>,
}

impl PositionScanner {
    pub fn new(
        config: &StrategyConfig,
        market: Arc<dyn MarketDataGateway>,
        orders: Arc<dyn OrderGateway>,
    ) -> Self {
        Self {
            symbols: SymbolBuilder::new(config.segment.clone(), config.underlying.clone()),
            lot_size: config.lot_size,
            hedge_offset: config.hedge_offset,
            market,
            orders,
        }
    }

    /// Scanner reading both prices and the ledger from the venue.
    ///
    /// Read-only, so it ignores the trading mode: the paper ledger never
    /// holds a trade from an earlier process.
    pub fn for_venue(config: &Config) -> anyhow::Result<Self> {
        let client = Arc::new(KiteClient::new(&config.kite)?);
        if !client.has_credentials() {
            warn!("No Kite credentials provided. Position requests will be rejected.");
        }
        Ok(Self::new(&config.strategy, client.clone(), client))
    }

    /// Whether a ledger row looks like our short leg.
    fn is_candidate(&self, position: &NetPosition) -> bool {
        position.product == Product::Mis
            && position.quantity == -i64::from(self.lot_size)
            && position.tradingsymbol.starts_with(self.symbols.underlying())
    }

    /// Scan net positions for an active trade.
    ///
    /// The entry price of a recovered trade is the short leg's current price,
    /// not its original fill.
    pub async fn detect_existing_trade(&self) -> StrategyResult<Option<Position>> {
        let positions = self
            .orders
            .net_positions()
            .await
            .map_err(|e| StrategyError::gateway("net_positions", e))?;

        debug!(count = positions.len(), "Scanning net positions");

        for candidate in positions.iter().filter(|p| self.is_candidate(p)) {
            let sold = match self.symbols.parse(&candidate.tradingsymbol) {
                Ok(contract) => contract,
                Err(e) => {
                    warn!(
                        symbol = %candidate.tradingsymbol,
                        error = %e,
                        "Skipping position with unrecognised symbol"
                    );
                    continue;
                }
            };

            let Some((sell_leg, hedge_leg)) = Position::legs(sold, self.hedge_offset, self.lot_size)
            else {
                warn!(symbol = %candidate.tradingsymbol, "No valid hedge strike for position");
                continue;
            };

            let entry_price = self
                .market
                .last_price(&sell_leg.instrument_key())
                .await
                .map_err(|e| StrategyError::gateway("last_price", e))?
                .last_price;

            info!(
                symbol = %candidate.tradingsymbol,
                hedge = %hedge_leg.tradingsymbol(),
                %entry_price,
                ledger_average = %candidate.average_price,
                "Existing trade found"
            );

            return Ok(Some(Position::new(sell_leg, hedge_leg, entry_price)));
        }

        info!(
            underlying = %self.symbols.underlying(),
            lot_size = self.lot_size,
            "No existing trade found"
        );
        Ok(None)
    }
}
