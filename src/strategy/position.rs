//! Two-leg hedged short option position.

use super::symbol::OptionContract;
use crate::exchange::{OrderRequest, TransactionType};
use rust_decimal::Decimal;

/// One side of the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeLeg {
    contract: OptionContract,
    transaction_type: TransactionType,
    quantity: u32,
}

impl TradeLeg {
    pub fn new(contract: OptionContract, transaction_type: TransactionType, quantity: u32) -> Self {
        Self {
            contract,
            transaction_type,
            quantity,
        }
    }

    pub fn contract(&self) -> &OptionContract {
        &self.contract
    }

    pub fn tradingsymbol(&self) -> String {
        self.contract.tradingsymbol()
    }

    pub fn instrument_key(&self) -> String {
        self.contract.instrument_key()
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Market order that opens this leg.
    pub fn open_order(&self) -> OrderRequest {
        OrderRequest::market(
            self.tradingsymbol(),
            self.contract.segment.clone(),
            self.transaction_type,
            self.quantity,
        )
    }

    /// Market order that flattens this leg.
    pub fn close_order(&self) -> OrderRequest {
        OrderRequest::market(
            self.tradingsymbol(),
            self.contract.segment.clone(),
            self.transaction_type.reverse(),
            self.quantity,
        )
    }
}

/// Short option hedged by a long option of the same type further OTM.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub sell_leg: TradeLeg,
    pub hedge_leg: TradeLeg,
    pub entry_price: Decimal,
}

impl Position {
    /// Legs for shorting `sold` with a hedge `hedge_offset` points further out.
    ///
    /// Both legs carry `lot_size`; `None` if the hedge strike does not exist.
    pub fn legs(
        sold: OptionContract,
        hedge_offset: u32,
        lot_size: u32,
    ) -> Option<(TradeLeg, TradeLeg)> {
        let hedge = sold.further_otm(hedge_offset)?;
        Some((
            TradeLeg::new(sold, TransactionType::Sell, lot_size),
            TradeLeg::new(hedge, TransactionType::Buy, lot_size),
        ))
    }

    pub fn new(sell_leg: TradeLeg, hedge_leg: TradeLeg, entry_price: Decimal) -> Self {
        Self {
            sell_leg,
            hedge_leg,
            entry_price,
        }
    }
}
