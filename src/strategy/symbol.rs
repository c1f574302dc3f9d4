//! Option contract naming.
//!
//! Symbols follow `<segment>:<underlying><expiry><strike><CE|PE>`, e.g.
//! `NFO:NIFTY17JUL202522550CE`. The builder and the parser share one grammar
//! so a symbol produced here always parses back to the same contract.

use super::expiry::ExpiryLabel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionType {
    pub fn suffix(&self) -> &'static str {
        match self {
            OptionType::Call => "CE",
            OptionType::Put => "PE",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "CE" => Some(OptionType::Call),
            "PE" => Some(OptionType::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A single tradable option contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionContract {
    pub segment: String,
    pub underlying: String,
    pub expiry: ExpiryLabel,
    pub strike: u32,
    pub option_type: OptionType,
}

impl OptionContract {
    /// Venue tradingsymbol, without the segment prefix.
    pub fn tradingsymbol(&self) -> String {
        format!(
            "{}{}{}{}",
            self.underlying, self.expiry, self.strike, self.option_type
        )
    }

    /// Market data key, with the segment prefix.
    pub fn instrument_key(&self) -> String {
        format!("{}:{}", self.segment, self.tradingsymbol())
    }

    /// Same-type contract `offset` points further out of the money.
    ///
    /// Puts move down, calls move up. `None` if a put strike would go negative.
    pub fn further_otm(&self, offset: u32) -> Option<Self> {
        let strike = match self.option_type {
            OptionType::Put => self.strike.checked_sub(offset)?,
            OptionType::Call => self.strike.checked_add(offset)?,
        };
        Some(Self {
            strike,
            ..self.clone()
        })
    }
}

impl fmt::Display for OptionContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.instrument_key())
    }
}

/// Why a tradingsymbol did not parse as one of our contracts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolParseError {
    #[error("{0:?} does not match the option symbol grammar")]
    Grammar(String),
    #[error("invalid expiry {0:?}")]
    Expiry(String),
    #[error("invalid strike {0:?}")]
    Strike(String),
}

/// Builds and parses option symbols for one underlying on one segment.
#[derive(Debug, Clone)]
pub struct SymbolBuilder {
    segment: String,
    underlying: String,
    pattern: Regex,
}

impl SymbolBuilder {
    pub fn new(segment: impl Into<String>, underlying: impl Into<String>) -> Self {
        let segment = segment.into();
        let underlying = underlying.into();
        let pattern = Regex::new(&format!(
            r"^(?:{}:)?{}(?P<expiry>\d{{2}}[A-Z]{{3}}\d{{4}})(?P<strike>\d+)(?P<kind>CE|PE)$",
            regex::escape(&segment),
            regex::escape(&underlying)
        ))
        .expect("escaped symbol grammar is a valid regex");

        Self {
            segment,
            underlying,
            pattern,
        }
    }

    pub fn underlying(&self) -> &str {
        &self.underlying
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Contract for `(expiry, strike, option_type)` on this underlying.
    pub fn contract(
        &self,
        expiry: ExpiryLabel,
        strike: u32,
        option_type: OptionType,
    ) -> OptionContract {
        OptionContract {
            segment: self.segment.clone(),
            underlying: self.underlying.clone(),
            expiry,
            strike,
            option_type,
        }
    }

    /// Full instrument key, e.g. `NFO:NIFTY17JUL202522550CE`.
    pub fn build_option_symbol(
        &self,
        expiry: ExpiryLabel,
        strike: u32,
        option_type: OptionType,
    ) -> String {
        self.contract(expiry, strike, option_type).instrument_key()
    }

    /// Parse a tradingsymbol (segment prefix optional) back into a contract.
    pub fn parse(&self, symbol: &str) -> Result<OptionContract, SymbolParseError> {
        let captures = self
            .pattern
            .captures(symbol)
            .ok_or_else(|| SymbolParseError::Grammar(symbol.to_string()))?;

        let expiry_str = &captures["expiry"];
        let expiry = ExpiryLabel::parse(expiry_str)
            .ok_or_else(|| SymbolParseError::Expiry(expiry_str.to_string()))?;

        let strike_str = &captures["strike"];
        let strike = strike_str
            .parse::<u32>()
            .map_err(|_| SymbolParseError::Strike(strike_str.to_string()))?;

        let option_type = OptionType::from_suffix(&captures["kind"])
            .ok_or_else(|| SymbolParseError::Grammar(symbol.to_string()))?;

        Ok(self.contract(expiry, strike, option_type))
    }
}
