//! Kite Connect REST API client.

use crate::config::KiteConfig;
use crate::exchange::traits::{MarketDataGateway, OrderGateway};
use crate::exchange::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const API_VERSION: &str = "3";

/// Kite API client for market data and order management.
pub struct KiteClient {
    http: Client,
    api_key: String,
    access_token: String,
    base_url: String,
}

impl KiteClient {
    /// Create a new Kite client from configuration.
    pub fn new(config: &KiteConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether credentials for an established session are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.access_token.is_empty()
    }

    /// Attach version and session headers.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-Kite-Version", API_VERSION)
            .header(
                "Authorization",
                format!("token {}:{}", self.api_key, self.access_token),
            )
    }

    /// Unwrap the `{status, data}` envelope, surfacing venue errors.
    async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(e).with_context(|| format!("Failed to parse {} response", what));
            }
            Err(_) => anyhow::bail!("Kite API error {} on {}: {}", status, what, body),
        };

        if !status.is_success() || envelope.status != "success" {
            anyhow::bail!(
                "Kite API error {} on {}: {} ({})",
                status,
                what,
                envelope.message.unwrap_or_default(),
                envelope.error_type.unwrap_or_default()
            );
        }

        envelope
            .data
            .with_context(|| format!("Missing data in {} response", what))
    }

    // ==================== Market Data ====================

    /// Get the last traded price for an instrument key.
    #[instrument(skip(self))]
    pub async fn get_ltp(&self, instrument_key: &str) -> Result<LastPrice> {
        let url = format!(
            "{}/quote/ltp?i={}",
            self.base_url,
            urlencoding::encode(instrument_key)
        );
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .context("Failed to fetch last price")?;

        let mut quotes: HashMap<String, LastPrice> = Self::parse(response, "ltp").await?;
        quotes
            .remove(instrument_key)
            .with_context(|| format!("No quote returned for {}", instrument_key))
    }

    /// Get historical candles for an instrument token.
    #[instrument(skip(self))]
    pub async fn get_historical_data(
        &self,
        instrument_token: u64,
        from: NaiveDate,
        to: NaiveDate,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>> {
        let from = format!("{} 00:00:00", from.format("%Y-%m-%d"));
        let to = format!("{} 00:00:00", to.format("%Y-%m-%d"));
        let url = format!(
            "{}/instruments/historical/{}/{}?from={}&to={}",
            self.base_url,
            instrument_token,
            interval,
            urlencoding::encode(&from),
            urlencoding::encode(&to)
        );
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .context("Failed to fetch historical candles")?;

        let data: CandlesResponse = Self::parse(response, "historical").await?;
        debug!(count = data.candles.len(), "Fetched candles");

        data.candles.into_iter().map(Candle::from_row).collect()
    }

    // ==================== Orders ====================

    /// Place a new order.
    #[instrument(skip(self))]
    pub async fn place(&self, order: &OrderRequest) -> Result<String> {
        let url = format!("{}/orders/{}", self.base_url, order.variety.as_str());
        let quantity = order.quantity.to_string();
        let params = [
            ("tradingsymbol", order.tradingsymbol.as_str()),
            ("exchange", order.exchange.as_str()),
            ("transaction_type", order.transaction_type.as_str()),
            ("order_type", order.order_type.as_str()),
            ("quantity", quantity.as_str()),
            ("product", order.product.as_str()),
        ];

        debug!("Placing order: {:?}", order);

        let response = self
            .authorized(self.http.post(&url))
            .form(&params)
            .send()
            .await
            .context("Failed to place order")?;

        let placed: PlacedOrder = Self::parse(response, "place order").await?;
        Ok(placed.order_id)
    }

    /// Get the state history of an order; the last entry is the current state.
    #[instrument(skip(self))]
    pub async fn get_order_history(&self, order_id: &str) -> Result<Vec<OrderHistoryEntry>> {
        let url = format!("{}/orders/{}", self.base_url, order_id);
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .context("Failed to fetch order history")?;

        Self::parse(response, "order history").await
    }

    /// Get the account's positions.
    #[instrument(skip(self))]
    pub async fn get_positions(&self) -> Result<PositionsResponse> {
        let url = format!("{}/portfolio/positions", self.base_url);
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .context("Failed to fetch positions")?;

        Self::parse(response, "positions").await
    }
}

#[async_trait]
impl MarketDataGateway for KiteClient {
    async fn last_price(&self, instrument_key: &str) -> Result<LastPrice> {
        self.get_ltp(instrument_key).await
    }

    async fn historical_candles(
        &self,
        instrument_token: u64,
        from: NaiveDate,
        to: NaiveDate,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>> {
        self.get_historical_data(instrument_token, from, to, interval)
            .await
    }
}

#[async_trait]
impl OrderGateway for KiteClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        self.place(order).await
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let history = self.get_order_history(order_id).await?;
        let entry = history
            .last()
            .with_context(|| format!("Empty history for order {}", order_id))?;

        if let Some(reason) = entry.status_message.as_deref() {
            warn!(%order_id, status = ?entry.status, %reason, "Order status message");
        }

        Ok(entry.status)
    }

    async fn net_positions(&self) -> Result<Vec<NetPosition>> {
        Ok(self.get_positions().await?.net)
    }
}
