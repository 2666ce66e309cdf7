use crate::error::{AppError, Result};
use crate::models::{Candle, Kline};
use log::{debug, error};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Source of recent kline windows.
///
/// The controller only talks to this seam; tests substitute a canned window.
pub trait KlineSource {
    fn fetch_recent(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Candle>>> + Send;
}

/// Binance futures API client.
pub struct BinanceApi {
    client: Client,
    api_url: String,
}

impl BinanceApi {
    /// Create a new API client against fapi.binance.com.
    pub fn new() -> Result<Self> {
        Self::with_url("https://fapi.binance.com".to_string())
    }

    /// Create a new API client with a custom endpoint.
    pub fn with_url(api_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, api_url })
    }
}

impl KlineSource for BinanceApi {
    /// Fetch the most recent `limit` klines, ascending by open time.
    ///
    /// The exchange may return fewer rows than requested. No retries happen
    /// here; the external scheduler retries the whole cycle next period.
    async fn fetch_recent(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.api_url, symbol, interval, limit
        );
        debug!("Fetching recent klines: {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Failed to fetch klines for {}: {} - {}", symbol, status, text);
            return Err(AppError::ApiError(format!(
                "Failed to fetch klines for {}: {} - {}",
                symbol, status, text
            )));
        }

        let raw_klines: Vec<Vec<Value>> = response.json().await?;
        debug!("Received {} raw klines for {}", raw_klines.len(), symbol);

        let mut candles = Vec::with_capacity(raw_klines.len());
        for raw in &raw_klines {
            let kline = Kline::from_raw_kline(raw).ok_or_else(|| {
                AppError::MalformedResponse(format!(
                    "kline row does not match expected shape: {}",
                    serde_json::to_string(raw).unwrap_or_else(|_| "<unprintable>".to_string())
                ))
            })?;
            candles.push(Candle::from_kline(&kline)?);
        }

        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }
}
