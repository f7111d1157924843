//! Currency conversion types and the backend abstraction

use crate::core::error::ConversionError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Rates older than this are flagged as stale.
pub const STALE_AFTER_HOURS: i64 = 24;

/// Identifies one unit of cacheable work. Equality on the amount is bitwise,
/// with `-0.0` folded into `0.0`.
#[derive(Debug, Clone)]
pub struct ConversionKey {
    pub amount: f64,
    pub from: String,
    pub to: String,
}

impl ConversionKey {
    pub fn new(amount: f64, from: &str, to: &str) -> Self {
        Self {
            amount: if amount == 0.0 { 0.0 } else { amount },
            from: from.to_uppercase(),
            to: to.to_uppercase(),
        }
    }

    pub fn pair(&self) -> String {
        pair_key(&self.from, &self.to)
    }

    pub fn request(&self) -> ConversionRequest {
        ConversionRequest {
            amount: self.amount,
            from_currency: self.from.clone(),
            to_currency: self.to.clone(),
        }
    }
}

impl PartialEq for ConversionKey {
    fn eq(&self, other: &Self) -> bool {
        self.amount.to_bits() == other.amount.to_bits()
            && self.from == other.from
            && self.to == other.to
    }
}

impl Eq for ConversionKey {}

impl Hash for ConversionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.amount.to_bits().hash(state);
        self.from.hash(state);
        self.to.hash(state);
    }
}

impl Display for ConversionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.amount, self.from, self.to)
    }
}

pub fn pair_key(from: &str, to: &str) -> String {
    format!("{}-{}", from.to_uppercase(), to.to_uppercase())
}

/// Urgency of a single conversion; selects its debounce delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Priority::High => "high",
                Priority::Normal => "normal",
                Priority::Low => "low",
            }
        )
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(anyhow::anyhow!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub amount: f64,
    pub from_currency: String,
    pub to_currency: String,
}

/// Wire shape of `POST /currency/convert`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub converted_amount: f64,
    pub exchange_rate: f64,
    pub rate_timestamp: Option<DateTime<Utc>>,
    pub from_currency: Option<String>,
    pub to_currency: Option<String>,
    #[serde(default)]
    pub is_stale: bool,
}

/// One entry of a batch response; failed entries carry `error` instead of
/// an amount.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResultItem {
    pub converted_amount: Option<f64>,
    pub exchange_rate: Option<f64>,
    pub rate_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_stale: bool,
    pub error: Option<String>,
}

/// Wire shape of `POST /currency/convert/batch`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConvertResponse {
    pub results: Vec<BatchResultItem>,
    #[serde(default)]
    pub total_conversions: usize,
    #[serde(default)]
    pub successful_conversions: usize,
    #[serde(default)]
    pub failed_conversions: usize,
    #[serde(default)]
    pub has_errors: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedAmount {
    pub original_amount: f64,
    pub original_currency: String,
    pub converted_amount: f64,
    pub converted_currency: String,
    pub exchange_rate: f64,
    pub is_stale: bool,
    pub timestamp: DateTime<Utc>,
}

impl ConvertedAmount {
    pub fn from_response(request: &ConversionRequest, response: &ConvertResponse) -> Self {
        Self::build(
            request,
            response.converted_amount,
            response.exchange_rate,
            response.rate_timestamp,
            response.is_stale,
        )
    }

    /// `None` when the backend reported a per-entry failure.
    pub fn from_batch_item(request: &ConversionRequest, item: &BatchResultItem) -> Option<Self> {
        if item.error.is_some() {
            return None;
        }
        Some(Self::build(
            request,
            item.converted_amount?,
            item.exchange_rate?,
            item.rate_timestamp,
            item.is_stale,
        ))
    }

    fn build(
        request: &ConversionRequest,
        converted_amount: f64,
        exchange_rate: f64,
        rate_timestamp: Option<DateTime<Utc>>,
        reported_stale: bool,
    ) -> Self {
        let now = Utc::now();
        let timestamp = rate_timestamp.unwrap_or(now);
        Self {
            original_amount: request.amount,
            original_currency: request.from_currency.clone(),
            converted_amount,
            converted_currency: request.to_currency.clone(),
            exchange_rate,
            is_stale: reported_stale || is_rate_stale(timestamp, now),
            timestamp,
        }
    }
}

pub fn is_rate_stale(rate_timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - rate_timestamp > Duration::hours(STALE_AFTER_HOURS)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub symbol: String,
}

impl Currency {
    fn major(code: &str, name: &str, symbol: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

/// Used whenever the supported list cannot be fetched.
pub fn fallback_currencies() -> Vec<Currency> {
    vec![
        Currency::major("USD", "US Dollar", "$"),
        Currency::major("EUR", "Euro", "€"),
        Currency::major("GBP", "British Pound", "£"),
        Currency::major("JPY", "Japanese Yen", "¥"),
        Currency::major("CAD", "Canadian Dollar", "C$"),
        Currency::major("AUD", "Australian Dollar", "A$"),
    ]
}

/// `GET /currency/supported` returns either a bare list or an envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SupportedCurrenciesResponse {
    List(Vec<Currency>),
    Envelope { currencies: Vec<Currency> },
}

impl SupportedCurrenciesResponse {
    pub fn into_currencies(self) -> Vec<Currency> {
        match self {
            SupportedCurrenciesResponse::List(list) => list,
            SupportedCurrenciesResponse::Envelope { currencies } => currencies,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatesResponse {
    pub base_currency: String,
    pub rates: HashMap<String, f64>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRates {
    pub base_currency: String,
    pub rates: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// Currency endpoints of the backend.
#[async_trait]
pub trait ConversionApi: Send + Sync {
    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConvertResponse, ConversionError>;

    async fn convert_batch(
        &self,
        requests: &[ConversionRequest],
    ) -> Result<BatchConvertResponse, ConversionError>;

    async fn rates(
        &self,
        base_currency: &str,
        target_currencies: &[String],
    ) -> Result<RatesResponse, ConversionError>;

    async fn supported_currencies(&self) -> Result<Vec<Currency>, ConversionError>;
}
