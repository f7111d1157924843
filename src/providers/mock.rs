//! In-memory backends for unit tests

use crate::core::currency::{
    BatchConvertResponse, BatchResultItem, ConversionApi, ConversionRequest, ConvertResponse,
    Currency, RatesResponse, pair_key,
};
use crate::core::error::ConversionError;
use crate::core::settings::{CurrencySettings, SettingsApi};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) struct MockConversionApi {
    rates: HashMap<String, f64>,
    convert_calls: AtomicUsize,
    batch_calls: Mutex<Vec<Vec<ConversionRequest>>>,
    pub fail_convert: AtomicBool,
    pub fail_batch: AtomicBool,
    pub fail_lookup: AtomicBool,
}

impl MockConversionApi {
    pub fn new() -> Self {
        let rates = [("EUR-USD", 1.08), ("GBP-USD", 1.25), ("JPY-USD", 0.0067), ("USD-EUR", 0.93)]
            .into_iter()
            .map(|(pair, rate)| (pair.to_string(), rate))
            .collect();
        Self {
            rates,
            convert_calls: AtomicUsize::new(0),
            batch_calls: Mutex::new(Vec::new()),
            fail_convert: AtomicBool::new(false),
            fail_batch: AtomicBool::new(false),
            fail_lookup: AtomicBool::new(false),
        }
    }

    pub fn convert_calls(&self) -> usize {
        self.convert_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> Vec<Vec<ConversionRequest>> {
        self.batch_calls.lock().unwrap().clone()
    }

    fn rate(&self, from: &str, to: &str) -> Option<f64> {
        self.rates.get(&pair_key(from, to)).copied()
    }
}

#[async_trait]
impl ConversionApi for MockConversionApi {
    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConvertResponse, ConversionError> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_convert.load(Ordering::SeqCst) {
            return Err(ConversionError::from_status(503, ""));
        }
        let rate = self
            .rate(&request.from_currency, &request.to_currency)
            .ok_or_else(|| ConversionError::invalid("Unsupported currency pair"))?;
        Ok(ConvertResponse {
            converted_amount: request.amount * rate,
            exchange_rate: rate,
            rate_timestamp: Some(Utc::now()),
            from_currency: Some(request.from_currency.clone()),
            to_currency: Some(request.to_currency.clone()),
            is_stale: false,
        })
    }

    async fn convert_batch(
        &self,
        requests: &[ConversionRequest],
    ) -> Result<BatchConvertResponse, ConversionError> {
        self.batch_calls.lock().unwrap().push(requests.to_vec());
        if self.fail_batch.load(Ordering::SeqCst) {
            return Err(ConversionError::network("connection refused"));
        }
        let results: Vec<BatchResultItem> = requests
            .iter()
            .map(|r| match self.rate(&r.from_currency, &r.to_currency) {
                Some(rate) => BatchResultItem {
                    converted_amount: Some(r.amount * rate),
                    exchange_rate: Some(rate),
                    rate_timestamp: Some(Utc::now()),
                    is_stale: false,
                    error: None,
                },
                None => BatchResultItem {
                    converted_amount: None,
                    exchange_rate: None,
                    rate_timestamp: None,
                    is_stale: false,
                    error: Some("Unsupported currency pair".to_string()),
                },
            })
            .collect();
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        Ok(BatchConvertResponse {
            total_conversions: results.len(),
            successful_conversions: results.len() - failed,
            failed_conversions: failed,
            has_errors: failed > 0,
            timestamp: Some(Utc::now()),
            results,
        })
    }

    async fn rates(
        &self,
        base_currency: &str,
        target_currencies: &[String],
    ) -> Result<RatesResponse, ConversionError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(ConversionError::network("connection refused"));
        }
        let rates = target_currencies
            .iter()
            .filter_map(|to| self.rate(base_currency, to).map(|rate| (to.clone(), rate)))
            .collect();
        Ok(RatesResponse {
            base_currency: base_currency.to_string(),
            rates,
            timestamp: Some(Utc::now()),
            success: true,
        })
    }

    async fn supported_currencies(&self) -> Result<Vec<Currency>, ConversionError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(ConversionError::network("connection refused"));
        }
        Ok(vec![Currency {
            code: "INR".to_string(),
            name: "Indian Rupee".to_string(),
            symbol: "₹".to_string(),
        }])
    }
}

pub(crate) struct MockSettingsApi {
    pub settings: CurrencySettings,
}

#[async_trait]
impl SettingsApi for MockSettingsApi {
    async fn fetch_settings(&self) -> Result<CurrencySettings, ConversionError> {
        Ok(self.settings.clone())
    }

    async fn save_settings(&self, _settings: &CurrencySettings) -> Result<(), ConversionError> {
        Ok(())
    }
}
