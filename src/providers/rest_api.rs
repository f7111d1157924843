use super::util::with_retry;
use crate::core::config::ApiConfig;
use crate::core::currency::{
    BatchConvertResponse, ConversionApi, ConversionRequest, ConvertResponse, Currency,
    RatesResponse, SupportedCurrenciesResponse,
};
use crate::core::error::ConversionError;
use crate::core::settings::{CurrencySettings, SettingsApi};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, instrument};

/// `GET /auth/settings` may wrap the preferences in a `settings` field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SettingsResponse {
    Envelope { settings: CurrencySettings },
    Bare(CurrencySettings),
}

/// HTTP client for the subscription backend's currency and settings
/// endpoints.
pub struct RestApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl RestApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder()
            .user_agent("subtrack-fx/1.0")
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ConversionError> {
        Self::new(&config.base_url, config.token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<String, ConversionError> {
        let builder = match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let response = builder.send().await?;
        let status = response.status();
        debug!(%status, url = %response.url(), "Received backend response");
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ConversionError::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, ConversionError> {
        let body = self.execute(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(error = ?e, response = %body, "Failed to parse {what} response");
            ConversionError::from(e)
        })
    }
}

#[async_trait]
impl ConversionApi for RestApiClient {
    #[instrument(name = "ConvertRequest", skip(self), fields(amount = request.amount))]
    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConvertResponse, ConversionError> {
        let builder = self.client.post(self.url("/currency/convert")).json(request);
        self.fetch_json(builder, "conversion").await
    }

    #[instrument(name = "BatchConvertRequest", skip_all, fields(size = requests.len()))]
    async fn convert_batch(
        &self,
        requests: &[ConversionRequest],
    ) -> Result<BatchConvertResponse, ConversionError> {
        let builder = self
            .client
            .post(self.url("/currency/convert/batch"))
            .json(&json!({ "conversions": requests }));
        self.fetch_json(builder, "batch conversion").await
    }

    async fn rates(
        &self,
        base_currency: &str,
        target_currencies: &[String],
    ) -> Result<RatesResponse, ConversionError> {
        let url = self.url("/currency/rates");
        let joined = target_currencies.join(",");
        let mut query = vec![("baseCurrency", base_currency)];
        if !joined.is_empty() {
            query.push(("targetCurrencies", joined.as_str()));
        }
        let (url, query) = (url.as_str(), query.as_slice());
        with_retry(
            move || self.fetch_json(self.client.get(url).query(query), "exchange rates"),
            2,
            300,
        )
        .await
    }

    async fn supported_currencies(&self) -> Result<Vec<Currency>, ConversionError> {
        let url = self.url("/currency/supported");
        let url = url.as_str();
        let response: SupportedCurrenciesResponse = with_retry(
            move || self.fetch_json(self.client.get(url), "supported currencies"),
            2,
            300,
        )
        .await?;
        Ok(response.into_currencies())
    }
}

#[async_trait]
impl SettingsApi for RestApiClient {
    async fn fetch_settings(&self) -> Result<CurrencySettings, ConversionError> {
        let response: SettingsResponse = self
            .fetch_json(self.client.get(self.url("/auth/settings")), "settings")
            .await?;
        Ok(match response {
            SettingsResponse::Envelope { settings } => settings,
            SettingsResponse::Bare(settings) => settings,
        })
    }

    async fn save_settings(&self, settings: &CurrencySettings) -> Result<(), ConversionError> {
        let builder = self.client.put(self.url("/auth/settings")).json(settings);
        self.execute(builder).await.map(|_| ())
    }
}
