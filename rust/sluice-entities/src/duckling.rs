//! HTTP client for a Duckling parsing server.
//!
//! Duckling is queried with a form-encoded POST and answers with a JSON
//! list of raw entities. Some inputs are known to stall it, so every request
//! carries a short timeout. A timed-out hypothesis is answered with no
//! entities rather than failing the turn; every other failure is surfaced
//! as [`NluError::External`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sluice_core::NluError;
use tracing::{debug, error, warn};
use url::Url;

use crate::{EntityService, ParseQuery, RawEntity};

const SERVICE: &str = "duckling";

/// Configuration for [`DucklingClient`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DucklingConfig {
    /// Full address of the parse endpoint.
    pub url: String,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DucklingConfig {
    fn default() -> Self {
        Self {
            url: "http://0.0.0.0:8000/parse".into(),
            timeout_ms: 500,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DucklingClient {
    client: reqwest::Client,
    url: Url,
    config: DucklingConfig,
}

impl DucklingClient {
    pub fn new(config: DucklingConfig) -> Result<Self, NluError> {
        let url = Url::parse(&config.url).map_err(|error| {
            NluError::Configuration(format!("invalid duckling url '{}': {error}", config.url))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| NluError::Configuration(format!("cannot build http client: {error}")))?;

        Ok(Self {
            client,
            url,
            config,
        })
    }

    pub fn config(&self) -> &DucklingConfig {
        &self.config
    }

    fn form(query: &ParseQuery) -> Result<Vec<(&'static str, String)>, NluError> {
        let mut form = vec![
            ("text", query.text.clone()),
            ("locale", query.locale.clone()),
            ("tz", query.timezone.clone()),
            ("dims", serde_json::to_string(&query.dimensions)?),
            ("latent", query.latent.to_string()),
        ];
        if let Some(reference_time) = query.reference_time {
            form.push(("reftime", reference_time.to_string()));
        }
        Ok(form)
    }
}

#[async_trait]
impl EntityService for DucklingClient {
    async fn parse(&self, query: &ParseQuery) -> Result<Vec<RawEntity>, NluError> {
        let form = Self::form(query)?;
        debug!(url = %self.url, text = %query.text, "querying duckling");

        let response = match self
            .client
            .post(self.url.clone())
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(failure) if failure.is_timeout() => {
                warn!(text = %query.text, "duckling timed out, treating hypothesis as empty");
                return Ok(Vec::new());
            }
            Err(failure) => {
                error!(url = %self.url, %failure, "duckling request failed");
                return Err(external(failure));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NluError::External {
                service: SERVICE.into(),
                reason: format!("responded {status}: {body}"),
            });
        }

        match response.json::<Vec<RawEntity>>().await {
            Ok(entities) => Ok(entities),
            Err(failure) if failure.is_timeout() => {
                warn!(text = %query.text, "duckling timed out, treating hypothesis as empty");
                Ok(Vec::new())
            }
            Err(failure) if failure.is_decode() => Err(NluError::InputShape(format!(
                "unreadable duckling response: {failure}"
            ))),
            Err(failure) => Err(external(failure)),
        }
    }
}

fn external(failure: reqwest::Error) -> NluError {
    let reason = if failure.is_connect() {
        format!("connection failed: {failure}")
    } else if failure.is_request() {
        format!("request failed: {failure}")
    } else {
        failure.to_string()
    };

    NluError::External {
        service: SERVICE.into(),
        reason,
    }
}
