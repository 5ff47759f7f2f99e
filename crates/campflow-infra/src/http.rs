//! HTTP adapters for the generator and the ads-platform publisher.
//!
//! Both POST JSON to a configured endpoint and expect a JSON document back.
//! Transport failures map to retryable [`CallError`]s; the retry and
//! timeout policy itself lives in the workflow layer.

use std::time::Duration;

use campflow_core::external::generator::{GenerationRequest, Generator};
use campflow_core::external::publisher::CampaignPublisher;
use campflow_types::config::{GeneratorSettings, PublisherSettings};
use campflow_types::error::CallError;
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

/// Environment variable holding the generator API key.
pub const GENERATOR_API_KEY_ENV: &str = "CAMPFLOW_GENERATOR_API_KEY";

/// Environment variable holding the publisher API key.
pub const PUBLISHER_API_KEY_ENV: &str = "CAMPFLOW_PUBLISHER_API_KEY";

/// Read an API key from the environment. Empty values count as unset.
pub fn api_key_from_env(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from)
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, CallError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CallError::InvalidConfig(format!("failed to create HTTP client: {e}")))
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> CallError {
    if err.is_timeout() {
        CallError::Timeout(timeout.as_millis() as u64)
    } else if err.is_connect() {
        CallError::Connection(err.to_string())
    } else {
        CallError::Other(format!("HTTP request failed: {err}"))
    }
}

fn retry_after_ms(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1_000)
}

/// Map a non-success status to a [`CallError`].
pub fn status_error(status: u16, retry_after_ms: Option<u64>, body: &str) -> CallError {
    match status {
        429 => CallError::RateLimited { retry_after_ms },
        500..=599 => CallError::Gateway(status),
        401 | 403 => CallError::InvalidConfig(format!("HTTP {status}: authentication rejected")),
        _ => CallError::Other(format!("HTTP {status}: {body}")),
    }
}

/// POST `body` and decode a JSON response.
async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: Option<&SecretString>,
    timeout: Duration,
    body: &B,
) -> Result<Value, CallError> {
    let mut request = client
        .post(endpoint)
        .header("content-type", "application/json")
        .json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key.expose_secret());
    }

    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = retry_after_ms(&response);
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status.as_u16(), retry_after, &body));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| CallError::Malformed(format!("failed to parse response: {e}")))
}

// ---------------------------------------------------------------------------
// HttpGenerator
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GeneratePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    task: campflow_core::external::generator::GenerationTask,
    instruction: &'a str,
    context: &'a Value,
    temperature: f32,
}

/// Generator backed by a JSON-over-HTTP endpoint.
///
/// The API key is a [`SecretString`] and only exposed when building the
/// `Authorization` header. No `Debug` impl.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: Option<String>,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: Option<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, CallError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.into(),
            model,
            api_key,
            timeout,
        })
    }

    /// Build from config. Fails when no endpoint is configured.
    pub fn from_settings(settings: &GeneratorSettings, timeout: Duration) -> Result<Self, CallError> {
        let endpoint = settings.endpoint.clone().ok_or_else(|| {
            CallError::InvalidConfig("generator.endpoint is not set in config.toml".into())
        })?;
        Self::new(
            endpoint,
            settings.model.clone(),
            api_key_from_env(GENERATOR_API_KEY_ENV),
            timeout,
        )
    }
}

impl Generator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, CallError> {
        let payload = GeneratePayload {
            model: self.model.as_deref(),
            task: request.task,
            instruction: &request.instruction,
            context: &request.context,
            temperature: request.temperature,
        };
        tracing::debug!(task = request.task.label(), endpoint = %self.endpoint, "generation request");

        let value = post_json(
            &self.client,
            &self.endpoint,
            self.api_key.as_ref(),
            self.timeout,
            &payload,
        )
        .await?;

        // Endpoints may wrap the document in a `result` envelope.
        match value {
            Value::Object(mut object) if object.len() == 1 && object.contains_key("result") => {
                Ok(object.remove("result").unwrap_or(Value::Null))
            }
            other => Ok(other),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpPublisher
// ---------------------------------------------------------------------------

/// Ads-platform publisher backed by a JSON-over-HTTP endpoint.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpPublisher {
    /// Build from config. `None` when no publish endpoint is configured.
    pub fn from_settings(
        settings: &PublisherSettings,
        timeout: Duration,
    ) -> Result<Option<Self>, CallError> {
        let Some(endpoint) = settings.endpoint.clone() else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: build_client(timeout)?,
            endpoint,
            api_key: api_key_from_env(PUBLISHER_API_KEY_ENV),
            timeout,
        }))
    }
}

impl CampaignPublisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    fn publish<'a>(&'a self, config: &'a Value) -> BoxFuture<'a, Result<Value, CallError>> {
        Box::pin(async move {
            tracing::debug!(endpoint = %self.endpoint, "publishing campaign config");
            post_json(
                &self.client,
                &self.endpoint,
                self.api_key.as_ref(),
                self.timeout,
                config,
            )
            .await
        })
    }
}
