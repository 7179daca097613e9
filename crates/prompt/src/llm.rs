use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("endpoint returned no choices")]
    EmptyChoices,

    #[error("failed to decode endpoint response: {0}")]
    Decode(String),
}

/// Where the OpenAI-compatible completion service lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    /// Never written to run logs.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: None,
            model: "default".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.0,
            stop: Vec::new(),
        }
    }
}

impl GenerationParams {
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

/// Anything that turns a prompt into a completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, EndpointError>;

    fn model_name(&self) -> &str;
}

#[derive(Clone)]
pub struct CompletionClient {
    config: EndpointConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl CompletionClient {
    pub fn new(config: EndpointConfig) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| EndpointError::Http {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }

    /// `GET {base}/models`; returns the advertised model ids.
    pub async fn check_connection(&self) -> Result<Vec<String>, EndpointError> {
        let url = self.url("models");
        let response = self
            .authorize(self.client.get(&url).timeout(Duration::from_secs(10)))
            .send()
            .await
            .map_err(|source| EndpointError::Http { url: url.clone(), source })?;

        let value: serde_json::Value = read_json(response, &url).await?;
        let models = value["data"]
            .as_array()
            .map(|data| {
                data.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(url = %url, models = ?models, "Endpoint reachable");
        Ok(models)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T, EndpointError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EndpointError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response.json().await.map_err(|source| {
        if source.is_decode() {
            EndpointError::Decode(source.to_string())
        } else {
            EndpointError::Http {
                url: url.to_string(),
                source,
            }
        }
    })
}

#[async_trait]
impl TextGenerator for CompletionClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, EndpointError> {
        let url = self.url("completions");
        let request = CompletionRequest {
            model: &self.config.model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stop: &params.stop,
        };

        tracing::debug!(
            model = self.config.model.as_str(),
            prompt_chars = prompt.len(),
            max_tokens = params.max_tokens,
            "Sending completion request"
        );

        let response = self
            .authorize(self.client.post(&url).json(&request))
            .send()
            .await
            .map_err(|source| EndpointError::Http { url: url.clone(), source })?;

        let body: CompletionResponse = read_json(response, &url).await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or(EndpointError::EmptyChoices)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
