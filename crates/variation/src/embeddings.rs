use async_trait::async_trait;
use prompt::EndpointError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Request shape the embedding service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingApi {
    /// `POST {base}/embeddings` with `{model, input}`.
    OpenAi,
    /// `POST {base}/api/embeddings` with `{model, prompt}`.
    Ollama,
}

impl FromStr for EmbeddingApi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(EmbeddingApi::OpenAi),
            "ollama" => Ok(EmbeddingApi::Ollama),
            other => Err(format!("unknown embedding api '{other}' (expected openai|ollama)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api: EmbeddingApi,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            api: EmbeddingApi::Ollama,
            api_key: None,
            timeout_secs: 60,
        }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EndpointError>;

    fn model_name(&self) -> &str;
}

#[derive(Clone)]
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| EndpointError::Http {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.api {
            EmbeddingApi::OpenAi => format!("{base}/embeddings"),
            EmbeddingApi::Ollama => format!("{base}/api/embeddings"),
        }
    }

    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(&self, body: &B) -> Result<T, EndpointError> {
        let url = self.url();
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| EndpointError::Http { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| EndpointError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EndpointError> {
        let model = self.config.model.as_str();
        match self.config.api {
            EmbeddingApi::OpenAi => {
                let body: OpenAiResponse = self.post(&OpenAiRequest { model, input: text }).await?;
                body.data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or(EndpointError::EmptyChoices)
            }
            EmbeddingApi::Ollama => {
                let body: OllamaResponse = self.post(&OllamaRequest { model, prompt: text }).await?;
                Ok(body.embedding)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
