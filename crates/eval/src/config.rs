use anyhow::{Context, Result};
use corpus::{Granularity, IndexerConfig};
use prompt::{EndpointConfig, GenerationParams, ORIGINAL_VARIATION, PromptStyle, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use variation::{EmbeddingApi, EmbeddingConfig};

/// Which wording the prompt uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum VariationSource {
    /// A built-in descriptor variation id such as `v2_question`.
    Builtin(String),
    /// A generated variation file whose content replaces the examples.
    File(PathBuf),
}

impl VariationSource {
    /// Short name used in run file names.
    pub fn label(&self) -> String {
        match self {
            VariationSource::Builtin(id) => id.clone(),
            VariationSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "variation".to_string()),
        }
    }
}

impl Default for VariationSource {
    fn default() -> Self {
        VariationSource::Builtin(ORIGINAL_VARIATION.to_string())
    }
}

/// Everything one experiment run needs, recorded verbatim in its results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub granularity: Granularity,
    pub style: PromptStyle,
    pub variation: VariationSource,
    pub shots_per_type: usize,
    pub seed: u64,
    pub include_schema: bool,
    /// Cap on evaluated test sentences.
    pub max_test_examples: Option<usize>,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub indexer: IndexerConfig,
    pub endpoint: EndpointConfig,
    pub generation: GenerationParams,
    pub retry: RetryConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Coarse,
            style: PromptStyle::Code,
            variation: VariationSource::default(),
            shots_per_type: 3,
            seed: 42,
            include_schema: true,
            max_test_examples: None,
            data_dir: PathBuf::from("data/fewnerd"),
            output_dir: PathBuf::from("results"),
            indexer: IndexerConfig::default(),
            endpoint: EndpointConfig::default(),
            generation: GenerationParams::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn run_name(&self) -> String {
        format!(
            "{}_{}_{}_{}shot_seed{}",
            self.granularity,
            self.style.file_tag(),
            self.variation.label(),
            self.shots_per_type,
            self.seed
        )
    }
}

/// Load `.env` if present; a missing file is not an error.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }
}

pub fn endpoint_from_env() -> Result<EndpointConfig> {
    endpoint_from_lookup(|k| std::env::var(k).ok())
}

pub fn embedding_from_env() -> Result<EmbeddingConfig> {
    embedding_from_lookup(|k| std::env::var(k).ok())
}

fn endpoint_from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<EndpointConfig> {
    let defaults = EndpointConfig::default();
    Ok(EndpointConfig {
        base_url: get("CUSTOM_API_BASE_URL").unwrap_or(defaults.base_url),
        api_key: get("CUSTOM_API_KEY").filter(|k| !k.is_empty() && k != "not-needed"),
        model: get("CUSTOM_MODEL_NAME").unwrap_or(defaults.model),
        timeout_secs: match get("CUSTOM_API_TIMEOUT_SECS") {
            Some(v) => v
                .parse()
                .context("CUSTOM_API_TIMEOUT_SECS must be a whole number of seconds")?,
            None => defaults.timeout_secs,
        },
    })
}

fn embedding_from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<EmbeddingConfig> {
    let defaults = EmbeddingConfig::default();
    let api = match get("EMBEDDING_API") {
        Some(v) => v.parse::<EmbeddingApi>().map_err(anyhow::Error::msg)?,
        None => defaults.api,
    };
    Ok(EmbeddingConfig {
        base_url: get("EMBEDDING_API_BASE_URL").unwrap_or(defaults.base_url),
        model: get("EMBEDDING_MODEL").unwrap_or(defaults.model),
        api,
        api_key: get("EMBEDDING_API_KEY").filter(|k| !k.is_empty()),
        timeout_secs: defaults.timeout_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_endpoint_defaults_when_unset() {
        let config = endpoint_from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.api_key, None);
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_endpoint_from_vars() {
        let config = endpoint_from_lookup(lookup(&[
            ("CUSTOM_API_BASE_URL", "http://gpu:9000/v1"),
            ("CUSTOM_API_KEY", "not-needed"),
            ("CUSTOM_MODEL_NAME", "llama-3-8b"),
            ("CUSTOM_API_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://gpu:9000/v1");
        assert_eq!(config.api_key, None);
        assert_eq!(config.model, "llama-3-8b");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_bad_timeout_rejected() {
        assert!(endpoint_from_lookup(lookup(&[("CUSTOM_API_TIMEOUT_SECS", "soon")])).is_err());
    }

    #[test]
    fn test_embedding_api_from_vars() {
        let config = embedding_from_lookup(lookup(&[
            ("EMBEDDING_API", "openai"),
            ("EMBEDDING_MODEL", "text-embedding-3-small"),
        ]))
        .unwrap();
        assert_eq!(config.api, EmbeddingApi::OpenAi);
        assert_eq!(config.model, "text-embedding-3-small");

        assert!(embedding_from_lookup(lookup(&[("EMBEDDING_API", "grpc")])).is_err());
    }

    #[test]
    fn test_run_name() {
        let config = ExperimentConfig {
            style: PromptStyle::NaturalLanguage,
            variation: VariationSource::File(PathBuf::from("variations/paraphrase_v2.json")),
            ..Default::default()
        };
        assert_eq!(config.run_name(), "coarse_nl_paraphrase_v2_3shot_seed42");
    }
}
