use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use prompt::PromptStyle;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::generator::{BasePrompt, BatchOutcome, PromptOrigin, RejectedVariation, Variation, VariationMethod};
use crate::paraphrase::ParaphraseMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedEntry {
    pub name: String,
    pub method: VariationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub similarity: f32,
    pub retry_count: usize,
}

/// What one batch produced, written next to the variations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub base_prompt: String,
    pub style: PromptStyle,
    pub origin: PromptOrigin,
    pub mode: ParaphraseMode,
    pub threshold: f32,
    pub requested: usize,
    pub accepted: Vec<AcceptedEntry>,
    pub rejected: Vec<RejectedVariation>,
    pub generated_at: DateTime<Utc>,
}

impl GenerationSummary {
    pub fn from_outcome(
        base_prompt: &str,
        base: &BasePrompt,
        mode: ParaphraseMode,
        threshold: f32,
        outcome: &BatchOutcome,
    ) -> Self {
        Self {
            base_prompt: base_prompt.to_string(),
            style: base.style,
            origin: base.origin,
            mode,
            threshold,
            requested: outcome.accepted.len() + outcome.rejected.len(),
            accepted: outcome
                .accepted
                .iter()
                .map(|v| AcceptedEntry {
                    name: v.name.clone(),
                    method: v.metadata.method,
                    language: v.metadata.language.clone(),
                    similarity: v.metadata.similarity,
                    retry_count: v.metadata.retry_count,
                })
                .collect(),
            rejected: outcome.rejected.clone(),
            generated_at: Utc::now(),
        }
    }
}

pub struct VariationStore {
    dir: PathBuf,
}

impl VariationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub async fn save(&self, variation: &Variation) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create variation dir: {:?}", self.dir))?;

        let path = self.path_for(&variation.name);
        fs::write(&path, serde_json::to_string_pretty(variation)?)
            .await
            .with_context(|| format!("Failed to write variation: {:?}", path))?;
        Ok(path)
    }

    pub async fn save_summary(&self, summary: &GenerationSummary) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join("generation_summary.json");
        fs::write(&path, serde_json::to_string_pretty(summary)?)
            .await
            .with_context(|| format!("Failed to write summary: {:?}", path))?;
        Ok(path)
    }
}

pub async fn load_variation(path: &Path) -> Result<Variation> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read variation: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Malformed variation file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::VariationMetadata;
    use corpus::Granularity;

    fn origin() -> PromptOrigin {
        PromptOrigin {
            granularity: Granularity::Coarse,
            shots_per_type: 3,
            seed: 42,
            include_schema: true,
        }
    }

    fn variation(name: &str) -> Variation {
        Variation {
            name: name.to_string(),
            style: PromptStyle::Code,
            origin: origin(),
            content: "def f(input_text):".to_string(),
            metadata: VariationMetadata {
                method: VariationMethod::Paraphrase,
                model: "m".into(),
                embedding_model: "e".into(),
                mode: ParaphraseMode::PreserveExamples,
                language: None,
                intermediate_content: None,
                similarity: 0.42,
                threshold: 0.05,
                generated_at: Utc::now(),
                retry_count: 1,
                instruction: "paraphrase".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = VariationStore::new(dir.path().join("coarse_pl"));

        let path = store.save(&variation("paraphrase_v1")).await.unwrap();
        assert!(path.ends_with("coarse_pl/paraphrase_v1.json"));

        let loaded = load_variation(&path).await.unwrap();
        assert_eq!(loaded, variation_with_time(&loaded));
    }

    fn variation_with_time(loaded: &Variation) -> Variation {
        let mut v = variation("paraphrase_v1");
        v.metadata.generated_at = loaded.metadata.generated_at;
        v
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = BatchOutcome {
            accepted: vec![variation("p_v2")],
            rejected: vec![RejectedVariation {
                name: "p_v1".into(),
                error: "below threshold".into(),
            }],
        };
        let base = BasePrompt {
            content: "def f(input_text):".into(),
            style: PromptStyle::Code,
            origin: origin(),
        };
        let summary =
            GenerationSummary::from_outcome("coarse_pl_3shot", &base, ParaphraseMode::PreserveExamples, 0.05, &outcome);

        let path = VariationStore::new(dir.path()).save_summary(&summary).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(json["requested"], 2);
        assert_eq!(json["accepted"][0]["name"], "p_v2");
        assert_eq!(json["rejected"][0]["name"], "p_v1");
        assert_eq!(json["mode"], "preserve-examples");
        assert_eq!(json["accepted"][0]["method"], "paraphrase");
        assert_eq!(json["origin"]["granularity"], "coarse");
    }
}
