use chrono::{DateTime, Utc};
use corpus::Granularity;
use prompt::{EndpointError, GenerationParams, PromptStyle, RetryPolicy, TextGenerator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embeddings::Embedder;
use crate::paraphrase::{
    ParaphraseMode, build_instruction, build_translate_back, build_translate_to, language_code, strip_code_fences,
};
use crate::similarity::cosine_similarity;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(
        "no candidate reached similarity {threshold} after {attempts} attempts (best {best_similarity:.4})"
    )]
    BelowThreshold {
        best_similarity: f32,
        attempts: usize,
        threshold: f32,
    },

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub similarity_threshold: f32,
    pub max_attempts: usize,
    pub temperature: f32,
    /// Translation legs run cooler than free paraphrasing.
    pub translation_temperature: f32,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.05,
            max_attempts: 3,
            temperature: 1.0,
            translation_temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

/// The run settings a base prompt was rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptOrigin {
    pub granularity: Granularity,
    pub shots_per_type: usize,
    pub seed: u64,
    pub include_schema: bool,
}

/// A rendered prompt prefix to derive variations from.
#[derive(Debug, Clone)]
pub struct BasePrompt {
    pub content: String,
    pub style: PromptStyle,
    pub origin: PromptOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariationMethod {
    Paraphrase,
    BackTranslation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationMetadata {
    pub method: VariationMethod,
    pub model: String,
    pub embedding_model: String,
    pub mode: ParaphraseMode,
    /// Pivot language of a back-translation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// The pivot-language text of a back-translation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_content: Option<String>,
    pub similarity: f32,
    pub threshold: f32,
    pub generated_at: DateTime<Utc>,
    /// Rejected candidates before this one.
    pub retry_count: usize,
    pub instruction: String,
}

/// An accepted rewrite of a base prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub name: String,
    pub style: PromptStyle,
    pub origin: PromptOrigin,
    pub content: String,
    pub metadata: VariationMetadata,
}

impl Variation {
    /// Settings that differ between this variation's base prompt and a run.
    pub fn mismatches(&self, style: PromptStyle, origin: &PromptOrigin) -> Vec<String> {
        let mut diffs = Vec::new();
        if self.style != style {
            diffs.push(format!("style {} (run uses {})", self.style, style));
        }
        if self.origin.granularity != origin.granularity {
            diffs.push(format!(
                "granularity {} (run uses {})",
                self.origin.granularity, origin.granularity
            ));
        }
        if self.origin.shots_per_type != origin.shots_per_type {
            diffs.push(format!(
                "{} shots (run uses {})",
                self.origin.shots_per_type, origin.shots_per_type
            ));
        }
        if self.origin.seed != origin.seed {
            diffs.push(format!("seed {} (run uses {})", self.origin.seed, origin.seed));
        }
        if self.origin.include_schema != origin.include_schema {
            diffs.push(format!(
                "include_schema {} (run uses {})",
                self.origin.include_schema, origin.include_schema
            ));
        }
        diffs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedVariation {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub accepted: Vec<Variation>,
    pub rejected: Vec<RejectedVariation>,
}

impl BatchOutcome {
    pub fn extend(&mut self, other: BatchOutcome) {
        self.accepted.extend(other.accepted);
        self.rejected.extend(other.rejected);
    }

    fn record(&mut self, name: String, result: Result<Variation, GenerationError>) {
        match result {
            Ok(variation) => self.accepted.push(variation),
            Err(e) => {
                tracing::error!(name = name.as_str(), error = %e, "Variation generation failed");
                self.rejected.push(RejectedVariation {
                    name,
                    error: e.to_string(),
                });
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Route<'a> {
    Paraphrase(ParaphraseMode),
    BackTranslation(&'a str),
}

struct Candidate {
    content: String,
    intermediate: Option<String>,
}

pub struct VariationGenerator<G, E> {
    generator: G,
    embedder: E,
    config: GeneratorConfig,
    retry: RetryPolicy,
}

impl<G: TextGenerator, E: Embedder> VariationGenerator<G, E> {
    pub fn new(generator: G, embedder: E, config: GeneratorConfig) -> Self {
        Self {
            generator,
            embedder,
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Paraphrase the base prompt until a candidate is similar enough, or give up.
    pub async fn generate_variation(
        &self,
        name: &str,
        base: &BasePrompt,
        mode: ParaphraseMode,
    ) -> Result<Variation, GenerationError> {
        self.gated(name, base, Route::Paraphrase(mode)).await
    }

    /// Translate the base prompt into `language` and back, under the same similarity gate.
    pub async fn generate_back_translation(
        &self,
        name: &str,
        base: &BasePrompt,
        language: &str,
    ) -> Result<Variation, GenerationError> {
        self.gated(name, base, Route::BackTranslation(language)).await
    }

    async fn gated(&self, name: &str, base: &BasePrompt, route: Route<'_>) -> Result<Variation, GenerationError> {
        let instruction = match route {
            Route::Paraphrase(mode) => build_instruction(&base.content, base.style, mode),
            Route::BackTranslation(language) => build_translate_to(&base.content, language),
        };

        let base_embedding = self
            .retry
            .retry("embed base prompt", || self.embedder.embed(&base.content))
            .await?;

        let mut best_similarity = f32::NEG_INFINITY;
        let threshold = self.config.similarity_threshold;

        for attempt in 0..self.config.max_attempts {
            let candidate = self.candidate(&instruction, route).await?;

            let similarity = if candidate.content.is_empty() {
                0.0
            } else {
                let embedding = self
                    .retry
                    .retry("embed candidate", || self.embedder.embed(&candidate.content))
                    .await?;
                cosine_similarity(&base_embedding, &embedding)
            };
            best_similarity = best_similarity.max(similarity);

            if similarity >= threshold {
                tracing::info!(
                    name,
                    route = ?route,
                    similarity,
                    attempt = attempt + 1,
                    "Accepted variation"
                );
                let (method, mode, language) = match route {
                    Route::Paraphrase(mode) => (VariationMethod::Paraphrase, mode, None),
                    Route::BackTranslation(language) => (
                        VariationMethod::BackTranslation,
                        ParaphraseMode::PreserveExamples,
                        Some(language.to_string()),
                    ),
                };
                return Ok(Variation {
                    name: name.to_string(),
                    style: base.style,
                    origin: base.origin,
                    content: candidate.content,
                    metadata: VariationMetadata {
                        method,
                        model: self.generator.model_name().to_string(),
                        embedding_model: self.embedder.model_name().to_string(),
                        mode,
                        language,
                        intermediate_content: candidate.intermediate,
                        similarity,
                        threshold,
                        generated_at: Utc::now(),
                        retry_count: attempt,
                        instruction,
                    },
                });
            }

            tracing::warn!(
                name,
                attempt = attempt + 1,
                max_attempts = self.config.max_attempts,
                similarity,
                threshold,
                "Rejected variation candidate"
            );
        }

        Err(GenerationError::BelowThreshold {
            best_similarity: if best_similarity.is_finite() { best_similarity } else { 0.0 },
            attempts: self.config.max_attempts,
            threshold,
        })
    }

    async fn candidate(&self, instruction: &str, route: Route<'_>) -> Result<Candidate, GenerationError> {
        match route {
            Route::Paraphrase(_) => {
                let params = self.params(self.config.temperature);
                let raw = self
                    .retry
                    .retry("paraphrase", || self.generator.generate(instruction, &params))
                    .await?;
                Ok(Candidate {
                    content: strip_code_fences(&raw),
                    intermediate: None,
                })
            }
            Route::BackTranslation(language) => {
                let params = self.params(self.config.translation_temperature);
                let forward = self
                    .retry
                    .retry("translate", || self.generator.generate(instruction, &params))
                    .await?;
                let intermediate = strip_code_fences(&forward);

                let back_instruction = build_translate_back(&intermediate, language);
                let back = self
                    .retry
                    .retry("translate back", || self.generator.generate(&back_instruction, &params))
                    .await?;
                Ok(Candidate {
                    content: strip_code_fences(&back),
                    intermediate: Some(intermediate),
                })
            }
        }
    }

    fn params(&self, temperature: f32) -> GenerationParams {
        GenerationParams {
            max_tokens: self.config.max_tokens,
            temperature,
            stop: Vec::new(),
        }
    }

    /// `count` paraphrases named `{prefix}_v1..`; one failure does not stop the batch.
    pub async fn generate_batch(
        &self,
        prefix: &str,
        base: &BasePrompt,
        mode: ParaphraseMode,
        count: usize,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for i in 1..=count {
            let name = format!("{prefix}_v{i}");
            let result = self.generate_variation(&name, base, mode).await;
            outcome.record(name, result);
        }

        tracing::info!(
            prefix,
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Variation batch complete"
        );
        outcome
    }

    /// One back-translation per language, named `backtrans_{code}`.
    pub async fn generate_back_translations(&self, base: &BasePrompt, languages: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for language in languages {
            let name = format!("backtrans_{}", language_code(language));
            let result = self.generate_back_translation(&name, base, language).await;
            outcome.record(name, result);
        }

        tracing::info!(
            languages = languages.len(),
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Back-translation batch complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replays scripted completions in order and keeps the prompts it was sent.
    struct ScriptedGenerator {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<(String, f32)>>,
    }

    impl ScriptedGenerator {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, EndpointError> {
            self.prompts.lock().unwrap().push((prompt.to_string(), params.temperature));
            self.replies.lock().unwrap().pop().ok_or(EndpointError::EmptyChoices)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Base embeds to (1, 0); each candidate to a unit vector at a chosen cosine.
    struct FixedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl FixedEmbedder {
        fn new(candidates: &[(&str, f32)]) -> Self {
            let mut vectors = HashMap::new();
            vectors.insert(BASE.to_string(), vec![1.0, 0.0]);
            for (text, cos) in candidates {
                vectors.insert(text.to_string(), vec![*cos, (1.0 - cos * cos).sqrt()]);
            }
            Self { vectors }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EndpointError> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| EndpointError::Decode(format!("no vector for {text}")))
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    const BASE: &str = "The text is : \"x\" . The named entities in the text:";

    fn base(style: PromptStyle) -> BasePrompt {
        BasePrompt {
            content: BASE.to_string(),
            style,
            origin: PromptOrigin {
                granularity: Granularity::Coarse,
                shots_per_type: 3,
                seed: 42,
                include_schema: true,
            },
        }
    }

    fn generator(replies: &[&str], sims: &[(&str, f32)]) -> VariationGenerator<ScriptedGenerator, FixedEmbedder> {
        VariationGenerator::new(
            ScriptedGenerator::new(replies),
            FixedEmbedder::new(sims),
            GeneratorConfig::default(),
        )
        .with_retry(RetryPolicy::new(0, 1, 1))
    }

    #[tokio::test]
    async fn test_accepted_on_third_attempt() {
        let g = generator(&["a", "b", "c"], &[("a", 0.02), ("b", 0.02), ("c", 0.10)]);

        let v = g
            .generate_variation("paraphrase_v1", &base(PromptStyle::NaturalLanguage), ParaphraseMode::PreserveExamples)
            .await
            .unwrap();

        assert_eq!(v.content, "c");
        assert_eq!(v.metadata.retry_count, 2);
        assert!((v.metadata.similarity - 0.10).abs() < 1e-4);
        assert_eq!(v.metadata.threshold, 0.05);
        assert_eq!(v.metadata.model, "scripted");
        assert_eq!(v.metadata.embedding_model, "fixed");
        assert!(v.metadata.instruction.contains(BASE));
        assert_eq!(v.metadata.method, VariationMethod::Paraphrase);
        assert_eq!(v.metadata.language, None);
        assert_eq!(v.origin.seed, 42);
    }

    #[tokio::test]
    async fn test_all_below_threshold_reports_best() {
        let g = generator(&["a", "b", "c"], &[("a", 0.01), ("b", 0.04), ("c", 0.03)]);

        let err = g
            .generate_variation("paraphrase_v1", &base(PromptStyle::Code), ParaphraseMode::PreserveExamples)
            .await
            .unwrap_err();

        match err {
            GenerationError::BelowThreshold { best_similarity, attempts, .. } => {
                assert!((best_similarity - 0.04).abs() < 1e-4);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fences_stripped_before_embedding() {
        let g = generator(&["```\nclean\n```"], &[("clean", 0.9)]);

        let v = g
            .generate_variation("v", &base(PromptStyle::Code), ParaphraseMode::AllowExampleSubstitution)
            .await
            .unwrap();

        assert_eq!(v.content, "clean");
        assert_eq!(v.metadata.retry_count, 0);
        assert_eq!(v.metadata.mode, ParaphraseMode::AllowExampleSubstitution);
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        // v1 exhausts three low candidates, v2 is accepted immediately.
        let g = generator(&["a", "a", "a", "good"], &[("a", 0.0), ("good", 0.5)]);

        let outcome = g
            .generate_batch("paraphrase", &base(PromptStyle::NaturalLanguage), ParaphraseMode::PreserveExamples, 2)
            .await;

        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].name, "paraphrase_v1");
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].name, "paraphrase_v2");
    }

    #[tokio::test]
    async fn test_back_translation_through_pivot() {
        // First round trip comes back too far from the base; the second is kept.
        let g = generator(
            &["metin bir", "drifted", "metin iki", "close"],
            &[("drifted", 0.01), ("close", 0.3)],
        );

        let v = g
            .generate_back_translation("backtrans_tu", &base(PromptStyle::NaturalLanguage), "Turkish")
            .await
            .unwrap();

        assert_eq!(v.content, "close");
        assert_eq!(v.metadata.method, VariationMethod::BackTranslation);
        assert_eq!(v.metadata.language.as_deref(), Some("Turkish"));
        assert_eq!(v.metadata.intermediate_content.as_deref(), Some("metin iki"));
        assert_eq!(v.metadata.retry_count, 1);

        let prompts = g.generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[0].0.contains("into Turkish") && prompts[0].0.contains(BASE));
        assert!(prompts[1].0.contains("metin bir") && prompts[1].0.contains("back into English"));
        assert!(prompts.iter().all(|(_, temperature)| *temperature == 0.1));
    }

    #[tokio::test]
    async fn test_back_translation_batch_names() {
        let g = generator(&["zh", "ok", "es", "ok"], &[("ok", 0.9)]);
        let languages = vec!["Chinese".to_string(), "Spanish".to_string()];

        let outcome = g.generate_back_translations(&base(PromptStyle::Code), &languages).await;

        let names: Vec<&str> = outcome.accepted.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["backtrans_ch", "backtrans_sp"]);
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn test_mismatches_name_each_setting() {
        let v = Variation {
            name: "paraphrase_v1".into(),
            style: PromptStyle::Code,
            origin: base(PromptStyle::Code).origin,
            content: BASE.into(),
            metadata: VariationMetadata {
                method: VariationMethod::Paraphrase,
                model: "m".into(),
                embedding_model: "e".into(),
                mode: ParaphraseMode::PreserveExamples,
                language: None,
                intermediate_content: None,
                similarity: 0.5,
                threshold: 0.05,
                generated_at: Utc::now(),
                retry_count: 0,
                instruction: String::new(),
            },
        };

        assert!(v.mismatches(PromptStyle::Code, &v.origin).is_empty());

        let run = PromptOrigin {
            granularity: Granularity::Fine,
            seed: 7,
            ..v.origin
        };
        let diffs = v.mismatches(PromptStyle::Code, &run);
        assert_eq!(diffs.len(), 2);
        assert!(diffs[0].starts_with("granularity coarse"));
        assert!(diffs[1].starts_with("seed 42"));
    }
}
