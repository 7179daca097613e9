//! Similarity-gated paraphrasing and back-translation of base prompts.

pub mod cache;
pub mod embeddings;
pub mod generator;
pub mod paraphrase;
pub mod similarity;
pub mod store;

pub use cache::{CachedEmbedder, EmbeddingCache};
pub use embeddings::{Embedder, EmbeddingApi, EmbeddingClient, EmbeddingConfig};
pub use generator::{
    BasePrompt, BatchOutcome, GenerationError, GeneratorConfig, PromptOrigin, RejectedVariation, Variation,
    VariationGenerator, VariationMetadata, VariationMethod,
};
pub use paraphrase::{
    BACK_TRANSLATION_LANGUAGES, ParaphraseMode, build_instruction, build_translate_back, build_translate_to,
    language_code, strip_code_fences,
};
pub use similarity::cosine_similarity;
pub use store::{GenerationSummary, VariationStore, load_variation};
