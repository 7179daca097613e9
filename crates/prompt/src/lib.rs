//! Prompt descriptors, rendering, completion parsing and the completion client.

pub mod llm;
pub mod parse;
pub mod retry;
pub mod style;
pub mod template;

pub use llm::{CompletionClient, EndpointConfig, EndpointError, GenerationParams, TextGenerator};
pub use parse::{ParseError, PredictedEntity, Prediction, parse_completion};
pub use retry::{RetryConfig, RetryPolicy};
pub use style::{
    CodeStyle, NlStyle, ORIGINAL_VARIATION, PromptStyle, TemplateDescriptor, builtin_variation,
    builtin_variation_ids,
};
pub use template::{PromptTemplate, RenderedPrompt, parse_schema_block};
