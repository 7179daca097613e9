use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closes every code-style example block.
pub const END: &str = "# END";
/// Closes every natural-language example.
pub const END_LINE: &str = "\n----------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptStyle {
    Code,
    NaturalLanguage,
}

impl PromptStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStyle::Code => "code",
            PromptStyle::NaturalLanguage => "natural-language",
        }
    }

    /// Short tag used in file names.
    pub fn file_tag(&self) -> &'static str {
        match self {
            PromptStyle::Code => "pl",
            PromptStyle::NaturalLanguage => "nl",
        }
    }

    pub fn stop_sequences(&self) -> Vec<String> {
        match self {
            PromptStyle::Code => vec![END.to_string(), END_LINE.to_string(), "\ndef ".to_string()],
            PromptStyle::NaturalLanguage => vec![END_LINE.to_string(), END.to_string()],
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "code" | "pl" => Ok(PromptStyle::Code),
            "natural-language" | "nl" => Ok(PromptStyle::NaturalLanguage),
            other => Err(format!("unknown prompt style '{other}' (expected code|natural-language)")),
        }
    }
}

/// Wording of a function-style prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStyle {
    pub function_name: String,
    pub docstring: String,
    pub inline_comment: String,
    pub input_var: String,
    pub list_var: String,
    pub text_key: String,
    pub type_key: String,
}

impl CodeStyle {
    pub fn new(function_name: &str, docstring: &str, inline_comment: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            docstring: docstring.to_string(),
            inline_comment: inline_comment.to_string(),
            input_var: "input_text".to_string(),
            list_var: "entity_list".to_string(),
            text_key: "text".to_string(),
            type_key: "type".to_string(),
        }
    }
}

/// Wording of a prefix-style prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlStyle {
    pub input_prefix: String,
    pub input_suffix: String,
    pub entity_prompt: String,
}

impl NlStyle {
    pub fn new(input_prefix: &str, entity_prompt: &str) -> Self {
        Self {
            input_prefix: input_prefix.to_string(),
            input_suffix: ".".to_string(),
            entity_prompt: entity_prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "kebab-case")]
pub enum TemplateDescriptor {
    Code(CodeStyle),
    NaturalLanguage(NlStyle),
}

impl TemplateDescriptor {
    pub fn style(&self) -> PromptStyle {
        match self {
            TemplateDescriptor::Code(_) => PromptStyle::Code,
            TemplateDescriptor::NaturalLanguage(_) => PromptStyle::NaturalLanguage,
        }
    }

    /// The unmodified wording for a style.
    pub fn original(style: PromptStyle) -> Self {
        match style {
            PromptStyle::Code => TemplateDescriptor::Code(CodeStyle::new(
                "named_entity_recognition",
                "extract named entities from the input_text",
                "extracted named entities",
            )),
            PromptStyle::NaturalLanguage => TemplateDescriptor::NaturalLanguage(NlStyle::new(
                "The text is :",
                "The named entities in the text:",
            )),
        }
    }
}

pub const ORIGINAL_VARIATION: &str = "v0_original";

const CODE_VARIATIONS: &[(&str, &str, &str, &str)] = &[
    ("v0_original", "named_entity_recognition", "extract named entities from the input_text", "extracted named entities"),
    ("v1_formal", "extract_entities", "identify and extract all named entities present in the input text", "identified named entities"),
    ("v2_task_focused", "ner_extraction", "perform named entity recognition on the given text and return all entities", "recognized entities"),
    ("v3_concise", "get_entities", "find named entities in text", "entities found"),
    ("v4_detailed", "named_entity_extraction", "analyze the input text and extract all named entities including persons, locations, organizations and other entity types", "all extracted named entities with their types"),
    ("v5_academic", "perform_ner", "apply named entity recognition to identify and classify entity mentions in the text", "classified entity mentions"),
    ("v6_instruction", "identify_entities", "given the input text, identify all spans that refer to named entities", "named entity spans"),
];

const NL_VARIATIONS: &[(&str, &str, &str)] = &[
    ("v0_original", "The text is :", "The named entities in the text:"),
    ("v1_formal", "Input text:", "Named entities found:"),
    ("v2_question", "Given the following text:", "What are the named entities?"),
    ("v3_task", "Text for entity extraction:", "Extracted entities:"),
    ("v4_detailed", "Analyze the following sentence:", "The named entities (persons, locations, organizations, etc.) are:"),
    ("v5_concise", "Text:", "Entities:"),
];

/// Built-in wording variation by id.
pub fn builtin_variation(style: PromptStyle, id: &str) -> Option<TemplateDescriptor> {
    match style {
        PromptStyle::Code => CODE_VARIATIONS
            .iter()
            .find(|(name, ..)| *name == id)
            .map(|(_, f, d, c)| TemplateDescriptor::Code(CodeStyle::new(f, d, c))),
        PromptStyle::NaturalLanguage => NL_VARIATIONS
            .iter()
            .find(|(name, ..)| *name == id)
            .map(|(_, p, e)| TemplateDescriptor::NaturalLanguage(NlStyle::new(p, e))),
    }
}

pub fn builtin_variation_ids(style: PromptStyle) -> Vec<&'static str> {
    match style {
        PromptStyle::Code => CODE_VARIATIONS.iter().map(|(id, ..)| *id).collect(),
        PromptStyle::NaturalLanguage => NL_VARIATIONS.iter().map(|(id, ..)| *id).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_is_v0() {
        for style in [PromptStyle::Code, PromptStyle::NaturalLanguage] {
            assert_eq!(
                builtin_variation(style, ORIGINAL_VARIATION),
                Some(TemplateDescriptor::original(style))
            );
        }
    }

    #[test]
    fn test_variation_lookup() {
        assert_eq!(builtin_variation_ids(PromptStyle::Code).len(), 7);
        assert_eq!(builtin_variation_ids(PromptStyle::NaturalLanguage).len(), 6);
        assert!(builtin_variation(PromptStyle::NaturalLanguage, "v6_instruction").is_none());

        match builtin_variation(PromptStyle::Code, "v3_concise").unwrap() {
            TemplateDescriptor::Code(c) => assert_eq!(c.function_name, "get_entities"),
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn test_style_parse_accepts_file_tags() {
        assert_eq!("pl".parse::<PromptStyle>().unwrap(), PromptStyle::Code);
        assert_eq!("natural-language".parse::<PromptStyle>().unwrap(), PromptStyle::NaturalLanguage);
        assert!("yaml".parse::<PromptStyle>().is_err());
    }

    #[test]
    fn test_descriptor_serializes_with_style_tag() {
        let json = serde_json::to_value(TemplateDescriptor::original(PromptStyle::NaturalLanguage)).unwrap();
        assert_eq!(json["style"], "natural-language");
        assert_eq!(json["input_prefix"], "The text is :");
    }
}
