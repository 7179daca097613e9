use prompt::PromptStyle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How far a paraphrase may stray from the base prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParaphraseMode {
    /// Only the surrounding wording changes; example texts and annotations stay verbatim.
    PreserveExamples,
    /// Example sentences may be swapped for new ones with the same annotation format.
    AllowExampleSubstitution,
}

impl ParaphraseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParaphraseMode::PreserveExamples => "preserve-examples",
            ParaphraseMode::AllowExampleSubstitution => "allow-example-substitution",
        }
    }
}

impl fmt::Display for ParaphraseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParaphraseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preserve-examples" | "preserve" => Ok(ParaphraseMode::PreserveExamples),
            "allow-example-substitution" | "substitute" => Ok(ParaphraseMode::AllowExampleSubstitution),
            other => Err(format!(
                "unknown paraphrase mode '{other}' (expected preserve-examples|allow-example-substitution)"
            )),
        }
    }
}

pub fn build_instruction(base: &str, style: PromptStyle, mode: ParaphraseMode) -> String {
    let structure_rules = match style {
        PromptStyle::Code => {
            r#"- Keep the Python structure exactly: every `def ...(input_text):` line, every `input_text = "..."` assignment, `entity_list = []` and every `entity_list.append({"text": ..., "type": ...})` call.
- Do not change the dictionary keys "text" and "type" or any entity type name.
- Only rephrase the docstrings and the `#` comments.
- Keep every `# END` line."#
        }
        PromptStyle::NaturalLanguage => {
            r#"- Keep the annotation markers `<0>`, `<5>`, `<1>` and the ` ; ` separators exactly.
- Keep every entity type name and every dashed separator line.
- Only rephrase the sentence introducing each text and the sentence introducing its entities."#
        }
    };

    let mode_rules = match mode {
        ParaphraseMode::PreserveExamples => {
            "- Every example sentence and its annotated entities must appear unchanged."
        }
        ParaphraseMode::AllowExampleSubstitution => {
            "- You may replace example sentences with new, realistic sentences, but each replacement must be annotated in the same format with correct entity spans and types."
        }
    };

    format!(
        r#"Paraphrase the following {style} prompt for Named Entity Recognition.

RULES:
{structure_rules}
{mode_rules}
- Preserve the exact same annotation task.
- Output only the paraphrased prompt, no explanations, no Markdown.

Original prompt to paraphrase:
---
{base}
---

Paraphrased prompt:"#,
        style = style.as_str(),
    )
}

/// Pivot languages used for back-translation.
pub const BACK_TRANSLATION_LANGUAGES: &[&str] = &["Chinese", "Spanish", "Turkish"];

const TRANSLATION_RULES: &str = r#"- Keep all code syntax exactly as-is (function definitions, variable names, brackets).
- Keep all JSON-like structures and the `<0>`, `<5>`, `<1>` markers exactly as-is.
- Only translate the natural language parts (docstrings, comments, instructions).
- Preserve line breaks and indentation.
- Do NOT translate entity type names like "person", "location", "organization"."#;

/// First leg of a back-translation: English into `language`.
pub fn build_translate_to(prompt: &str, language: &str) -> String {
    format!(
        r#"Translate the following English prompt into {language}.

RULES:
{TRANSLATION_RULES}

English prompt:
---
{prompt}
---

Provide only the translated prompt in {language}, nothing else."#
    )
}

/// Second leg: `language` back into English.
pub fn build_translate_back(prompt: &str, language: &str) -> String {
    format!(
        r#"Translate the following {language} prompt back into English.

RULES:
{TRANSLATION_RULES}

{language} prompt:
---
{prompt}
---

Provide only the translated prompt in English, nothing else."#
    )
}

/// `Chinese` -> `ch`; used in variation names.
pub fn language_code(language: &str) -> String {
    language.to_lowercase().chars().take(2).collect()
}

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the info string (```python) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim_end().to_string()
}
