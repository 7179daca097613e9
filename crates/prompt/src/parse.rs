use corpus::EntitySchema;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

use crate::style::{END, END_LINE, PromptStyle};
use crate::template::unescape_literal;

static APPEND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\w+\.append\(\s*\{\s*"(\w+)"\s*:\s*"((?:[^"\\]|\\.)*)"\s*,\s*"(\w+)"\s*:\s*"((?:[^"\\]|\\.)*)"\s*\}\s*\)"#,
    )
    .expect("append pattern is valid")
});

static SEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<0>\s*([^<]+?)\s*<5>\s*([^<]*?)\s*<1>").expect("SEL pattern is valid")
});

/// A fragment of a completion that could not become an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ParseError {
    #[error("malformed append line: {0}")]
    MalformedAppend(String),

    #[error("malformed entity segment: {0}")]
    MalformedSegment(String),

    #[error("unknown entity type '{entity_type}' for '{text}'")]
    UnknownType { entity_type: String, text: String },

    #[error("empty entity text for type '{0}'")]
    EmptyText(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredictedEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl PredictedEntity {
    pub fn new(text: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// Entities recovered from one completion, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub entities: Vec<PredictedEntity>,
    #[serde(default)]
    pub dropped: Vec<ParseError>,
}

impl Prediction {
    pub fn empty() -> Self {
        Self::default()
    }

    fn accept(&mut self, result: Result<PredictedEntity, ParseError>) {
        match result {
            Ok(entity) => self.entities.push(entity),
            Err(e) => {
                tracing::warn!(error = %e, "Dropped prediction fragment");
                self.dropped.push(e);
            }
        }
    }
}

/// Parse a raw model completion into entities. Never fails; bad fragments are dropped.
pub fn parse_completion(completion: &str, style: PromptStyle, schema: &EntitySchema) -> Prediction {
    match style {
        PromptStyle::Code => parse_code(completion, schema),
        PromptStyle::NaturalLanguage => parse_nl(completion, schema),
    }
}

fn cut_at_stops<'a>(text: &'a str, stops: &[&str]) -> &'a str {
    let end = stops
        .iter()
        .filter_map(|s| text.find(s))
        .min()
        .unwrap_or(text.len());
    &text[..end]
}

fn parse_code(completion: &str, schema: &EntitySchema) -> Prediction {
    let body = cut_at_stops(completion, &[END, END_LINE, "\ndef "]);
    let mut prediction = Prediction::empty();

    for line in body.lines().map(str::trim).filter(|l| l.contains(".append(")) {
        let result = match APPEND_RE.captures(line) {
            Some(caps) => {
                let mut text = None;
                let mut entity_type = None;
                for (key, value) in [(&caps[1], &caps[2]), (&caps[3], &caps[4])] {
                    match key {
                        "text" => text = Some(unescape_literal(value)),
                        "type" => entity_type = Some(unescape_literal(value)),
                        _ => {}
                    }
                }
                match (text, entity_type) {
                    (Some(text), Some(entity_type)) => validate(text, &entity_type, schema),
                    _ => Err(ParseError::MalformedAppend(line.to_string())),
                }
            }
            None => Err(ParseError::MalformedAppend(line.to_string())),
        };
        prediction.accept(result);
    }

    prediction
}

fn parse_nl(completion: &str, schema: &EntitySchema) -> Prediction {
    let body = cut_at_stops(completion.trim_start(), &[END_LINE.trim_start(), END, "\n"]);
    let mut prediction = Prediction::empty();
    let mut last = 0;

    // Records may be separated by ` ; ` or simply follow each other.
    for caps in SEL_RE.captures_iter(body) {
        let (Some(whole), Some(ty), Some(text)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        report_leftover(&body[last..whole.start()], &mut prediction);
        last = whole.end();

        let entity_type = ty.as_str().to_lowercase().replace(' ', "-");
        let resolved = resolve_folded(&entity_type, schema);
        prediction.accept(validate(text.as_str().to_string(), resolved, schema));
    }
    report_leftover(&body[last..], &mut prediction);

    prediction
}

/// Text between SEL records that is neither a separator nor the empty marker.
fn report_leftover(gap: &str, prediction: &mut Prediction) {
    for fragment in gap.split(';').map(str::trim).filter(|f| !f.is_empty()) {
        if fragment != "<5> <1>" {
            prediction.accept(Err(ParseError::MalformedSegment(fragment.to_string())));
        }
    }
}

/// SEL output is lowercased with spaces for dashes, so `location gpe` finds `location-GPE`.
fn resolve_folded<'a>(entity_type: &'a str, schema: &'a EntitySchema) -> &'a str {
    schema
        .type_ids()
        .find(|id| id.eq_ignore_ascii_case(entity_type))
        .unwrap_or(entity_type)
}

/// Require an exact schema type and non-empty text.
fn validate(text: String, entity_type: &str, schema: &EntitySchema) -> Result<PredictedEntity, ParseError> {
    let Some(resolved) = schema.get(entity_type) else {
        return Err(ParseError::UnknownType {
            entity_type: entity_type.to_string(),
            text,
        });
    };

    if text.trim().is_empty() {
        return Err(ParseError::EmptyText(resolved.id.clone()));
    }

    Ok(PredictedEntity::new(text, resolved.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus::Granularity;

    fn coarse() -> EntitySchema {
        EntitySchema::builtin(Granularity::Coarse)
    }

    #[test]
    fn test_code_completion() {
        let completion = "\tentity_list.append({\"text\": \"Steve Jobs\", \"type\": \"person\"})\n\
                          \tentity_list.append({\"type\": \"location\", \"text\": \"San Francisco\"})\n\
                          # END\n\
                          \tentity_list.append({\"text\": \"ignored\", \"type\": \"person\"})";
        let p = parse_completion(completion, PromptStyle::Code, &coarse());

        assert_eq!(p.entities, vec![
            PredictedEntity::new("Steve Jobs", "person"),
            PredictedEntity::new("San Francisco", "location"),
        ]);
        assert!(p.dropped.is_empty());
    }

    #[test]
    fn test_code_drops_bad_fragments() {
        let completion = "\tentity_list.append({\"text\": \"Apple\", \"type\": \"fruit\"})\n\
                          \tentity_list.append({\"text\": \"\", \"type\": \"person\"})\n\
                          \tentity_list.append({\"text\": \"Rome\"\n\
                          \tentity_list.append({\"text\": \"Rome\", \"type\": \"location\"})";
        let p = parse_completion(completion, PromptStyle::Code, &coarse());

        assert_eq!(p.entities, vec![PredictedEntity::new("Rome", "location")]);
        assert_eq!(p.dropped.len(), 3);
        assert!(matches!(p.dropped[0], ParseError::UnknownType { .. }));
        assert_eq!(p.dropped[1], ParseError::EmptyText("person".into()));
        assert!(matches!(p.dropped[2], ParseError::MalformedAppend(_)));
    }

    #[test]
    fn test_code_unescapes_text() {
        let completion = r#"entity_list.append({"text": "The \"Boss\"", "type": "person"})"#;
        let p = parse_completion(completion, PromptStyle::Code, &coarse());
        assert_eq!(p.entities[0].text, "The \"Boss\"");
    }

    #[test]
    fn test_nl_completion() {
        let completion = " <0> person <5> Steve Jobs <1> ; <0> Location <5> San Francisco <1>\n----------------------------------------\n<0> person <5> Later <1>";
        let p = parse_completion(completion, PromptStyle::NaturalLanguage, &coarse());

        assert_eq!(p.entities, vec![
            PredictedEntity::new("Steve Jobs", "person"),
            PredictedEntity::new("San Francisco", "location"),
        ]);
    }

    #[test]
    fn test_nl_empty_annotation() {
        let p = parse_completion(" <5> <1>", PromptStyle::NaturalLanguage, &coarse());
        assert!(p.entities.is_empty());
        assert!(p.dropped.is_empty());
    }

    #[test]
    fn test_nl_resolves_fine_type_case() {
        let fine = EntitySchema::builtin(Granularity::Fine);
        let p = parse_completion("<0> location GPE <5> Paris <1>", PromptStyle::NaturalLanguage, &fine);
        assert_eq!(p.entities, vec![PredictedEntity::new("Paris", "location-GPE")]);
    }

    #[test]
    fn test_nl_malformed_segment_dropped() {
        let p = parse_completion(
            "<0> person Obama ; <0> person <5> Obama <1>",
            PromptStyle::NaturalLanguage,
            &coarse(),
        );
        assert_eq!(p.entities.len(), 1);
        assert!(matches!(p.dropped[0], ParseError::MalformedSegment(_)));
    }

    #[test]
    fn test_nl_records_without_separator() {
        let p = parse_completion(
            " <0> person <5> Steve Jobs <1> <0> location <5> San Francisco <1>",
            PromptStyle::NaturalLanguage,
            &coarse(),
        );

        assert_eq!(p.entities, vec![
            PredictedEntity::new("Steve Jobs", "person"),
            PredictedEntity::new("San Francisco", "location"),
        ]);
        assert!(p.dropped.is_empty());
    }

    #[test]
    fn test_nl_text_between_records_is_dropped() {
        let p = parse_completion(
            "<0> person <5> Ann <1> and also <0> person <5> Bob <1>",
            PromptStyle::NaturalLanguage,
            &coarse(),
        );

        assert_eq!(p.entities.len(), 2);
        assert_eq!(p.dropped, vec![ParseError::MalformedSegment("and also".into())]);
    }

    #[test]
    fn test_code_type_is_case_sensitive() {
        let completion = r#"entity_list.append({"text": "Ann", "type": "Person"})"#;
        let p = parse_completion(completion, PromptStyle::Code, &coarse());

        assert!(p.entities.is_empty());
        assert!(matches!(&p.dropped[0], ParseError::UnknownType { entity_type, .. } if entity_type == "Person"));
    }

    #[test]
    fn test_garbage_is_not_fatal() {
        for style in [PromptStyle::Code, PromptStyle::NaturalLanguage] {
            let p = parse_completion("I cannot help with that.", style, &coarse());
            assert!(p.entities.is_empty());
        }
    }
}
