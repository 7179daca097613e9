use serde::{Deserialize, Serialize};

use crate::error::CorpusFormatError;
use crate::schema::OUTSIDE_TAG;

/// One corpus sentence: tokens and one tag index per token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<usize>,
}

/// An ordered split plus the table that names its tag indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedCorpus {
    pub tag_names: Vec<String>,
    pub sentences: Vec<TaggedSentence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldEntity {
    /// First token of the span.
    pub start: usize,
    /// One past the last token of the span.
    pub end: usize,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleRecord {
    /// Position of the sentence in its corpus.
    pub id: usize,
    pub text: String,
    pub tokens: Vec<String>,
    pub entities: Vec<GoldEntity>,
    /// Entity types this record was drawn to represent.
    #[serde(default)]
    pub represents: Vec<String>,
}

impl TaggedSentence {
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }

    /// Group runs of identical non-outside tags into entities.
    pub fn entities(
        &self,
        sentence: usize,
        tag_names: &[String],
    ) -> Result<Vec<GoldEntity>, CorpusFormatError> {
        if self.tokens.len() != self.tags.len() {
            return Err(CorpusFormatError::LengthMismatch {
                sentence,
                tokens: self.tokens.len(),
                tags: self.tags.len(),
            });
        }

        let mut entities = Vec::new();
        let mut current: Option<(usize, &str)> = None;

        for (i, &tag) in self.tags.iter().enumerate() {
            let label = tag_names
                .get(tag)
                .ok_or(CorpusFormatError::UndefinedLabel {
                    sentence,
                    tag,
                    defined: tag_names.len(),
                })?
                .as_str();

            match current {
                Some((_, open)) if open == label => continue,
                Some((start, open)) => {
                    entities.push(self.span(start, i, open));
                    current = None;
                }
                None => {}
            }

            if label != OUTSIDE_TAG {
                current = Some((i, label));
            }
        }

        if let Some((start, open)) = current {
            entities.push(self.span(start, self.tokens.len(), open));
        }

        Ok(entities)
    }

    fn span(&self, start: usize, end: usize, label: &str) -> GoldEntity {
        GoldEntity {
            start,
            end,
            entity_type: label.to_string(),
            text: self.tokens[start..end].join(" "),
        }
    }
}

impl TaggedCorpus {
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Keep only the first `limit` sentences.
    pub fn truncate(&mut self, limit: usize) {
        self.sentences.truncate(limit);
    }

    /// Every sentence as a record with its gold entities, in corpus order.
    pub fn records(&self) -> Result<Vec<ExampleRecord>, CorpusFormatError> {
        if self.tag_names.is_empty() {
            return Err(CorpusFormatError::EmptyTagTable);
        }

        self.sentences
            .iter()
            .enumerate()
            .map(|(id, sentence)| {
                Ok(ExampleRecord {
                    id,
                    text: sentence.text(),
                    tokens: sentence.tokens.clone(),
                    entities: sentence.entities(id, &self.tag_names)?,
                    represents: Vec::new(),
                })
            })
            .collect()
    }
}

impl ExampleRecord {
    pub fn has_type(&self, entity_type: &str) -> bool {
        self.entities.iter().any(|e| e.entity_type == entity_type)
    }
}
