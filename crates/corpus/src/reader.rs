use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

use crate::schema::Granularity;
use crate::sentence::{ExampleRecord, TaggedCorpus, TaggedSentence};

/// Reads the Few-NERD export: `<split>.jsonl` plus `tag_names.json`.
pub struct CorpusReader;

impl CorpusReader {
    pub async fn read_split(dir: &Path, split: &str, granularity: Granularity) -> Result<TaggedCorpus> {
        let tag_names = Self::read_tag_names(dir, granularity).await?;
        let path = dir.join(format!("{split}.jsonl"));
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read corpus split: {:?}", path))?;

        let sentences = Self::parse_lines(&content, granularity.tag_key())
            .with_context(|| format!("Malformed corpus split: {:?}", path))?;

        tracing::info!(
            split,
            granularity = %granularity,
            sentences = sentences.len(),
            labels = tag_names.len(),
            "Loaded corpus split"
        );

        Ok(TaggedCorpus {
            tag_names,
            sentences,
        })
    }

    /// `tag_names.json` maps each tag column to its ordered label names.
    pub async fn read_tag_names(dir: &Path, granularity: Granularity) -> Result<Vec<String>> {
        let path = dir.join("tag_names.json");
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read tag table: {:?}", path))?;

        let mut tables: HashMap<String, Vec<String>> =
            serde_json::from_str(&content).context("Failed to parse tag table")?;

        tables
            .remove(granularity.tag_key())
            .with_context(|| format!("Tag table has no '{}' entry", granularity.tag_key()))
    }

    fn parse_lines(content: &str, tag_key: &str) -> Result<Vec<TaggedSentence>> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                let value: Value = serde_json::from_str(line)
                    .with_context(|| format!("line {}: invalid JSON", n + 1))?;
                let tokens = serde_json::from_value(value["tokens"].clone())
                    .with_context(|| format!("line {}: missing or invalid 'tokens'", n + 1))?;
                let tags = serde_json::from_value(value[tag_key].clone())
                    .with_context(|| format!("line {}: missing or invalid '{}'", n + 1, tag_key))?;
                Ok(TaggedSentence { tokens, tags })
            })
            .collect()
    }

    /// Write records as JSONL, one per line.
    pub async fn write_records(path: &Path, records: &[ExampleRecord]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }

        fs::write(path, out)
            .await
            .with_context(|| format!("Failed to write records: {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_split_uses_granularity_column() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tag_names.json"),
            r#"{"ner_tags": ["O", "person"], "fine_ner_tags": ["O", "person-actor"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("test.jsonl"),
            "{\"tokens\": [\"Tom\", \"Hanks\"], \"ner_tags\": [1, 1], \"fine_ner_tags\": [1, 1]}\n\n",
        )
        .unwrap();

        let corpus = CorpusReader::read_split(dir.path(), "test", Granularity::Fine)
            .await
            .unwrap();

        assert_eq!(corpus.tag_names, vec!["O", "person-actor"]);
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.sentences[0].tags, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_missing_column_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tag_names.json"), r#"{"ner_tags": ["O"]}"#).unwrap();
        std::fs::write(dir.path().join("train.jsonl"), "{\"tokens\": [\"a\"]}\n").unwrap();

        let err = CorpusReader::read_split(dir.path(), "train", Granularity::Coarse)
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("line 1"));
    }

    #[tokio::test]
    async fn test_write_records_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots/seed1/3shot/train.jsonl");
        let record = ExampleRecord {
            id: 4,
            text: "Bob".into(),
            tokens: vec!["Bob".into()],
            entities: vec![],
            represents: vec!["person".into()],
        };

        CorpusReader::write_records(&path, &[record.clone(), record]).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
    }
}
