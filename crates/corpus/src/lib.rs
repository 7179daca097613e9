//! Few-NERD corpus loading, per-label indexing and stratified few-shot sampling.

pub mod error;
pub mod index;
pub mod reader;
pub mod sampler;
pub mod schema;
pub mod sentence;

pub use error::CorpusFormatError;
pub use index::{CorpusIndex, Indexer, IndexerConfig};
pub use reader::CorpusReader;
pub use sampler::{SampleSet, Shortfall, sample};
pub use schema::{EntitySchema, EntityType, Granularity};
pub use sentence::{ExampleRecord, GoldEntity, TaggedCorpus, TaggedSentence};

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Where the few-shot set for one (granularity, seed, shots) lives.
pub fn shot_set_path(root: &Path, granularity: Granularity, seed: u64, shots: usize) -> PathBuf {
    root.join(format!("fewnerd_{granularity}_shot"))
        .join(format!("seed{seed}"))
        .join(format!("{shots}shot"))
        .join("train.jsonl")
}

/// Index a training split and write one few-shot file per (seed, shots) pair.
pub async fn materialize_shot_sets(
    train: &TaggedCorpus,
    granularity: Granularity,
    config: IndexerConfig,
    seeds: &[u64],
    shot_counts: &[usize],
    root: &Path,
) -> Result<Vec<PathBuf>> {
    let index = Indexer::new(config).index(train)?;
    let mut written = Vec::new();

    for &seed in seeds {
        for &shots in shot_counts {
            let set = sample(&index, shots, seed);
            let path = shot_set_path(root, granularity, seed, shots);
            CorpusReader::write_records(&path, &set.examples).await?;
            written.push(path);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_materialize_writes_every_combination() {
        let dir = tempfile::tempdir().unwrap();
        let train = TaggedCorpus {
            tag_names: vec!["O".into(), "person".into()],
            sentences: (0..4)
                .map(|i| TaggedSentence {
                    tokens: vec![format!("P{i}")],
                    tags: vec![1],
                })
                .collect(),
        };

        let paths = materialize_shot_sets(
            &train,
            Granularity::Coarse,
            IndexerConfig::default(),
            &[1, 2],
            &[1, 3],
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(paths.len(), 4);
        assert!(paths[0].ends_with("fewnerd_coarse_shot/seed1/1shot/train.jsonl"));
        let three = std::fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(three.lines().count(), 3);
    }
}
