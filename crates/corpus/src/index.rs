use serde::{Deserialize, Serialize};

use crate::error::CorpusFormatError;
use crate::schema::OUTSIDE_TAG;
use crate::sentence::{ExampleRecord, TaggedCorpus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Sentences kept per entity type.
    pub cap_per_type: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self { cap_per_type: 8 }
    }
}

/// Entity type -> the first sentences that mention it, in corpus order.
///
/// Types keep the order of the tag table so iteration is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusIndex {
    pools: Vec<(String, Vec<ExampleRecord>)>,
}

impl CorpusIndex {
    pub fn get(&self, entity_type: &str) -> &[ExampleRecord] {
        self.pools
            .iter()
            .find(|(t, _)| t == entity_type)
            .map(|(_, records)| records.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ExampleRecord])> {
        self.pools.iter().map(|(t, r)| (t.as_str(), r.as_slice()))
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.pools.iter().map(|(t, _)| t.as_str())
    }

    pub fn total_records(&self) -> usize {
        self.pools.iter().map(|(_, r)| r.len()).sum()
    }
}

pub struct Indexer {
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(config: IndexerConfig) -> Self {
        Self { config }
    }

    pub fn index(&self, corpus: &TaggedCorpus) -> Result<CorpusIndex, CorpusFormatError> {
        let mut pools: Vec<(String, Vec<ExampleRecord>)> = corpus
            .tag_names
            .iter()
            .filter(|name| name.as_str() != OUTSIDE_TAG)
            .map(|name| (name.clone(), Vec::new()))
            .collect();

        for record in corpus.records()? {
            for (entity_type, pool) in pools.iter_mut() {
                if pool.len() < self.config.cap_per_type && record.has_type(entity_type) {
                    pool.push(record.clone());
                }
            }
        }

        for (entity_type, pool) in &pools {
            if pool.len() < self.config.cap_per_type {
                tracing::debug!(
                    entity_type = entity_type.as_str(),
                    found = pool.len(),
                    cap = self.config.cap_per_type,
                    "Entity type below index cap"
                );
            }
        }

        let index = CorpusIndex { pools };
        tracing::info!(
            types = index.pools.len(),
            records = index.total_records(),
            "Built corpus index"
        );
        Ok(index)
    }
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new(IndexerConfig::default())
    }
}
