use rand::SeedableRng;
use rand::seq::index::sample as sample_indices;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::index::CorpusIndex;
use crate::sentence::ExampleRecord;

/// A type whose pool could not fill the requested quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub entity_type: String,
    pub requested: usize,
    pub available: usize,
}

/// Few-shot examples drawn for one (shots, seed) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSet {
    pub shots_per_type: usize,
    pub seed: u64,
    /// Unique records in corpus order.
    pub examples: Vec<ExampleRecord>,
    pub shortfalls: Vec<Shortfall>,
}

impl SampleSet {
    /// Records drawn to represent `entity_type`.
    pub fn count_for(&self, entity_type: &str) -> usize {
        self.examples
            .iter()
            .filter(|r| r.represents.iter().any(|t| t == entity_type))
            .count()
    }
}

/// Draws a fixed quota of examples per entity type.
///
/// Uses ChaCha8 so a given seed yields the same draw on every platform.
pub fn sample(index: &CorpusIndex, shots_per_type: usize, seed: u64) -> SampleSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut examples: Vec<ExampleRecord> = Vec::new();
    let mut shortfalls = Vec::new();

    for (entity_type, pool) in index.iter() {
        let take = shots_per_type.min(pool.len());
        if take < shots_per_type {
            tracing::warn!(
                entity_type,
                available = pool.len(),
                requested = shots_per_type,
                "Not enough examples for entity type"
            );
            shortfalls.push(Shortfall {
                entity_type: entity_type.to_string(),
                requested: shots_per_type,
                available: pool.len(),
            });
        }

        for i in sample_indices(&mut rng, pool.len(), take).into_iter() {
            let record = &pool[i];
            match examples.iter_mut().find(|e| e.id == record.id) {
                Some(existing) => existing.represents.push(entity_type.to_string()),
                None => {
                    let mut drawn = record.clone();
                    drawn.represents = vec![entity_type.to_string()];
                    examples.push(drawn);
                }
            }
        }
    }

    examples.sort_by_key(|r| r.id);

    tracing::info!(
        shots_per_type,
        seed,
        examples = examples.len(),
        shortfalls = shortfalls.len(),
        "Sampled few-shot examples"
    );

    SampleSet {
        shots_per_type,
        seed,
        examples,
        shortfalls,
    }
}
