use corpus::{EntitySchema, GoldEntity};
use prompt::{PredictedEntity, Prediction, PromptStyle, parse_completion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl Counts {
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    /// Gold entities seen.
    pub fn support(&self) -> usize {
        self.tp + self.fn_
    }

    fn add(&mut self, other: &Counts) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Counts plus derived P/R/F1 for one example or one corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(flatten)]
    pub counts: Counts,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_type: BTreeMap<String, Counts>,
}

impl ScoreRecord {
    pub fn from_counts(counts: Counts, by_type: BTreeMap<String, Counts>) -> Self {
        Self {
            counts,
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
            by_type,
        }
    }
}

/// Greedy one-to-one pairing of predictions with gold entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Matching {
    /// (prediction index, gold index)
    pub pairs: Vec<(usize, usize)>,
    pub record: ScoreRecord,
}

/// Each prediction, in order, claims the first unclaimed gold entity with the same text and type.
pub fn match_entities(predicted: &[PredictedEntity], gold: &[GoldEntity]) -> Matching {
    let mut claimed = vec![false; gold.len()];
    let mut pairs = Vec::new();
    let mut by_type: BTreeMap<String, Counts> = BTreeMap::new();

    for (pi, p) in predicted.iter().enumerate() {
        let hit = gold
            .iter()
            .zip(&claimed)
            .position(|(g, taken)| !taken && g.text == p.text && g.entity_type == p.entity_type);

        let entry = by_type.entry(p.entity_type.clone()).or_default();
        match hit {
            Some(gi) => {
                claimed[gi] = true;
                pairs.push((pi, gi));
                entry.tp += 1;
            }
            None => entry.fp += 1,
        }
    }

    for (g, _) in gold.iter().zip(&claimed).filter(|(_, c)| !**c) {
        by_type.entry(g.entity_type.clone()).or_default().fn_ += 1;
    }

    let tp = pairs.len();
    let counts = Counts {
        tp,
        fp: predicted.len() - tp,
        fn_: gold.len() - tp,
    };

    Matching {
        pairs,
        record: ScoreRecord::from_counts(counts, by_type),
    }
}

/// Parse a completion and score it against the gold entities.
pub fn score(
    completion: &str,
    gold: &[GoldEntity],
    style: PromptStyle,
    schema: &EntitySchema,
) -> (Prediction, ScoreRecord) {
    let prediction = parse_completion(completion, style, schema);
    let record = match_entities(&prediction.entities, gold).record;
    (prediction, record)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeScore {
    pub entity_type: String,
    #[serde(flatten)]
    pub counts: Counts,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Corpus-level scores. `micro` is the headline number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    pub examples: usize,
    pub micro: ScoreRecord,
    pub per_type: Vec<TypeScore>,
    /// Mean over entity types that occur in gold or predictions.
    pub macro_by_type: MacroScores,
}

/// Micro-average a set of per-example records.
pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a ScoreRecord>) -> AggregateScore {
    let mut total = Counts::default();
    let mut by_type: BTreeMap<String, Counts> = BTreeMap::new();
    let mut examples = 0;

    for record in records {
        examples += 1;
        total.add(&record.counts);
        for (t, c) in &record.by_type {
            by_type.entry(t.clone()).or_default().add(c);
        }
    }

    let per_type: Vec<TypeScore> = by_type
        .iter()
        .map(|(t, c)| TypeScore {
            entity_type: t.clone(),
            counts: *c,
            precision: c.precision(),
            recall: c.recall(),
            f1: c.f1(),
            support: c.support(),
        })
        .collect();

    let macro_by_type = if per_type.is_empty() {
        MacroScores::default()
    } else {
        let n = per_type.len() as f64;
        MacroScores {
            precision: per_type.iter().map(|t| t.precision).sum::<f64>() / n,
            recall: per_type.iter().map(|t| t.recall).sum::<f64>() / n,
            f1: per_type.iter().map(|t| t.f1).sum::<f64>() / n,
        }
    };

    AggregateScore {
        examples,
        micro: ScoreRecord::from_counts(total, by_type),
        per_type,
        macro_by_type,
    }
}
