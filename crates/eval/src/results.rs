use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use corpus::GoldEntity;
use prompt::Prediction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::ExperimentConfig;
use crate::scoring::{AggregateScore, ScoreRecord, aggregate};

/// Outcome of one test sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleResult {
    /// Position in the evaluated test set.
    pub index: usize,
    pub text: String,
    pub gold: Vec<GoldEntity>,
    pub prediction: Prediction,
    pub raw_completion: String,
    pub score: ScoreRecord,
    /// Set when the endpoint failed and the prediction is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One line of the JSONL run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum RunEvent {
    Started {
        run_id: Uuid,
        config: ExperimentConfig,
        started_at: DateTime<Utc>,
    },
    Example(ExampleResult),
    Finished {
        aggregate: AggregateScore,
        finished_at: DateTime<Utc>,
        interrupted: bool,
    },
}

/// Final JSON record of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub config: ExperimentConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub interrupted: bool,
    pub aggregate: AggregateScore,
    pub examples: Vec<ExampleResult>,
}

impl RunRecord {
    pub fn from_examples(
        run_id: Uuid,
        config: ExperimentConfig,
        started_at: DateTime<Utc>,
        examples: Vec<ExampleResult>,
    ) -> Self {
        let aggregate = aggregate(examples.iter().map(|e| &e.score));
        Self {
            run_id,
            config,
            started_at,
            finished_at: None,
            interrupted: false,
            aggregate,
            examples,
        }
    }
}

/// Appends run events to `<dir>/<run_name>_<run_id>.jsonl`.
pub struct ResultsWriter {
    run_id: Uuid,
    log_path: PathBuf,
    record_path: PathBuf,
    file: File,
}

impl ResultsWriter {
    pub async fn create(dir: &Path, run_name: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create results dir: {:?}", dir))?;

        let run_id = Uuid::new_v4();
        let stem = format!("{run_name}_{}", run_id.simple());
        let log_path = dir.join(format!("{stem}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .with_context(|| format!("Failed to open run log: {:?}", log_path))?;

        Ok(Self {
            run_id,
            record_path: dir.join(format!("{stem}.json")),
            log_path,
            file,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Write one event as a full line and flush it.
    pub async fn append(&mut self, event: &RunEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }

    pub async fn write_record(&self, record: &RunRecord) -> Result<PathBuf> {
        fs::write(&self.record_path, serde_json::to_string_pretty(record)?)
            .await
            .with_context(|| format!("Failed to write run record: {:?}", self.record_path))?;
        Ok(self.record_path.clone())
    }
}

/// Rebuild a run record from a JSONL log, including an interrupted one.
///
/// A torn final line is skipped; the aggregate is recomputed from the examples.
pub async fn recover_run(log_path: &Path) -> Result<RunRecord> {
    let content = fs::read_to_string(log_path)
        .await
        .with_context(|| format!("Failed to read run log: {:?}", log_path))?;

    let mut started = None;
    let mut examples = Vec::new();
    let mut finished = None;

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    for (n, line) in lines.iter().enumerate() {
        let event: RunEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) if n + 1 == lines.len() => {
                tracing::warn!(error = %e, "Skipping torn last line of run log");
                break;
            }
            Err(e) => return Err(e).with_context(|| format!("line {}: invalid run event", n + 1)),
        };

        match event {
            RunEvent::Started {
                run_id,
                config,
                started_at,
            } => started = Some((run_id, config, started_at)),
            RunEvent::Example(example) => examples.push(example),
            RunEvent::Finished {
                finished_at,
                interrupted,
                ..
            } => finished = Some((finished_at, interrupted)),
        }
    }

    let Some((run_id, config, started_at)) = started else {
        bail!("Run log {:?} has no 'started' event", log_path);
    };

    let mut record = RunRecord::from_examples(run_id, config, started_at, examples);
    record.finished_at = finished.map(|(at, _)| at);
    record.interrupted = finished.is_none_or(|(_, interrupted)| interrupted);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::match_entities;
    use prompt::PredictedEntity;

    fn example(index: usize, predicted: &str) -> ExampleResult {
        let gold = vec![GoldEntity {
            start: 0,
            end: 1,
            entity_type: "person".into(),
            text: "Ann".into(),
        }];
        let prediction = Prediction {
            entities: vec![PredictedEntity::new(predicted, "person")],
            dropped: vec![],
        };
        let score = match_entities(&prediction.entities, &gold).record;
        ExampleResult {
            index,
            text: "Ann".into(),
            gold,
            prediction,
            raw_completion: String::new(),
            score,
            error: None,
        }
    }

    fn started(writer: &ResultsWriter) -> RunEvent {
        RunEvent::Started {
            run_id: writer.run_id(),
            config: ExperimentConfig::default(),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_log_lines_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path(), "coarse_pl_v0_original_3shot_seed42").await.unwrap();

        let start = started(&writer);
        writer.append(&start).await.unwrap();
        writer.append(&RunEvent::Example(example(0, "Ann"))).await.unwrap();
        writer.append(&RunEvent::Example(example(1, "Bob"))).await.unwrap();

        let content = std::fs::read_to_string(writer.log_path()).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().next().unwrap().contains("\"event\":\"started\""));

        let record = recover_run(writer.log_path()).await.unwrap();
        assert_eq!(record.run_id, writer.run_id());
        assert!(record.interrupted);
        assert_eq!(record.examples.len(), 2);
        assert_eq!(record.aggregate.micro.counts.tp, 1);
        assert_eq!(record.aggregate.micro.counts.fp, 1);
    }

    #[tokio::test]
    async fn test_torn_last_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path(), "run").await.unwrap();
        let start = started(&writer);
        writer.append(&start).await.unwrap();
        writer.append(&RunEvent::Example(example(0, "Ann"))).await.unwrap();

        let mut content = std::fs::read_to_string(writer.log_path()).unwrap();
        content.push_str("{\"event\":\"example\",\"ind");
        std::fs::write(writer.log_path(), content).unwrap();

        let record = recover_run(writer.log_path()).await.unwrap();
        assert_eq!(record.examples.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_started_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "").unwrap();
        assert!(recover_run(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_finished_run_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path(), "run").await.unwrap();
        let start = started(&writer);
        writer.append(&start).await.unwrap();
        writer.append(&RunEvent::Example(example(0, "Ann"))).await.unwrap();
        let agg = aggregate([&example(0, "Ann").score]);
        writer
            .append(&RunEvent::Finished {
                aggregate: agg,
                finished_at: Utc::now(),
                interrupted: false,
            })
            .await
            .unwrap();

        let record = recover_run(writer.log_path()).await.unwrap();
        assert!(!record.interrupted);
        assert_eq!(record.aggregate.micro.f1, 1.0);

        let path = writer.write_record(&record).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["examples"][0]["prediction"]["entities"][0]["type"], "person");
    }

    #[tokio::test]
    async fn test_stopped_run_stays_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path(), "run").await.unwrap();
        let start = started(&writer);
        writer.append(&start).await.unwrap();
        writer.append(&RunEvent::Example(example(0, "Ann"))).await.unwrap();
        writer
            .append(&RunEvent::Finished {
                aggregate: aggregate([&example(0, "Ann").score]),
                finished_at: Utc::now(),
                interrupted: true,
            })
            .await
            .unwrap();

        let record = recover_run(writer.log_path()).await.unwrap();
        assert!(record.interrupted);
        assert!(record.finished_at.is_some());
        assert_eq!(record.examples.len(), 1);
    }
}
