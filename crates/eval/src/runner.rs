use anyhow::Result;
use chrono::Utc;
use corpus::{EntitySchema, ExampleRecord};
use prompt::{GenerationParams, Prediction, PromptTemplate, RetryPolicy, TextGenerator};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ExperimentConfig;
use crate::results::{ExampleResult, ResultsWriter, RunEvent, RunRecord};
use crate::scoring::{aggregate, match_entities, score};

const PROGRESS_EVERY: usize = 10;

/// Render, complete and score each test sentence in order.
pub struct ExperimentRunner<G> {
    generator: G,
    config: ExperimentConfig,
    retry: RetryPolicy,
    stop: Arc<AtomicBool>,
}

impl<G: TextGenerator> ExperimentRunner<G> {
    pub fn new(generator: G, config: ExperimentConfig) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            generator,
            config,
            retry,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Setting this flag stops the run before the next example.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub async fn run(
        &self,
        template: &PromptTemplate,
        schema: &EntitySchema,
        shots: &[ExampleRecord],
        test_set: &[ExampleRecord],
        writer: &mut ResultsWriter,
    ) -> Result<RunRecord> {
        let started_at = Utc::now();
        let run_id = writer.run_id();
        writer
            .append(&RunEvent::Started {
                run_id,
                config: self.config.clone(),
                started_at,
            })
            .await?;

        tracing::info!(
            run_id = %run_id,
            run = %self.config.run_name(),
            shots = shots.len(),
            test_examples = test_set.len(),
            "Starting experiment"
        );

        let params = GenerationParams {
            stop: template.style().stop_sequences(),
            ..self.config.generation.clone()
        };

        let mut examples: Vec<ExampleResult> = Vec::with_capacity(test_set.len());
        let mut interrupted = false;

        for (index, sample) in test_set.iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                tracing::warn!(completed = examples.len(), "Stop requested; ending run early");
                interrupted = true;
                break;
            }

            let result = self.evaluate(index, sample, template, schema, shots, &params).await;
            writer.append(&RunEvent::Example(result.clone())).await?;
            examples.push(result);

            if examples.len() % PROGRESS_EVERY == 0 {
                let running = aggregate(examples.iter().map(|e| &e.score));
                tracing::info!(
                    done = examples.len(),
                    total = test_set.len(),
                    precision = running.micro.precision,
                    recall = running.micro.recall,
                    f1 = running.micro.f1,
                    "Progress"
                );
            }
        }

        let mut record = RunRecord::from_examples(run_id, self.config.clone(), started_at, examples);
        record.interrupted = interrupted;
        record.finished_at = Some(Utc::now());

        writer
            .append(&RunEvent::Finished {
                aggregate: record.aggregate.clone(),
                finished_at: Utc::now(),
                interrupted,
            })
            .await?;

        tracing::info!(
            examples = record.aggregate.examples,
            precision = record.aggregate.micro.precision,
            recall = record.aggregate.micro.recall,
            f1 = record.aggregate.micro.f1,
            interrupted,
            "Experiment finished"
        );

        Ok(record)
    }

    async fn evaluate(
        &self,
        index: usize,
        sample: &ExampleRecord,
        template: &PromptTemplate,
        schema: &EntitySchema,
        shots: &[ExampleRecord],
        params: &GenerationParams,
    ) -> ExampleResult {
        let rendered = template.render(schema, shots, &sample.text);

        match self
            .retry
            .retry("completion", || self.generator.generate(&rendered.prompt, params))
            .await
        {
            Ok(completion) => {
                let (prediction, score) = score(&completion, &sample.entities, template.style(), schema);
                ExampleResult {
                    index,
                    text: sample.text.clone(),
                    gold: sample.entities.clone(),
                    prediction,
                    raw_completion: completion,
                    score,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(index, error = %e, "Completion failed; recording empty prediction");
                ExampleResult {
                    index,
                    text: sample.text.clone(),
                    gold: sample.entities.clone(),
                    prediction: Prediction::empty(),
                    raw_completion: String::new(),
                    score: match_entities(&[], &sample.entities).record,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
