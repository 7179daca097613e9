use anyhow::{Context, Result, bail};
use clap::Parser;
use corpus::{CorpusReader, EntitySchema, Granularity, Indexer, sample};
use eval::{
    ExperimentConfig, ExperimentRunner, ResultsWriter, RunRecord, VariationSource, endpoint_from_env, load_dotenv,
    recover_run,
};
use prompt::{
    CompletionClient, GenerationParams, ORIGINAL_VARIATION, PromptStyle, PromptTemplate, TemplateDescriptor,
    builtin_variation, builtin_variation_ids,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use variation::PromptOrigin;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "run_experiment", version, about = "Run one Few-NERD prompt configuration against a completion endpoint")]
struct Args {
    #[arg(long, default_value = "coarse")]
    granularity: Granularity,
    #[arg(long, default_value = "code")]
    style: PromptStyle,
    /// Built-in wording variation id.
    #[arg(long, default_value = ORIGINAL_VARIATION)]
    variation: String,
    /// Generated variation file; overrides --variation.
    #[arg(long)]
    variation_file: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    shots: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Leave the entity type block out of the prompt.
    #[arg(long)]
    no_schema: bool,
    /// Evaluate only the first N test sentences.
    #[arg(long)]
    max_test: Option<usize>,
    #[arg(long, default_value = "test")]
    split: String,
    #[arg(long, default_value = "data/fewnerd")]
    data_dir: PathBuf,
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
    /// Overrides CUSTOM_MODEL_NAME.
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = 256)]
    max_tokens: u32,
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,
    #[arg(long)]
    skip_connection_check: bool,
    /// Rebuild the final record from an existing run log and exit.
    #[arg(long)]
    recover: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Some(log) = &args.recover {
        let record = recover_run(log).await?;
        let path = log.with_extension("json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&record)?).await?;
        print_summary(&record);
        println!("\n✅ Recovered record saved to {}", path.display());
        return Ok(());
    }

    let mut endpoint = endpoint_from_env()?;
    if let Some(model) = &args.model {
        endpoint.model = model.clone();
    }

    let config = ExperimentConfig {
        granularity: args.granularity,
        style: args.style,
        variation: match &args.variation_file {
            Some(path) => VariationSource::File(path.clone()),
            None => VariationSource::Builtin(args.variation.clone()),
        },
        shots_per_type: args.shots,
        seed: args.seed,
        include_schema: !args.no_schema,
        max_test_examples: args.max_test,
        data_dir: args.data_dir.clone(),
        output_dir: args.output_dir.clone(),
        endpoint,
        generation: GenerationParams {
            max_tokens: args.max_tokens,
            temperature: args.temperature,
            stop: Vec::new(),
        },
        ..Default::default()
    };

    println!("=== Few-NERD Prompt Experiment: {} ===\n", config.run_name());

    let template = build_template(&config).await?;

    let train = CorpusReader::read_split(&config.data_dir, "train", config.granularity).await?;
    let mut test = CorpusReader::read_split(&config.data_dir, &args.split, config.granularity).await?;
    if let Some(cap) = config.max_test_examples {
        test.truncate(cap);
    }

    let schema = EntitySchema::from_tag_names(config.granularity, &test.tag_names);
    let index = Indexer::new(config.indexer.clone()).index(&train)?;
    let shots = sample(&index, config.shots_per_type, config.seed);
    for shortfall in &shots.shortfalls {
        println!(
            "⚠️  {}: {} of {} requested shots available",
            shortfall.entity_type, shortfall.available, shortfall.requested
        );
    }
    let test_records = test.records()?;

    println!("Few-shot examples: {}", shots.examples.len());
    println!("Test sentences: {}\n", test_records.len());

    let client = CompletionClient::new(config.endpoint.clone())?;
    if !args.skip_connection_check {
        client
            .check_connection()
            .await
            .with_context(|| format!("Endpoint {} is not reachable", config.endpoint.base_url))?;
    }

    let runner = ExperimentRunner::new(client, config.clone());
    let stop = runner.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing current example");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let mut writer = ResultsWriter::create(&config.output_dir, &config.run_name()).await?;
    let record = runner
        .run(&template, &schema, &shots.examples, &test_records, &mut writer)
        .await?;
    let path = writer.write_record(&record).await?;

    print_summary(&record);
    println!("\n✅ Results saved to {}", path.display());
    println!("✅ Run log at {}", writer.log_path().display());

    Ok(())
}

async fn build_template(config: &ExperimentConfig) -> Result<PromptTemplate> {
    let template = match &config.variation {
        VariationSource::Builtin(id) => {
            let Some(descriptor) = builtin_variation(config.style, id) else {
                bail!(
                    "Unknown variation '{}' for style {} (available: {})",
                    id,
                    config.style,
                    builtin_variation_ids(config.style).join(", ")
                );
            };
            PromptTemplate::new(config.granularity, id, descriptor)
        }
        VariationSource::File(path) => {
            let variation = variation::load_variation(path).await?;
            let origin = PromptOrigin {
                granularity: config.granularity,
                shots_per_type: config.shots_per_type,
                seed: config.seed,
                include_schema: config.include_schema,
            };
            let mismatches = variation.mismatches(config.style, &origin);
            if !mismatches.is_empty() {
                bail!(
                    "Variation {:?} does not fit this run: generated with {}",
                    path,
                    mismatches.join(", ")
                );
            }
            PromptTemplate::new(
                config.granularity,
                &variation.name,
                TemplateDescriptor::original(config.style),
            )
            .with_fixed_prefix(variation.content)
        }
    };

    Ok(template.with_schema(config.include_schema))
}

fn print_summary(record: &RunRecord) {
    let agg = &record.aggregate;

    println!("\n=== RESULTS ===\n");
    println!("  Run: {}", record.config.run_name());
    println!("  Examples: {}", agg.examples);
    if record.interrupted {
        println!("  ⚠️  Run was interrupted");
    }
    let failed = record.examples.iter().filter(|e| e.error.is_some()).count();
    if failed > 0 {
        println!("  Failed completions: {failed}");
    }

    println!("\n📊 MICRO:");
    println!(
        "  TP {}  FP {}  FN {}",
        agg.micro.counts.tp, agg.micro.counts.fp, agg.micro.counts.fn_
    );
    println!("  Precision: {:.4}", agg.micro.precision);
    println!("  Recall:    {:.4}", agg.micro.recall);
    println!("  F1:        {:.4}", agg.micro.f1);

    println!("\n📊 PER TYPE:");
    for t in &agg.per_type {
        println!(
            "  {:<45} P {:.3}  R {:.3}  F1 {:.3}  (support {})",
            t.entity_type, t.precision, t.recall, t.f1, t.support
        );
    }
    println!(
        "\n  Macro over types: P {:.4}  R {:.4}  F1 {:.4}",
        agg.macro_by_type.precision, agg.macro_by_type.recall, agg.macro_by_type.f1
    );
}
