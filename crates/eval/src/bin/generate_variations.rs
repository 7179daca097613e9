use anyhow::Result;
use clap::Parser;
use corpus::{CorpusReader, EntitySchema, Granularity, Indexer, IndexerConfig, sample};
use eval::{embedding_from_env, endpoint_from_env, load_dotenv};
use prompt::{CompletionClient, ORIGINAL_VARIATION, PromptStyle, PromptTemplate, RetryPolicy, TemplateDescriptor};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use variation::{
    BACK_TRANSLATION_LANGUAGES, BasePrompt, CachedEmbedder, EmbeddingClient, GenerationSummary, GeneratorConfig,
    ParaphraseMode, PromptOrigin, VariationGenerator, VariationMethod, VariationStore,
};

#[derive(Parser)]
#[command(
    name = "generate_variations",
    version,
    about = "Paraphrase and back-translate a base prompt into similarity-checked variations"
)]
struct Args {
    #[arg(long, default_value = "coarse")]
    granularity: Granularity,
    #[arg(long, default_value = "code")]
    style: PromptStyle,
    #[arg(long, default_value = "preserve-examples")]
    mode: ParaphraseMode,
    /// Direct paraphrases to generate.
    #[arg(long, default_value_t = 3)]
    count: usize,
    /// Pivot languages for back-translation.
    #[arg(long, value_delimiter = ',', default_values_t = BACK_TRANSLATION_LANGUAGES.iter().map(|l| l.to_string()))]
    languages: Vec<String>,
    #[arg(long)]
    no_back_translation: bool,
    #[arg(long, default_value_t = 3)]
    shots: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long)]
    no_schema: bool,
    #[arg(long, default_value_t = 0.05)]
    threshold: f32,
    #[arg(long, default_value_t = 3)]
    max_attempts: usize,
    #[arg(long, default_value_t = 1.0)]
    temperature: f32,
    #[arg(long, default_value = "data/fewnerd")]
    data_dir: PathBuf,
    #[arg(long, default_value = "variations")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let base_name = format!("{}_{}_{}shot", args.granularity, args.style.file_tag(), args.shots);
    println!("=== Prompt Variation Generation: {base_name} ({}) ===\n", args.mode);

    let train = CorpusReader::read_split(&args.data_dir, "train", args.granularity).await?;
    let schema = EntitySchema::from_tag_names(args.granularity, &train.tag_names);
    let index = Indexer::new(IndexerConfig::default()).index(&train)?;
    let shots = sample(&index, args.shots, args.seed);

    let base = BasePrompt {
        content: PromptTemplate::new(args.granularity, ORIGINAL_VARIATION, TemplateDescriptor::original(args.style))
            .with_schema(!args.no_schema)
            .render_prefix(&schema, &shots.examples),
        style: args.style,
        origin: PromptOrigin {
            granularity: args.granularity,
            shots_per_type: args.shots,
            seed: args.seed,
            include_schema: !args.no_schema,
        },
    };

    let store = VariationStore::new(args.output_dir.join(&base_name));
    tokio::fs::create_dir_all(args.output_dir.join(&base_name)).await?;
    tokio::fs::write(args.output_dir.join(&base_name).join("base_prompt.txt"), &base.content).await?;

    let generator = VariationGenerator::new(
        CompletionClient::new(endpoint_from_env()?)?,
        CachedEmbedder::new(EmbeddingClient::new(embedding_from_env()?)?),
        GeneratorConfig {
            similarity_threshold: args.threshold,
            max_attempts: args.max_attempts,
            temperature: args.temperature,
            ..Default::default()
        },
    )
    .with_retry(RetryPolicy::default());

    let prefix = match args.mode {
        ParaphraseMode::PreserveExamples => "paraphrase",
        ParaphraseMode::AllowExampleSubstitution => "paraphrase_sub",
    };
    let mut outcome = generator.generate_batch(prefix, &base, args.mode, args.count).await;
    if !args.no_back_translation {
        outcome.extend(generator.generate_back_translations(&base, &args.languages).await);
    }

    for variation in &outcome.accepted {
        let path = store.save(variation).await?;
        let via = match (&variation.metadata.method, &variation.metadata.language) {
            (VariationMethod::BackTranslation, Some(language)) => format!(" via {language}"),
            _ => String::new(),
        };
        println!(
            "  ✓ {}{} similarity={:.4} retries={} -> {}",
            variation.name,
            via,
            variation.metadata.similarity,
            variation.metadata.retry_count,
            path.display()
        );
    }
    for rejected in &outcome.rejected {
        println!("  ✗ {}: {}", rejected.name, rejected.error);
    }

    let summary = GenerationSummary::from_outcome(&base_name, &base, args.mode, args.threshold, &outcome);
    let summary_path = store.save_summary(&summary).await?;

    println!(
        "\nAccepted {} / {} variations",
        outcome.accepted.len(),
        outcome.accepted.len() + outcome.rejected.len()
    );
    println!("✅ Summary saved to {}", summary_path.display());

    Ok(())
}
