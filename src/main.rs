use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use taxonomy_align::report::{self, RunSummary};
use taxonomy_align::validation::{self, SUGGESTIONS_PER_ENTRY};
use taxonomy_align::{
    db, AlignConfig, AlignmentEngine, CategoryTree, CorrespondenceGraphBuilder, ExternalClassSource, ExternalEntry,
    LabelResolver, LexicalMatcher, LexicalRetriever, LocalDictionarySource, MatcherKind, ScoringReport,
    TaxonomyGraphBuilder, TaxonomyIngester, TranslationCache, TranslationRecord, ValidationHarness,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Parser)]
#[command(name = "taxonomy-align", version, about = "Align an external classification with a hierarchical taxonomy")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "TAXONOMY_ALIGN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the taxonomy, resolve labels, export the class graph
    Taxonomy(TaxonomyArgs),
    /// Align external entries with the taxonomy
    Align(AlignArgs),
    /// Draw a validation sample and write the annotation template
    Sample(SampleArgs),
    /// Score correspondence reports against annotated ground truth
    Score(ScoreArgs),
}

#[derive(Args)]
struct TaxonomyInput {
    /// Taxonomy source (.xml, .json or .nt)
    #[arg(long)]
    taxonomy: PathBuf,

    /// Translation cache JSON (overrides config cache_path)
    #[arg(long)]
    cache: Option<PathBuf>,
}

#[derive(Args)]
struct EntryInput {
    /// Local dictionary export (JSON)
    #[arg(long, conflicts_with = "remote")]
    entries: Option<PathBuf>,

    /// Fetch entries from the dictionary service
    #[arg(long)]
    remote: bool,

    /// Dictionary service base URL
    #[arg(long, default_value = "https://api.bsdd.buildingsmart.org")]
    base_url: String,

    /// Code prefix filter (overrides config filter)
    #[arg(long)]
    filter: Option<String>,

    /// Only process the first N entries
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct TaxonomyArgs {
    #[command(flatten)]
    input: TaxonomyInput,

    /// Turtle output
    #[arg(long)]
    ttl: Option<PathBuf>,

    /// N-Triples output
    #[arg(long)]
    nt: Option<PathBuf>,

    /// Translation review export (JSON)
    #[arg(long)]
    translations: Option<PathBuf>,
}

#[derive(Args)]
struct AlignArgs {
    #[command(flatten)]
    input: TaxonomyInput,

    #[command(flatten)]
    source: EntryInput,

    /// Matcher: lexical | llm
    #[arg(long)]
    matcher: Option<MatcherKind>,

    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    throttle_ms: Option<u64>,

    /// Pattern rules for the lexical matcher (JSON)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Correspondence report (JSON)
    #[arg(long, default_value = "correspondences.json")]
    out: PathBuf,

    #[arg(long)]
    csv: Option<PathBuf>,

    /// Correspondence graph (Turtle)
    #[arg(long)]
    ttl: Option<PathBuf>,

    /// Run summary (JSON)
    #[arg(long)]
    summary: Option<PathBuf>,

    /// SQLite run store
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Args)]
struct SampleArgs {
    #[command(flatten)]
    input: TaxonomyInput,

    #[command(flatten)]
    source: EntryInput,

    #[arg(long, default_value_t = 50)]
    size: usize,

    /// Uniform instead of stratified sampling
    #[arg(long)]
    uniform: bool,

    /// Seed for a reproducible sample
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "validation_sample.json")]
    out: PathBuf,
}

#[derive(Args)]
struct ScoreArgs {
    /// Annotated validation sample
    #[arg(long)]
    annotations: PathBuf,

    /// Correspondence report of method A
    #[arg(long)]
    report: PathBuf,

    /// Correspondence report of method B (enables comparison)
    #[arg(long)]
    compare: Option<PathBuf>,

    #[arg(long, default_value = "validation_results.json")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AlignConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Taxonomy(args) => run_taxonomy(&config, args),
        Command::Align(args) => run_align(config, args),
        Command::Sample(args) => run_sample(&config, args),
        Command::Score(args) => run_score(args),
    }
}

// ============================================================================
// SHARED LOADING
// ============================================================================

fn load_taxonomy(config: &AlignConfig, input: &TaxonomyInput) -> Result<CategoryTree> {
    println!("\n📂 Loading taxonomy {:?}...", input.taxonomy);
    let ingester = TaxonomyIngester::new()
        .with_max_depth(config.max_depth)
        .with_namespaces(config.namespaces.clone());
    let mut tree = ingester.ingest_file(&input.taxonomy)?;
    println!("✓ {} categories, {} roots, height {}", tree.len(), tree.roots().len(), tree.height());

    let cache = match input.cache.as_ref().or(config.cache_path.as_ref()) {
        Some(path) => TranslationCache::load(path),
        None => TranslationCache::empty(),
    };
    println!("🌐 Resolving labels ({} cached translations)...", cache.len());
    tree.resolve_labels(&LabelResolver::new(cache));

    Ok(tree)
}

fn load_entries(config: &AlignConfig, input: &EntryInput) -> Result<Vec<ExternalEntry>> {
    let source: Box<dyn ExternalClassSource> = match (&input.entries, input.remote) {
        (Some(path), _) => Box::new(LocalDictionarySource::new(path)),
        (None, true) => remote_source(config, &input.base_url)?,
        (None, false) => bail!("either --entries <file> or --remote is required"),
    };

    let filter = input.filter.as_deref().or(config.filter.as_deref());
    println!("\n📥 Loading entries from {}...", source.describe());
    let mut entries = source
        .list(filter)
        .with_context(|| format!("Failed to load entries from {}", source.describe()))?;
    if let Some(limit) = input.limit {
        entries.truncate(limit);
    }
    println!("✓ {} entries{}", entries.len(), filter.map(|f| format!(" (filter {})", f)).unwrap_or_default());

    Ok(entries)
}

#[cfg(feature = "remote")]
fn remote_source(config: &AlignConfig, base_url: &str) -> Result<Box<dyn ExternalClassSource>> {
    Ok(Box::new(taxonomy_align::BsddClient::new(base_url, config.timeout())?))
}

#[cfg(not(feature = "remote"))]
fn remote_source(_config: &AlignConfig, _base_url: &str) -> Result<Box<dyn ExternalClassSource>> {
    bail!("--remote requires the `remote` feature")
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_taxonomy(config: &AlignConfig, args: TaxonomyArgs) -> Result<()> {
    println!("🌳 Taxonomy Export");
    println!("{}", RULE);

    let tree = load_taxonomy(config, &args.input)?;

    let graph = TaxonomyGraphBuilder::new(config.namespaces.clone()).build(&tree);
    println!("\n🕸️  Graph: {} triples", graph.len());

    if let Some(path) = &args.ttl {
        graph.write_turtle(path)?;
        println!("✓ Turtle: {:?}", path);
    }
    if let Some(path) = &args.nt {
        graph.write_ntriples(path)?;
        println!("✓ N-Triples: {:?}", path);
    }
    if let Some(path) = &args.translations {
        let count = TranslationRecord::export(&tree, path)?;
        println!("✓ Translations: {:?} ({} records)", path, count);
    }

    println!("{}", RULE);
    Ok(())
}

fn run_align(mut config: AlignConfig, args: AlignArgs) -> Result<()> {
    if let Some(kind) = args.matcher {
        config.matcher = kind;
    }
    if let Some(k) = args.top_k {
        config.top_k = k;
    }
    if let Some(w) = args.workers {
        config.workers = w;
    }
    if let Some(ms) = args.throttle_ms {
        config.throttle_ms = ms;
    }
    if args.rules.is_some() {
        config.rules_path = args.rules.clone();
    }

    println!("⚖️  Alignment Run");
    println!("{}", RULE);

    // Fatal configuration errors surface here, before any entry is processed
    let matcher = config.build_matcher()?;

    let tree = load_taxonomy(&config, &args.input)?;
    let entries = load_entries(&config, &args.source)?;

    println!("\n🎯 Matching with {} (top-{}, {} worker(s))...", matcher.method(), config.effective_top_k(), config.workers);
    let engine = AlignmentEngine::from_config(&tree, Box::new(LexicalRetriever::for_tree(&tree)), matcher, &config);
    let run = engine.run(&entries);

    let summary = RunSummary::from_run(&run);
    println!();
    for line in summary.lines() {
        println!("{}", line);
    }

    println!("\n📄 Writing outputs...");
    let written = report::write_json(&run.correspondences, &args.out)?;
    println!("✓ JSON: {:?} ({} correspondences)", args.out, written);

    if let Some(path) = &args.csv {
        report::write_csv(&run.correspondences, path)?;
        println!("✓ CSV: {:?}", path);
    }
    if let Some(path) = &args.ttl {
        let graph = CorrespondenceGraphBuilder::new(config.namespaces.clone()).build(run.correspondences.iter());
        graph.write_turtle(path)?;
        println!("✓ Turtle: {:?} ({} triples)", path, graph.len());
    }
    if let Some(path) = &args.summary {
        summary.write_json(path)?;
        println!("✓ Summary: {:?}", path);
    }
    if let Some(path) = &args.store {
        let conn = db::open_store(path)?;
        let inserted = db::insert_run(&conn, &run)?;
        println!("✓ Run store: {:?} ({} rows, run {})", path, inserted, run.run_id);
    }

    println!("\nTop matches:");
    for (i, c) in report::top_examples(&run.correspondences, 10).iter().enumerate() {
        println!("{:>3}. {} → {} ({})", i + 1, c.entry().name, c.category().native_label, c.category().id);
        println!("     {} ({:.2}) {}", c.match_type(), c.confidence(), c.rationale());
    }

    println!("{}", RULE);
    Ok(())
}

fn run_sample(config: &AlignConfig, args: SampleArgs) -> Result<()> {
    println!("🧪 Validation Sample");
    println!("{}", RULE);

    let tree = load_taxonomy(config, &args.input)?;
    let entries = load_entries(config, &args.source)?;
    let retriever = LexicalRetriever::for_tree(&tree);

    let scores: HashMap<String, f64> = if args.uniform {
        HashMap::new()
    } else {
        println!("\n📊 Scoring entries for stratification...");
        let matcher = match &config.rules_path {
            Some(path) => LexicalMatcher::from_file(path)?,
            None => LexicalMatcher::new(),
        };
        let engine = AlignmentEngine::new(&tree, Box::new(LexicalRetriever::for_tree(&tree)), Box::new(matcher))
            .with_top_k(config.effective_top_k())
            .with_workers(config.workers);
        validation::scores_from(&engine.run(&entries).correspondences)
    };

    let mut harness = match args.seed {
        Some(seed) => ValidationHarness::seeded(seed),
        None => ValidationHarness::from_entropy(),
    };
    let sample = harness.sample(&entries, &scores, args.size, !args.uniform);
    if sample.stratified {
        println!(
            "✓ Sampled {} high + {} medium + {} low = {}",
            sample.high,
            sample.medium,
            sample.low,
            sample.len()
        );
    } else {
        println!("✓ Sampled {} entries uniformly", sample.len());
    }

    let suggestions: HashMap<String, Vec<validation::SuggestedCandidate>> = sample
        .entries
        .iter()
        .map(|e| {
            (
                e.code().to_string(),
                validation::suggest_candidates(&retriever, e, &tree, SUGGESTIONS_PER_ENTRY),
            )
        })
        .collect();
    let records = validation::export_annotation_template(&sample.entries, &suggestions);
    validation::write_annotation_template(&records, &args.out)?;

    println!("\n✓ Annotation template: {:?}", args.out);
    println!("  Fill in correct_category_id, confidence_level (certain | likely | unclear),");
    println!("  ambiguous, notes and annotator for each record, then run `score`.");
    println!("{}", RULE);
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<()> {
    println!("📏 Accuracy Against Ground Truth");
    println!("{}", RULE);

    let truth = validation::load_ground_truth(&args.annotations)?;
    println!("✓ {} annotated records", truth.len());

    let a = report::read_json(&args.report)?;
    let mut scoring = ScoringReport::new(&args.annotations.display().to_string(), truth.len());

    let score_a = validation::score(&a, &truth);
    println!("\n{}", score_a.summary());
    scoring.scores.push(score_a);

    if let Some(path) = &args.compare {
        let b = report::read_json(path)?;
        let score_b = validation::score(&b, &truth);
        println!("{}", score_b.summary());
        scoring.scores.push(score_b);

        let comparison = validation::compare(&a, &b, &truth);
        println!("\n⚖️  {}", comparison.summary());
        scoring.comparison = Some(comparison);
    }

    scoring.write_json(&args.out)?;
    println!("\n📄 Detailed results: {:?}", args.out);
    println!("{}", RULE);
    Ok(())
}
