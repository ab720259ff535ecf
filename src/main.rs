use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};

use metapattern::anomaly::LinguisticAnomalyDetector;
use metapattern::completion::build_backend;
use metapattern::corpus::{load_data_dir, LoadedData};
use metapattern::index::SimilarityIndex;
use metapattern::pipeline::{init_default_config, PipelineConfig, TranslationPipeline};
use metapattern::progress::ConsoleProgress;
use metapattern::rank::{sort_easiest_first, write_ranked_prompts, DifficultyEstimator};
use metapattern::retrieval::ExampleRetriever;
use metapattern::textutil::normalize_line;

#[derive(Parser, Debug)]
#[command(name = "metapattern")]
#[command(about = "Example-driven translation via numeric pattern completion", long_about = None)]
struct Args {
    /// Suppress progress lines on stderr
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write default config + prompt files, then exit
    InitConfig {
        /// Directory to write into (default: current directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Translate every prompt and append records
    Translate {
        #[command(flatten)]
        common: CommonArgs,

        /// Skip prompts before this index, keeping their existing records
        #[arg(long, default_value_t = 0)]
        resume_from: usize,

        /// Process at most N prompts
        #[arg(long)]
        max_queries: Option<usize>,

        /// Completion provider: anthropic | openai
        #[arg(long)]
        provider: Option<String>,
    },

    /// Estimate the difficulty of every prompt and write the ranked list
    Rank {
        #[command(flatten)]
        common: CommonArgs,

        /// Order output easiest first
        #[arg(long)]
        sort: bool,
    },

    /// Print the example block and rank for one query
    Retrieve {
        #[arg(value_name = "QUERY")]
        query: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print the anomaly score of a draft against a source baseline
    Score {
        #[arg(value_name = "DRAFT")]
        draft: String,

        #[arg(value_name = "BASELINE")]
        baseline: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct CommonArgs {
    /// Config file path (default: search for metapattern.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding source.txt, target.txt and prompts.txt
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metapattern=info")),
        )
        .init();
}

fn load(cfg: &PipelineConfig, progress: &ConsoleProgress) -> anyhow::Result<LoadedData> {
    progress.info(format!("Read corpus: {}", cfg.data_dir.display()));
    let data = load_data_dir(&cfg.data_dir, &cfg.corpus_files())?;
    progress.info(format!(
        "Corpus: {} pairs, {} prompts",
        data.corpus.len(),
        data.prompts.len()
    ));
    Ok(data)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();
    let progress = ConsoleProgress::new(!args.quiet);

    match args.command {
        Command::InitConfig { dir, force } => {
            let dir = dir
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
            let cfg_path = init_default_config(&dir, force).context("init default config")?;
            eprintln!("Wrote config: {}", cfg_path.display());
        }

        Command::Translate {
            common,
            resume_from,
            max_queries,
            provider,
        } => {
            let cfg = PipelineConfig::from_args(common.config, common.data_dir, provider)
                .context("build config")?;
            let data = load(&cfg, &progress)?;
            let backend = build_backend(&cfg.backend, cfg.retry).context("build completion backend")?;
            let mut pipeline = TranslationPipeline::new(cfg, data.corpus, backend, progress)?;
            let summary = pipeline.run(&data.prompts, resume_from, max_queries)?;
            tracing::info!(
                processed = summary.processed,
                failed = summary.failed,
                total = summary.total_records,
                "translate done"
            );
            eprintln!(
                "Wrote {} records ({} failed): {}",
                summary.processed,
                summary.failed,
                summary.records_path.display()
            );
        }

        Command::Rank { common, sort } => {
            let cfg = PipelineConfig::from_args(common.config, common.data_dir, None)
                .context("build config")?;
            let data = load(&cfg, &progress)?;
            let index = SimilarityIndex::build(data.corpus.sources())?;
            let estimator = DifficultyEstimator::new(&index, cfg.rank_width)
                .with_stall_penalty(cfg.stall_penalty);
            let mut ranked = estimator.rank_prompts(&data.prompts, cfg.max_rank);
            if sort {
                sort_easiest_first(&mut ranked);
            }
            write_ranked_prompts(&cfg.ranked_prompts_path, &ranked)?;
            progress.info(format!(
                "Wrote {} ranked prompts: {}",
                ranked.len(),
                cfg.ranked_prompts_path.display()
            ));
        }

        Command::Retrieve { query, common } => {
            let cfg = PipelineConfig::from_args(common.config, common.data_dir, None)
                .context("build config")?;
            let data = load(&cfg, &progress)?;
            let index = SimilarityIndex::build(data.corpus.sources())?;
            let query = normalize_line(&query);
            let outcome = ExampleRetriever::new(&data.corpus, &index, cfg.retrieval_width)
                .retrieve(&query, cfg.max_iterations);
            let rank = DifficultyEstimator::new(&index, cfg.rank_width)
                .with_stall_penalty(cfg.stall_penalty)
                .estimate_rank(&query, cfg.max_rank);
            println!("{}", outcome.render());
            println!("rank: {rank} (iterations: {})", outcome.iterations);
        }

        Command::Score {
            draft,
            baseline,
            common,
        } => {
            let cfg = PipelineConfig::from_args(common.config, common.data_dir, None)
                .context("build config")?;
            let data = load(&cfg, &progress)?;
            let mut detector =
                LinguisticAnomalyDetector::from_corpus_sample(&data.corpus, cfg.reference_size, cfg.seed)?;
            let score = detector.detect(&normalize_line(&draft), &normalize_line(&baseline));
            println!("{score:.2}");
        }
    }
    Ok(())
}
