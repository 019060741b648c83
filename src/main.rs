//! `novelty` CLI: one-shot analysis, HTTP serve mode and cache maintenance.
//!
//! See `README.md` for configuration and API keys.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use novelty_assessor::analysis::AnalysisDepth;
use novelty_assessor::api::{self, AppState};
use novelty_assessor::bootstrap;
use novelty_assessor::config::AppConfig;
use novelty_assessor::keywords::KeywordSet;
use novelty_assessor::metrics::Metrics;
use novelty_assessor::pipeline::IdeaRequest;
use novelty_assessor::report::{self, OutputFormat};

/// Log targets used across the crate.
const TARGETS: &[&str] = &[
    "novelty_assessor",
    "pipeline",
    "keywords",
    "search",
    "analysis",
    "retry",
    "cache",
    "api",
];

#[derive(Parser)]
#[command(name = "novelty", version, about = "Assess how novel an idea is against patents and products")]
struct Cli {
    /// Config file (default: $NOVELTY_CONFIG_PATH, then config/novelty.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one idea and print the verdict
    Analyze(AnalyzeArgs),
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "NOVELTY_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Idea description
    idea: Option<String>,

    /// Read the idea description from a file
    #[arg(long, conflicts_with = "idea")]
    idea_file: Option<PathBuf>,

    /// Comma-separated keywords; skips extraction
    #[arg(long)]
    keywords: Option<String>,

    /// simple | complex (default from config)
    #[arg(long)]
    depth: Option<AnalysisDepth>,

    /// text | markdown | json
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Write the report here instead of stdout
    #[arg(long)]
    output_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every cache entry
    Clear,
}

/// Compact logs to stderr; JSON when `NOVELTY_LOG_FORMAT=json`. `RUST_LOG` wins.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut directives: Vec<String> = TARGETS.iter().map(|t| format!("{t}={level}")).collect();
    directives.push("warn".into());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives.join(",")));

    let json = std::env::var("NOVELTY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    AppConfig::load(path).context("loading configuration")
}

fn read_idea(args: &AnalyzeArgs) -> anyhow::Result<String> {
    let text = match (&args.idea, &args.idea_file) {
        (Some(idea), _) => idea.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("reading idea from {}", path.display()))?,
        (None, None) => bail!("provide an idea as an argument or with --idea-file"),
    };
    if text.trim().is_empty() {
        bail!("idea description is empty");
    }
    Ok(text)
}

async fn analyze(cfg: AppConfig, args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let missing = cfg.missing_credentials();
    if !missing.is_empty() {
        bail!("missing API keys: {} (set them in the environment or .env)", missing.join(", "));
    }

    let idea = read_idea(&args)?;
    let mut req = IdeaRequest::new(idea);
    if let Some(list) = &args.keywords {
        let keywords = KeywordSet::parse_list(list, cfg.keywords.max_terms)
            .context("--keywords contained no usable terms")?;
        req = req.with_keywords(keywords);
    }
    if let Some(depth) = args.depth {
        req = req.with_depth(depth);
    }

    let range = cfg.analysis.score_range();
    let pipeline = bootstrap::build_pipeline(cfg)?;

    match pipeline.run(req).await {
        Ok(verdict) => {
            let rendered = report::render_verdict(&verdict, range, args.format);
            match &args.output_file {
                Some(path) => {
                    fs::write(path, &rendered)
                        .with_context(|| format!("writing report to {}", path.display()))?;
                    info!(path = %path.display(), "report written");
                }
                None => println!("{rendered}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", report::render_error(&e, args.format));
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn serve(cfg: AppConfig, addr: SocketAddr) -> anyhow::Result<ExitCode> {
    let missing = cfg.missing_credentials();
    if !missing.is_empty() {
        bail!("missing API keys: {}", missing.join(", "));
    }
    let metrics = Metrics::init()?;
    let pipeline = bootstrap::build_pipeline(cfg)?;
    let app = api::router(AppState::new(pipeline)).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")?;
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Analyze(args) => analyze(cfg, args).await,
        Command::Serve { addr } => serve(cfg, addr).await,
        Command::Cache {
            action: CacheAction::Clear,
        } => {
            bootstrap::build_cache(&cfg).clear();
            println!("cache cleared");
            Ok(ExitCode::SUCCESS)
        }
    }
}
