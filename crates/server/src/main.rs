// crates/server/src/main.rs
//! `handoff` binary.
//!
//! One-shot commands (`get`, `extract`, `rebuild-index`, `batch`) print their
//! result to stdout; `serve` runs the HTTP API. Logs and progress go to
//! stderr. Any failure prints a single `error: ...` line and exits 1.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use handoff_core::llm::{create_extractor, ExtractError, Extractor, ProviderKind};
use handoff_core::{short_id, HandoffConfig, HandoffStore};
use handoff_pipeline::{BatchParams, CancellationToken, ExtractStatus, ProgressFn, Summary};
use handoff_search::query::{DEFAULT_DAYS_BACK, DEFAULT_MAX_RESULTS};
use handoff_search::{query, render_markdown, IndexEngine, RetrievalQuery};
use handoff_server::{create_app, AppState};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "handoff", version, about = "Session handoff memory for coding-assistant transcripts")]
struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the handoffs most relevant to a query
    Get(GetArgs),
    /// Extract a handoff for one session (defaults to the current one)
    Extract {
        /// Full session UUID or an 8+ character prefix
        session_id: Option<String>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the index from the stored handoffs
    RebuildIndex,
    /// Import historical transcripts
    Batch(BatchArgs),
    /// Run the HTTP API on 127.0.0.1
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Args)]
struct GetArgs {
    /// Free-text query. Omit it to list the most recent sessions.
    query: Vec<String>,

    #[arg(long, default_value_t = i64::from(DEFAULT_DAYS_BACK), allow_negative_numbers = true)]
    days_back: i64,

    /// Clamped to 5
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS as i64, allow_negative_numbers = true)]
    max_results: i64,
}

#[derive(Args)]
struct BatchArgs {
    /// Parallel workers (1-20)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seconds each worker waits between provider calls
    #[arg(long)]
    delay: Option<f64>,

    /// Process at most this many sessions, newest first
    #[arg(long)]
    max: Option<usize>,

    /// Re-extract sessions that already have a handoff
    #[arg(long)]
    reindex: bool,

    /// Plan only; no provider calls, no writes
    #[arg(long)]
    dry_run: bool,

    /// Import with the Claude CLI instead of OpenRouter
    #[arg(long)]
    interactive: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = HandoffConfig::load().context("loading configuration")?;
    init_tracing(&config, cli.verbose);
    config.report_warnings();

    match cli.command {
        Commands::Get(args) => cmd_get(&config, args).await,
        Commands::Extract { session_id, json } => cmd_extract(config, session_id, json).await,
        Commands::RebuildIndex => cmd_rebuild(&config).await,
        Commands::Batch(args) => cmd_batch(config, args).await,
        Commands::Serve { port } => cmd_serve(config, port).await,
    }
}

fn init_tracing(config: &HandoffConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn open_state(
    config: HandoffConfig,
    interactive: Arc<dyn Extractor>,
    bulk: Option<Arc<dyn Extractor>>,
) -> Result<Arc<AppState>> {
    let state =
        tokio::task::spawn_blocking(move || AppState::open(config, interactive, bulk)).await??;
    Ok(state)
}

async fn cmd_get(config: &HandoffConfig, args: GetArgs) -> Result<()> {
    let text = (!args.query.is_empty()).then(|| args.query.join(" "));
    let retrieval = RetrievalQuery::new(text, args.days_back, args.max_results)?;
    let store = HandoffStore::new(&config.handoffs_dir);
    let index_path = config.index_path.clone();

    let markdown = tokio::task::spawn_blocking(move || -> Result<String> {
        let index = IndexEngine::open(&index_path, &store)?;
        let handoffs = query(&index, &store, &retrieval)?;
        Ok(render_markdown(&handoffs))
    })
    .await??;

    println!("{}", markdown.trim_end());
    Ok(())
}

async fn cmd_extract(config: HandoffConfig, session_id: Option<String>, json: bool) -> Result<()> {
    config.ensure_data_dirs()?;
    let interactive = create_extractor(ProviderKind::ClaudeCli, &config)?;
    let state = open_state(config, interactive, None).await?;

    let outcome = state
        .interactive
        .extract(&state.resolver, session_id.as_deref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    let handoff = &outcome.handoff;
    let verb = match outcome.status {
        ExtractStatus::Extracted => "extracted",
        ExtractStatus::Unchanged => "unchanged",
    };
    println!(
        "{verb} {} (substance {}): {}",
        handoff.short_id(),
        handoff.substance,
        handoff.headline
    );
    println!(
        "{}",
        state.store.path_for(&handoff.session_id, handoff.date).display()
    );
    Ok(())
}

async fn cmd_rebuild(config: &HandoffConfig) -> Result<()> {
    config.ensure_data_dirs()?;
    let spinner = spinner("rebuilding index");
    let store = HandoffStore::new(&config.handoffs_dir);
    let index_path = config.index_path.clone();

    let count = tokio::task::spawn_blocking(move || -> Result<usize> {
        let index = IndexEngine::open(&index_path, &store)?;
        Ok(index.rebuild(&store)?)
    })
    .await??;

    spinner.finish_and_clear();
    println!("indexed {count} handoffs");
    Ok(())
}

async fn cmd_batch(config: HandoffConfig, args: BatchArgs) -> Result<()> {
    let params = BatchParams {
        concurrency: args.concurrency.unwrap_or(config.batch_concurrency),
        delay_seconds: args.delay.unwrap_or(config.batch_delay_secs),
        max: args.max,
        reindex: args.reindex,
        dry_run: args.dry_run,
    };
    params.validate()?;
    if !params.dry_run {
        config.ensure_data_dirs()?;
    }

    let interactive = create_extractor(ProviderKind::ClaudeCli, &config)?;
    let bulk = if args.interactive {
        Arc::clone(&interactive)
    } else {
        match create_extractor(ProviderKind::OpenRouter, &config) {
            Ok(extractor) => extractor,
            // A dry run never reaches the provider.
            Err(ExtractError::NotAvailable(_)) if params.dry_run => Arc::clone(&interactive),
            Err(e) => {
                return Err(e).context("bulk provider unavailable (pass --interactive to use the Claude CLI)")
            }
        }
    };
    let state = open_state(config, interactive, Some(bulk)).await?;
    let coordinator = state
        .batch_coordinator(params.dry_run)
        .context("no extraction provider configured")?;

    let bar = if params.dry_run || !std::io::stderr().is_terminal() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} sessions")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let progress_bar = bar.clone();
    let on_progress: ProgressFn = Arc::new(move |done: usize, total: usize| {
        progress_bar.set_length(total as u64);
        progress_bar.set_position(done as u64);
    });

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight sessions");
            interrupt.cancel();
        }
    });

    let summary = coordinator
        .run_with_progress(&params, cancel, on_progress)
        .await?;
    bar.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("scanned            {}", summary.scanned);
    println!("skipped (indexed)  {}", summary.skipped_indexed);
    println!("skipped (trivial)  {}", summary.skipped_trivial);
    println!("queued             {}", summary.queued);
    println!("deferred           {}", summary.deferred);
    println!("succeeded          {}", summary.succeeded);
    println!("failed             {}", summary.failed_count());
    for failure in &summary.failed {
        println!("  {}  {}", short_id(&failure.session_id), failure.reason);
    }
    if summary.dry_run {
        println!("dry run: nothing was extracted");
    }
    if summary.cancelled {
        println!("cancelled: rerun to pick up the remaining sessions");
    }
}

async fn cmd_serve(config: HandoffConfig, port: Option<u16>) -> Result<()> {
    config.ensure_data_dirs()?;
    let port = port.unwrap_or(config.port);
    let interactive = create_extractor(ProviderKind::ClaudeCli, &config)?;
    let bulk = match create_extractor(ProviderKind::OpenRouter, &config) {
        Ok(extractor) => Some(extractor),
        Err(e) => {
            tracing::info!(reason = %e, "bulk provider disabled");
            None
        }
    };

    let spinner = spinner("loading index");
    let state = open_state(config, interactive, bulk).await?;
    spinner.finish_and_clear();

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    eprintln!(
        "handoff v{} listening on http://{addr} ({} handoffs indexed)",
        env!("CARGO_PKG_VERSION"),
        state.index.len()
    );

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
