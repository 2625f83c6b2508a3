//! # Redline CLI (`redline`)
//!
//! Checks whether the reviewer comments made on one version of a document
//! were addressed in the next version.
//!
//! ## Usage
//!
//! ```bash
//! redline --config ./config/redline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `redline analyze` | Run one analysis in-process and print the verdict summary |
//! | `redline chunk <file>` | Print the chunk windows of a document |
//! | `redline serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! redline analyze --v1 contract_v1.pdf --v2 contract_v2.pdf --comments review.txt
//! redline analyze --v1 a.docx --v2 b.docx --comments c.txt --out report.json --progress json
//! RUST_LOG=redline=debug redline serve --log-json
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use redline::config::{load_config, Config};
use redline::extract::load_document_text;
use redline::pipeline::{AnalysisRequest, Pipeline};
use redline::progress::ProgressMode;
use redline::server::run_server;
use redline::tasks::TaskRegistry;
use redline_core::chunk::split_text;
use redline_core::models::{ReportSummary, TaskStatus};

#[derive(Parser)]
#[command(
    name = "redline",
    about = "Redline: was each review comment addressed in the new document version?",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/redline.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines instead of compact text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one document pair against a comments file.
    Analyze {
        /// First (reviewed) version of the document: .txt, .md, .pdf or .docx.
        #[arg(long)]
        v1: PathBuf,

        /// Revised version of the document.
        #[arg(long)]
        v2: PathBuf,

        /// Comments file, one comment per line.
        #[arg(long)]
        comments: PathBuf,

        /// Also write the report JSON to this file.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print the chunks a document is split into.
    Chunk {
        file: PathBuf,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Analyze {
            v1,
            v2,
            comments,
            out,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            run_analyze(&config, &v1, &v2, &comments, out.as_deref(), mode).await?;
        }
        Commands::Chunk { file } => {
            run_chunk(&config, &file)?;
        }
        Commands::Serve => {
            run_server(&config).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

async fn run_analyze(
    config: &Config,
    v1: &Path,
    v2: &Path,
    comments: &Path,
    out: Option<&Path>,
    mode: ProgressMode,
) -> Result<()> {
    let registry = Arc::new(TaskRegistry::new());
    let pipeline = Pipeline::from_config(config, registry)?.with_progress(Arc::from(mode.reporter()));

    let request = AnalysisRequest::from_paths(v1, v2, comments);
    let task_id = pipeline.create_task(
        &request.doc_v1_name,
        &request.doc_v2_name,
        &request.comments_name,
    );
    let Some(task) = pipeline.run(&task_id, &request).await else {
        bail!("task {} disappeared from the registry", task_id);
    };

    if task.status != TaskStatus::Completed {
        bail!(
            "analysis failed: {}",
            task.error.as_deref().unwrap_or("unknown error")
        );
    }
    let report = task.report.unwrap_or_default();

    if let Some(out) = out {
        std::fs::write(out, serde_json::to_string_pretty(&report)?)?;
    }

    let summary = ReportSummary::from_results(&report);
    println!("Task:      {}", task.id);
    println!("Comments:  {}", summary.total);
    println!("  addressed:            {}", summary.addressed);
    println!("  partially addressed:  {}", summary.partially_addressed);
    println!("  not addressed:        {}", summary.not_addressed);
    println!("  error:                {}", summary.error);
    if let Some(path) = &task.report_path {
        println!("Report:    {}", path);
    }
    if let Some(out) = out {
        println!("Written:   {}", out.display());
    }

    Ok(())
}

fn run_chunk(config: &Config, file: &Path) -> Result<()> {
    let text = load_document_text(file)?;
    let chunks = split_text(&text, config.chunking.size, config.chunking.overlap);
    if chunks.is_empty() {
        println!("{}: no text", file.display());
        return Ok(());
    }
    for (i, chunk) in chunks.iter().enumerate() {
        println!("--- chunk {} ({} chars) ---", i, chunk.chars().count());
        println!("{}", chunk);
    }
    println!("{} chunks (size {}, overlap {})", chunks.len(), config.chunking.size, config.chunking.overlap);
    Ok(())
}
