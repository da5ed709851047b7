//! # PaperLens CLI (`paperlens`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `paperlens serve` | Start the HTTP server and the artifact sweeper |
//! | `paperlens outline <file>` | Compile a bullet outline into a JSON graph |
//! | `paperlens load <source> --query <text>` | Load a document and print the nearest passage |
//! | `paperlens sweep` | Run one eviction pass over the artifact directory |
//!
//! ## Examples
//!
//! ```bash
//! paperlens --config ./config/paperlens.toml serve
//! paperlens outline notes.md --summary "Widgets improve throughput."
//! paperlens load https://arxiv.org/abs/1706.03762 --query "what is attention?"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paperlens::artifacts::ArtifactStore;
use paperlens::config::{self, Config};
use paperlens::embedding::create_embedder;
use paperlens::extract::FileExtractor;
use paperlens::fetch::HttpFetcher;
use paperlens::session::SessionManager;
use paperlens_core::outline::compile_outline_with;

#[derive(Parser)]
#[command(
    name = "paperlens",
    about = "PaperLens: ask questions about a research paper and map its outline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, built-in defaults are used: artifacts in
    /// the system temp dir, AI providers disabled.
    #[arg(long, global = true, default_value = "./config/paperlens.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Compile an outline file into a node/edge graph and print it as JSON.
    Outline {
        /// Outline text file; `-` reads stdin.
        file: PathBuf,

        /// Summary used when the outline has no bullets.
        #[arg(long, default_value = "")]
        summary: String,
    },

    /// Load a document once and print the passage nearest to a query.
    Load {
        /// URL or local path.
        source: String,

        #[arg(long)]
        query: String,
    },

    /// Evict aged-out files from the artifact directory.
    ///
    /// This command cannot see which document a running server has loaded
    /// and may delete it. Run it only while no server is using the
    /// artifact directory; a running server sweeps on its own.
    Sweep {
        /// Override `[artifacts].max_age_secs`.
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "paperlens=debug,tower_http=debug"
    } else {
        "paperlens=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Outline compilation needs no config file.
    if let Commands::Outline { file, summary } = &cli.command {
        let text = if file.as_os_str() == "-" {
            std::io::read_to_string(std::io::stdin())?
        } else {
            std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?
        };
        let excerpt_chars = load_or_default(&cli.config)
            .map(|c| c.outline.excerpt_chars)
            .unwrap_or(paperlens_core::outline::DEFAULT_EXCERPT_CHARS);
        let graph = compile_outline_with(&text, summary, excerpt_chars);
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    let mut cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            paperlens::server::run_server(&cfg).await?;
        }
        Commands::Load { source, query } => {
            let session = SessionManager::new(
                Arc::new(ArtifactStore::open(&cfg.artifacts.dir)?),
                Arc::new(HttpFetcher::new(Duration::from_secs(60))?),
                Arc::new(FileExtractor::new(cfg.chunking.max_tokens)),
                create_embedder(&cfg.embedding)?,
            );
            let slot = session.load_document(&source).await?;
            eprintln!(
                "Loaded {} ({} chunks) into {}",
                source,
                slot.index.len(),
                slot.path.display()
            );
            let hit = session.query(&query).await?;
            println!("{}", serde_json::to_string_pretty(&hit)?);
        }
        Commands::Sweep { max_age_secs } => {
            let store = ArtifactStore::open(&cfg.artifacts.dir)?;
            let max_age = max_age_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| cfg.artifacts.max_age());
            let report = store.evict_older_than(max_age, || None);
            println!(
                "Removed {} file(s), {} failed, in {}",
                report.removed,
                report.failed,
                store.dir().display()
            );
        }
        Commands::Outline { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
