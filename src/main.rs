//! # askdoc CLI
//!
//! The `askdoc` binary drives the question-answering pipeline over a single
//! document. The session store is in-memory by design, so every invocation
//! is its own session: `ask` ingests and answers once, `chat` keeps the
//! session alive for a multi-turn conversation.
//!
//! ## Usage
//!
//! ```bash
//! askdoc --config ./config/askdoc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdoc ask --file <path> "<question>"` | Ingest a text file and answer one question |
//! | `askdoc chat --file <path>` | Ingest a text file and answer questions interactively |
//! | `askdoc chunks --file <path>` | Show the chunker's output for a file |
//!
//! ## Examples
//!
//! ```bash
//! # One-shot question
//! askdoc ask --file invoice.txt "What is the total amount?"
//!
//! # Multi-page document (form feeds mark page breaks)
//! askdoc ask --file scan.txt --split-pages "When is payment due?"
//!
//! # Interactive session
//! askdoc chat --file contract.txt
//!
//! # Inspect chunking
//! askdoc chunks --file contract.txt
//! ```
//!
//! Without a config file, built-in defaults apply: both providers disabled,
//! which exercises the full degradation ladder (lexical retrieval +
//! extractive answers). Set `OPENROUTER_API_KEY` to fill in the API key for
//! any provider enabled in the config without an inline key.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use askdoc::config::{self, Config};
use askdoc::engine::QaEngine;
use askdoc::models::{ConversationTurn, PageInput, SourceRef};

/// askdoc — session-scoped document Q&A with graceful degradation.
#[derive(Parser)]
#[command(
    name = "askdoc",
    about = "askdoc — ask questions about a document, grounded in its text",
    version,
    long_about = "askdoc ingests a text document, chunks and embeds it, and answers \
    natural-language questions grounded in the document's content, citing page and \
    section provenance. When embedding or generation APIs are unavailable it degrades \
    to lexical retrieval and extractive answers instead of failing."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, built-in defaults apply (providers
    /// disabled; lexical retrieval and extractive answers only).
    #[arg(long, global = true, default_value = "./config/askdoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a document and answer a single question.
    Ask {
        /// Path to the document's extracted text.
        #[arg(long)]
        file: PathBuf,

        /// Treat form-feed characters (U+000C) as page breaks so answers
        /// can cite page numbers.
        #[arg(long)]
        split_pages: bool,

        /// The question to answer.
        question: String,
    },

    /// Ingest a document and answer questions interactively.
    ///
    /// Reads one question per line from stdin; the conversation history is
    /// carried across turns. Exit with `exit`, `quit`, or EOF.
    Chat {
        /// Path to the document's extracted text.
        #[arg(long)]
        file: PathBuf,

        /// Treat form-feed characters (U+000C) as page breaks.
        #[arg(long)]
        split_pages: bool,
    },

    /// Show the chunker's output for a document.
    ///
    /// Prints each chunk's index, byte span, overlap, and provenance.
    /// Useful for tuning `[chunking]` settings.
    Chunks {
        /// Path to the document's extracted text.
        #[arg(long)]
        file: PathBuf,

        /// Treat form-feed characters (U+000C) as page breaks.
        #[arg(long)]
        split_pages: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Ask {
            file,
            split_pages,
            question,
        } => run_ask(cfg, &file, split_pages, &question).await,
        Commands::Chat { file, split_pages } => run_chat(cfg, &file, split_pages).await,
        Commands::Chunks { file, split_pages } => run_chunks(cfg, &file, split_pages),
    }
}

/// Load the config file, falling back to defaults when it does not exist.
/// A file that exists but fails to parse or validate is still an error.
/// `OPENROUTER_API_KEY` fills in missing API keys for enabled providers.
fn load_config_or_default(path: &Path) -> Result<Config> {
    let mut cfg = if path.exists() {
        config::load_config(path)?
    } else {
        Config::default()
    };

    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        if !key.is_empty() {
            cfg.embedding.api_key.get_or_insert(key.clone());
            cfg.generation.api_key.get_or_insert(key);
        }
    }

    Ok(cfg)
}

/// Read the document text, optionally splitting form feeds into pages.
fn read_pages(file: &Path, split_pages: bool) -> Result<Vec<PageInput>> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document: {}", file.display()))?;

    if split_pages {
        Ok(raw
            .split('\u{0C}')
            .enumerate()
            .map(|(i, text)| PageInput {
                page: (i + 1) as u32,
                text: text.to_string(),
            })
            .collect())
    } else {
        Ok(vec![PageInput { page: 1, text: raw }])
    }
}

async fn ingest_file(
    engine: &QaEngine,
    file: &Path,
    split_pages: bool,
) -> Result<String> {
    let pages = read_pages(file, split_pages)?;
    let doc_id = engine.ingest(pages).await?;
    Ok(doc_id)
}

async fn run_ask(cfg: Config, file: &Path, split_pages: bool, question: &str) -> Result<()> {
    let engine = QaEngine::from_config(cfg);
    let doc_id = ingest_file(&engine, file, split_pages).await?;
    let turn = engine.ask(&doc_id, question).await?;
    print_turn(&turn);
    Ok(())
}

async fn run_chat(cfg: Config, file: &Path, split_pages: bool) -> Result<()> {
    let engine = QaEngine::from_config(cfg);
    engine.start_sweeper();
    let doc_id = ingest_file(&engine, file, split_pages).await?;

    println!("Document ingested ({}).", file.display());
    println!("Ask questions, one per line. `exit` to quit.");
    println!();

    use std::io::Write;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match engine.ask(&doc_id, question).await {
            Ok(turn) => {
                print_turn(&turn);
                println!();
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    engine.evict(&doc_id);
    Ok(())
}

fn run_chunks(cfg: Config, file: &Path, split_pages: bool) -> Result<()> {
    let pages = read_pages(file, split_pages)?;
    let (text, spans, _) = askdoc::chunk::assemble_pages(&pages);
    let chunks = askdoc::chunk::chunk_document(&text, &cfg.chunking, &spans);
    println!("chunks: {} (normalized {} bytes)", chunks.len(), text.len());
    for chunk in &chunks {
        println!(
            "  [{}] bytes {}..{} (overlap {}){}",
            chunk.chunk_index,
            chunk.start,
            chunk.end,
            chunk.overlap,
            source_label(&chunk.source_ref),
        );
        let preview: String = chunk.text.chars().take(72).collect();
        println!("      \"{}\"", preview.replace('\n', " "));
    }
    Ok(())
}

fn print_turn(turn: &ConversationTurn) {
    println!("{}", turn.answer);
    if !turn.sources.is_empty() {
        let rendered: Vec<String> = turn
            .sources
            .iter()
            .map(|s| source_label(s).trim_start_matches(' ').to_string())
            .collect();
        println!();
        println!("sources: {}", rendered.join("; "));
    }
    if turn.used_fallback {
        println!("note: generation unavailable, extractive answer shown");
    }
}

fn source_label(source: &SourceRef) -> String {
    match (&source.page, &source.section) {
        (Some(page), Some(section)) => format!(" page {} ({})", page, section),
        (Some(page), None) => format!(" page {}", page),
        (None, Some(section)) => format!(" ({})", section),
        (None, None) => String::new(),
    }
}
