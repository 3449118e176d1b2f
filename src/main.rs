//! docent CLI
//!
//! Commands:
//!   inspect - extract chunks from files without embedding them
//!   formats - list the formats the installed handlers accept
//!   ask     - answer one question about a set of documents
//!   chat    - interactive question loop over a set of documents

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dialoguer::Input;
use docent_core::Assistant;
use docent_core::config::Config;
use docent_ingest::{FileInput, FileOutcome, HandlerRegistry, extract_batch};
use docent_llm::ollama::OllamaProvider;
use docent_llm::{AnyProvider, ChatStream};
use docent_memory::{IngestOutcome, IngestionPipeline, KnowledgeBase};
use futures::StreamExt;

#[derive(Debug, Parser)]
#[command(name = "docent")]
#[command(about = "Ask a local model questions about your documents")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract and print chunks without embedding them
    Inspect {
        /// Files or directories to extract
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print chunks as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List supported formats and the handler that owns each
    Formats,

    /// Answer a single question
    Ask {
        question: String,

        /// Files or directories to ground the answer in
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,

        /// Send the question without retrieved context
        #[arg(long)]
        no_rag: bool,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Discard stored chunks and ingest the documents again
        #[arg(long)]
        rebuild: bool,
    },

    /// Interactive chat over documents
    Chat {
        /// Files or directories to ground answers in
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,

        /// Start with retrieval disabled
        #[arg(long)]
        no_rag: bool,

        /// Discard stored chunks and ingest the documents again
        #[arg(long)]
        rebuild: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Inspect { paths, json } => {
            config.validate()?;
            inspect(&config, &paths, json)
        }
        Command::Formats => {
            print_formats(&HandlerRegistry::with_default_handlers());
            Ok(())
        }
        Command::Ask {
            question,
            docs,
            no_rag,
            top_k,
            rebuild,
        } => {
            if let Some(k) = top_k {
                config.retrieval.top_k = k;
            }
            if no_rag {
                config.retrieval.use_rag = false;
            }
            config.validate()?;
            let assistant = prepare(&config, &docs, rebuild).await?;
            let stream = assistant.ask(&question).await?;
            print_stream(stream).await?;
            Ok(())
        }
        Command::Chat {
            docs,
            no_rag,
            rebuild,
        } => {
            if no_rag {
                config.retrieval.use_rag = false;
            }
            config.validate()?;
            let assistant = prepare(&config, &docs, rebuild).await?;
            chat_loop(assistant).await
        }
    }
}

fn build_provider(config: &Config) -> AnyProvider {
    AnyProvider::Ollama(OllamaProvider::new(
        &config.llm.base_url,
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
    ))
}

/// Open the configured store; `rebuild` empties it first.
async fn open_knowledge(
    config: &Config,
    provider: &AnyProvider,
    rebuild: bool,
) -> anyhow::Result<Arc<KnowledgeBase>> {
    let embed_fn = Box::new(provider.embed_fn());
    let knowledge = if config.storage.persist {
        let dir = &config.storage.data_dir;
        KnowledgeBase::persistent(dir, embed_fn)
            .await
            .with_context(|| format!("opening knowledge base in {}", dir.display()))?
    } else {
        KnowledgeBase::in_memory(embed_fn)
    };
    if rebuild {
        knowledge.reset().await?;
    }
    Ok(Arc::new(knowledge))
}

/// Build the provider, knowledge base and pipeline, then ingest the `docs`
/// not already stored.
async fn prepare(
    config: &Config,
    docs: &[PathBuf],
    rebuild: bool,
) -> anyhow::Result<Assistant<AnyProvider>> {
    let provider = build_provider(config);
    if let AnyProvider::Ollama(ollama) = &provider {
        match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        }
    }

    let knowledge = open_knowledge(config, &provider, rebuild).await?;
    let registry = Arc::new(HandlerRegistry::with_default_handlers());
    let pipeline = IngestionPipeline::new(registry, Arc::clone(&knowledge), config.extract_options())
        .with_max_file_size(config.ingest.max_file_size);

    let inputs = collect_inputs(docs)?;
    if inputs.is_empty() {
        if config.retrieval.use_rag && knowledge.chunk_count().await? == 0 {
            tracing::warn!("no documents given or stored; answers will have no context");
        }
    } else {
        let report = pipeline.ingest_new(inputs).await;
        for (name, outcome) in &report.files {
            match outcome {
                IngestOutcome::Ingested { handler, chunks } => {
                    eprintln!("  {name}: {chunks} chunks ({handler})");
                }
                IngestOutcome::Skipped(reason) => eprintln!("  {name}: skipped ({reason:?})"),
                IngestOutcome::TooLarge(size) => eprintln!("  {name}: skipped ({size} bytes)"),
                IngestOutcome::AlreadyStored => eprintln!("  {name}: already stored"),
                IngestOutcome::Failed(e) => eprintln!("  {name}: failed: {e}"),
            }
        }
        eprintln!(
            "{} documents processed, {} failed, {} skipped",
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
    }

    Ok(Assistant::new(provider, knowledge, &config.retrieval))
}

fn inspect(config: &Config, paths: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let registry = HandlerRegistry::with_default_handlers();
    let report = extract_batch(&registry, collect_inputs(paths)?, &config.extract_options());

    let mut out = std::io::stdout().lock();
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Processed { handler, chunks } => {
                if json {
                    for chunk in chunks {
                        writeln!(out, "{}", serde_json::to_string(chunk)?)?;
                    }
                } else {
                    writeln!(out, "{} ({handler}): {} chunks", file.source, chunks.len())?;
                    for chunk in chunks {
                        let preview: String = chunk.content.chars().take(72).collect();
                        writeln!(
                            out,
                            "  [{}] {} {}",
                            chunk.chunk_type.as_str(),
                            chunk.chunk_id,
                            preview.replace('\n', " ")
                        )?;
                    }
                }
            }
            FileOutcome::Skipped(reason) => {
                eprintln!("{}: skipped ({reason:?})", file.source);
            }
            FileOutcome::Failed(e) => eprintln!("{}: failed: {e}", file.source),
        }
    }

    if report.processed() == 0 && report.failed() > 0 {
        bail!("no file could be processed");
    }
    Ok(())
}

fn print_formats(registry: &HandlerRegistry) {
    println!("handlers: {}", registry.handler_names().join(", "));
    for (format, extensions) in registry.supported_formats() {
        println!("  {format:<10} {}", extensions.join(" "));
    }
}

/// Expand directories (recursively, sorted) into file inputs.
fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<FileInput>> {
    let mut files = Vec::new();
    for path in paths {
        collect_into(path, &mut files)?;
    }
    Ok(files.into_iter().map(FileInput::path).collect())
}

fn collect_into(path: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if !path.is_dir() {
        files.push(path.to_path_buf());
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("reading directory {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for entry in entries {
        collect_into(&entry, files)?;
    }
    Ok(())
}

/// Print fragments as they arrive; Ctrl-C abandons the answer.
async fn print_stream(mut stream: ChatStream) -> anyhow::Result<String> {
    let mut full = String::new();
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            fragment = stream.next() => {
                let Some(fragment) = fragment else { break };
                let fragment = fragment?;
                print!("{fragment}");
                stdout.flush()?;
                full.push_str(&fragment);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("answer interrupted");
                break;
            }
        }
    }
    println!();
    Ok(full)
}

async fn read_line() -> anyhow::Result<String> {
    let line = tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
    })
    .await??;
    Ok(line)
}

async fn chat_loop(mut assistant: Assistant<AnyProvider>) -> anyhow::Result<()> {
    println!("Type a question, /help for commands, /exit to quit.");
    loop {
        let line = read_line().await?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("/exit" | "/quit", _) => break,
            ("/help", _) => {
                println!("/sources          list ingested files");
                println!("/remove <source>  forget one file");
                println!("/reset            forget every file");
                println!("/rag on|off       toggle retrieval");
                println!("/exit             quit");
            }
            ("/sources", _) => {
                for source in assistant.knowledge().sources().await? {
                    println!("  {source}");
                }
            }
            ("/remove", source) if !source.is_empty() => {
                let removed = assistant.knowledge().remove_source(source).await?;
                println!("removed {removed} chunks");
            }
            ("/reset", _) => {
                assistant.knowledge().reset().await?;
                println!("knowledge base cleared");
            }
            ("/rag", "on") => assistant.set_use_rag(true),
            ("/rag", "off") => assistant.set_use_rag(false),
            (cmd, _) if cmd.starts_with('/') => println!("unknown command: {line}"),
            _ => match assistant.ask(line).await {
                Ok(stream) => {
                    if let Err(e) = print_stream(stream).await {
                        tracing::error!("error generating response: {e:#}");
                    }
                }
                Err(e) => tracing::error!("error generating response: {e:#}"),
            },
        }
    }
    Ok(())
}
