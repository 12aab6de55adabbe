//! eduquery CLI - build and query per-subject knowledge bases.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use eduquery_core::{EduQueryConfig, Embedder, KbError, RetrievalResult};
use eduquery_embed::{HashEmbedder, OnnxEmbedder};
use eduquery_history::{HistoryStore, Role};
use eduquery_kb::{BuildSummary, KnowledgeBaseRegistry};

type Registry = KnowledgeBaseRegistry<dyn Embedder>;

/// eduquery - question answering over course material, one subject at a time
#[derive(Parser)]
#[command(name = "eduquery")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: user config dir, then ./eduquery.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the built-in hashing encoder instead of the ONNX model
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List subjects and whether each is built
    Subjects,

    /// Build knowledge bases
    Build {
        /// Subject to build
        subject: Option<String>,

        /// Build every subject that is not built yet
        #[arg(long, conflicts_with = "subject")]
        all: bool,

        /// Rebuild subjects that are already built
        #[arg(short, long)]
        force: bool,
    },

    /// Retrieve passages relevant to a question
    Query {
        /// Subject to search
        subject: String,

        /// Question
        query: String,

        /// Number of passages to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Save the question and passages to the history
        #[arg(long)]
        record: bool,

        /// Conversation to append to (a new one is started otherwise)
        #[arg(long, requires = "record")]
        conversation: Option<String>,
    },

    /// Inspect or clear conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List conversations, most recent first
    List,

    /// Show the messages of a conversation
    Show {
        /// Conversation ID
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: String,
    },

    /// Delete all conversations
    Clear,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<EduQueryConfig, KbError> {
    match path {
        Some(path) => EduQueryConfig::load(path),
        None => EduQueryConfig::load_default(),
    }
}

fn load_embedder(config: &EduQueryConfig, offline: bool) -> Result<Arc<dyn Embedder>, KbError> {
    if offline {
        debug!("Using hashing encoder");
        return Ok(Arc::new(HashEmbedder::new()));
    }
    Ok(Arc::new(OnnxEmbedder::load(&config.embedding)?))
}

fn fail(e: &KbError) -> ! {
    eprintln!("Error [{}]: {}", e.error_code(), e);
    if e.needs_rebuild() {
        eprintln!("Rebuild the subject with 'eduquery build <SUBJECT> --force'.");
    }
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_ref()).unwrap_or_else(|e| fail(&e));

    let result = match cli.command {
        Commands::Subjects => {
            // Listing never embeds
            let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new());
            let registry: Registry = KnowledgeBaseRegistry::from_config(&config, embedder);
            list_subjects(&registry);
            Ok(())
        }
        Commands::Build {
            subject,
            all,
            force,
        } => load_embedder(&config, cli.offline).and_then(|embedder| {
            let registry: Registry = KnowledgeBaseRegistry::from_config(&config, embedder);
            build(&registry, subject.as_deref(), all, force)
        }),
        Commands::Query {
            subject,
            query,
            top_k,
            json,
            record,
            conversation,
        } => load_embedder(&config, cli.offline).and_then(|embedder| {
            let registry: Registry = KnowledgeBaseRegistry::from_config(&config, embedder);
            let results = search(&registry, &subject, &query, top_k)?;
            print_results(&results, json)?;
            if record {
                record_exchange(&config, &subject, &query, &results, conversation.as_deref())?;
            }
            Ok(())
        }),
        Commands::History { action } => HistoryStore::open(&config.paths.history_db)
            .and_then(|store| history(&store, action)),
    };

    if let Err(e) = result {
        fail(&e);
    }
    Ok(())
}

fn list_subjects(registry: &Registry) {
    let status = registry.status();
    if status.is_empty() {
        println!("No subjects found under {}", registry.data_root().display());
        return;
    }

    for subject in status {
        match subject.chunks {
            Some(chunks) => println!("  {:<24} built ({} chunks)", subject.name, chunks),
            None if subject.built => println!("  {:<24} built (unreadable)", subject.name),
            None => println!("  {:<24} not built", subject.name),
        }
    }
}

fn build(registry: &Registry, subject: Option<&str>, all: bool, force: bool) -> Result<(), KbError> {
    if let Some(subject) = subject {
        if registry.is_built(subject) && !force {
            println!("'{}' is already built; use --force to rebuild.", subject);
            return Ok(());
        }
        let report = registry.build(subject)?;
        println!(
            "Built '{}': {} documents ({} skipped), {} chunks, dim {}",
            report.subject, report.documents, report.skipped, report.chunks, report.dimension
        );
        return Ok(());
    }

    if !all {
        return Err(KbError::invalid_argument("name a subject or pass --all"));
    }

    let progress = |subject: &str, fraction: f32| {
        println!("[{:>3.0}%] {}", fraction * 100.0, subject);
    };
    let summary = if force {
        registry.rebuild_all(progress)
    } else {
        registry.build_all(progress)
    };
    print_summary(&summary);

    if summary.succeeded() || summary.failed.is_empty() {
        Ok(())
    } else {
        Err(KbError::internal("no subject could be built"))
    }
}

fn print_summary(summary: &BuildSummary) {
    if summary.built.is_empty() && summary.failed.is_empty() {
        println!("Nothing to build.");
        return;
    }
    for report in &summary.built {
        println!("  {} - OK ({} chunks)", report.subject, report.chunks);
    }
    for (subject, message) in &summary.failed {
        eprintln!("  {} - Error: {}", subject, message);
    }
    println!(
        "\nComplete: {} succeeded, {} failed",
        summary.built.len(),
        summary.failed.len()
    );
}

fn search(
    registry: &Registry,
    subject: &str,
    query: &str,
    top_k: Option<usize>,
) -> Result<Vec<RetrievalResult>, KbError> {
    let mut retrieval = registry.retrieval_config();
    if let Some(k) = top_k {
        if k == 0 {
            return Err(KbError::invalid_argument("-k must be at least 1"));
        }
        retrieval.k_final = k;
    }
    registry.retrieve_with(query, subject, &retrieval)
}

fn print_results(results: &[RetrievalResult], json: bool) -> Result<(), KbError> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No relevant passages found.");
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            rank + 1,
            result.score,
            result.source,
            result.id
        );
        println!("{}\n", result.text.trim());
    }
    Ok(())
}

fn record_exchange(
    config: &EduQueryConfig,
    subject: &str,
    query: &str,
    results: &[RetrievalResult],
    conversation: Option<&str>,
) -> Result<(), KbError> {
    let store = HistoryStore::open(&config.paths.history_db)?;
    let id = match conversation {
        Some(id) => id.to_string(),
        None => store.create_conversation(query, Some(subject))?.id,
    };

    let passages: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    let sources: Vec<String> = results.iter().map(|r| r.source.clone()).collect();
    store.append_message(&id, Role::User, query, &[])?;
    store.append_message(&id, Role::Assistant, &passages.join("\n\n"), &sources)?;

    println!("Recorded in conversation {}", id);
    Ok(())
}

fn history(store: &HistoryStore, action: HistoryAction) -> Result<(), KbError> {
    match action {
        HistoryAction::List => {
            let conversations = store.list_conversations()?;
            if conversations.is_empty() {
                println!("No conversations.");
            }
            for summary in conversations {
                let conv = &summary.conversation;
                println!(
                    "{}  {}  [{}]  {}",
                    conv.id,
                    conv.title,
                    conv.subject.as_deref().unwrap_or("-"),
                    summary.preview.as_deref().unwrap_or("")
                );
            }
        }
        HistoryAction::Show { id } => {
            for message in store.messages(&id)? {
                println!("{}: {}", message.role, message.content);
                if !message.context_sources.is_empty() {
                    println!("   sources: {}", message.context_sources.join(", "));
                }
            }
        }
        HistoryAction::Delete { id } => {
            store.delete_conversation(&id)?;
            println!("Deleted conversation {}", id);
        }
        HistoryAction::Clear => {
            let count = store.clear()?;
            println!("Deleted {} conversations", count);
        }
    }
    Ok(())
}
