//! CLI entry point for the retrieval engine.
//!
//! Provides commands for indexing the three knowledge bases, querying them,
//! and managing tenant collections on disk.

use anyhow::{Context, Result, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use dualrag::display::{THEME, create_hits_table, create_progress_bar, create_stats_table, with_spinner};
use dualrag::draft::build_prompt;
use dualrag::vector::embedder_from_config;
use dualrag::{
    Correction, FactDocument, KnowledgeBase, KnowledgeRetriever, RagError, Settings,
    StyleExample, TenantId, TopK, load_text_documents,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Retrieval engine for drafting email replies
#[derive(Parser)]
#[command(
    name = "dualrag",
    version = env!("CARGO_PKG_VERSION"),
    about = "Multi-collection retrieval for email reply drafting",
    long_about = "Index writing-style examples, enrollment documents and corrections, then retrieve labeled context for incoming emails.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .dualrag directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .dualrag/settings.toml")]
    Config,

    /// Index plain-text enrollment documents
    #[command(
        name = "index-facts",
        about = "Chunk and index .txt/.md files into the facts knowledge base",
        after_help = "Examples:\n  dualrag index-facts docs/\n  dualrag index-facts fees.txt --title \"Fees 2025\" --priority high --tenant 42"
    )]
    IndexFacts {
        /// Files or directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Tenant (workspace) id; global collections when omitted
        #[arg(short, long)]
        tenant: Option<String>,

        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        document_type: Option<String>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        priority: Option<String>,
    },

    /// Index one past question/answer pair
    #[command(name = "index-style", about = "Index a historical email for style")]
    IndexStyle {
        /// Student question
        #[arg(long)]
        query: String,

        /// Reply that was sent
        #[arg(long)]
        response: String,

        #[arg(long)]
        language: Option<String>,

        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Index a correction of a known mistake
    #[command(name = "index-correction", about = "Index a correction")]
    IndexCorrection {
        /// The wrong information
        #[arg(long)]
        wrong: String,

        /// The correct information
        #[arg(long)]
        correct: String,

        /// When the correction applies
        #[arg(long)]
        context: Option<String>,

        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Retrieve context for a query from all three knowledge bases
    #[command(
        about = "Search style, facts and corrections for a query",
        after_help = "Examples:\n  dualrag retrieve \"When does enrollment close?\"\n  dualrag retrieve \"tuition fees\" --k-facts 5 --json | jq '.confidence'"
    )]
    Retrieve {
        /// Query text, usually the body of an incoming email
        query: String,

        #[arg(short, long)]
        tenant: Option<String>,

        #[arg(long)]
        k_style: Option<usize>,

        #[arg(long)]
        k_facts: Option<usize>,

        #[arg(long)]
        k_corrections: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the generation prompt that would be built for an email
    #[command(about = "Assemble the reply prompt for an email")]
    Prompt {
        /// Body of the incoming email
        email: String,

        #[arg(short, long)]
        tenant: Option<String>,

        /// Detected language code of the email (e.g. it, en)
        #[arg(long)]
        language: Option<String>,

        /// Tenant-specific system prompt replacing the base instruction
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Show collection sizes
    #[command(about = "Show document counts of the three knowledge bases")]
    Stats {
        #[arg(short, long)]
        tenant: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Empty all three knowledge bases
    #[command(about = "Clear style, facts and corrections collections")]
    Clear {
        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Copy a tenant's collections to another tenant
    #[command(name = "clone-tenant", about = "Copy collections between tenants without re-embedding")]
    CloneTenant { source: String, target: String },

    /// Delete every collection file of a tenant
    #[command(name = "delete-tenant", about = "Remove a tenant's collections from disk")]
    DeleteTenant { tenant: String },
}

#[derive(Serialize)]
struct RetrieveOutput<'a> {
    query: &'a str,
    confidence: f32,
    #[serde(flatten)]
    result: &'a dualrag::RetrievalResult,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("{e:#}")));
            if let Some(rag) = e.downcast_ref::<RagError>() {
                for suggestion in rag.recovery_suggestions() {
                    eprintln!("  {suggestion}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn parse_tenant(tenant: Option<&str>) -> Result<Option<TenantId>> {
    tenant
        .map(|t| TenantId::new(t).map_err(RagError::from))
        .transpose()
        .context("Invalid --tenant")
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = cli.command {
        let path = Settings::init_config_file(force)?;
        println!(
            "{}",
            THEME.success_with_icon(&format!("Created configuration file at: {}", path.display()))
        );
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Configuration error loading from {}", path.display()))?,
        None => Settings::load().context("Configuration error")?,
    };

    if let Commands::Config = cli.command {
        println!("Current Configuration:");
        println!("{}", "=".repeat(50));
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let embedder = with_spinner("Loading embedding model...", || {
        embedder_from_config(&settings.embedding)
    })
    .map_err(RagError::from)?;
    let retriever = KnowledgeRetriever::from_settings(&settings, embedder)?;

    match cli.command {
        Commands::Init { .. } | Commands::Config => unreachable!("handled above"),

        Commands::IndexFacts {
            paths,
            tenant,
            title,
            document_type,
            language,
            priority,
        } => {
            let tenant = parse_tenant(tenant.as_deref())?;

            let mut documents = Vec::new();
            for path in &paths {
                documents.extend(
                    load_text_documents(path).map_err(RagError::from)?,
                );
            }
            if documents.is_empty() {
                bail!("No .txt or .md files found in the given paths");
            }

            let progress = create_progress_bar(documents.len() as u64, "Indexing documents");
            let mut chunks = 0;
            let mut skipped = 0;
            for document in &documents {
                progress.set_message(document.filename.clone());

                let mut fact = match FactDocument::new(document.content.as_str()) {
                    Ok(fact) => fact,
                    Err(_) => {
                        warn!(path = %document.path.display(), "Skipping empty document");
                        skipped += 1;
                        progress.inc(1);
                        continue;
                    }
                };
                fact = fact.with_title(title.clone().unwrap_or_else(|| document.filename.clone()));
                if let Some(document_type) = &document_type {
                    fact = fact.with_document_type(document_type);
                }
                if let Some(language) = &language {
                    fact = fact.with_language(language);
                }
                if let Some(priority) = &priority {
                    fact = fact.with_priority(priority);
                }

                chunks += retriever.index_source_documents(
                    tenant.as_ref(),
                    std::slice::from_ref(document),
                    &fact.metadata(),
                )?;
                progress.inc(1);
            }
            progress.finish_and_clear();

            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "Indexed {} documents as {chunks} chunks",
                    documents.len() - skipped
                ))
            );
            if skipped > 0 {
                println!(
                    "{}",
                    THEME.warning_with_icon(&format!("Skipped {skipped} empty documents"))
                );
            }
        }

        Commands::IndexStyle {
            query,
            response,
            language,
            tenant,
        } => {
            let tenant = parse_tenant(tenant.as_deref())?;
            let mut example = StyleExample::new(query, response).map_err(RagError::from)?;
            if let Some(language) = language {
                example = example.with_language(language);
            }
            let count = retriever.index_style_example(tenant.as_ref(), example)?;
            println!(
                "{}",
                THEME.success_with_icon(&format!("Indexed style example ({count} in collection)"))
            );
        }

        Commands::IndexCorrection {
            wrong,
            correct,
            context,
            tenant,
        } => {
            let tenant = parse_tenant(tenant.as_deref())?;
            let mut correction = Correction::new(wrong, correct).map_err(RagError::from)?;
            if let Some(context) = context {
                correction = correction.with_context(context);
            }
            let count = retriever.index_correction(tenant.as_ref(), correction)?;
            println!(
                "{}",
                THEME.success_with_icon(&format!("Indexed correction ({count} in collection)"))
            );
        }

        Commands::Retrieve {
            query,
            tenant,
            k_style,
            k_facts,
            k_corrections,
            json,
        } => {
            let tenant = parse_tenant(tenant.as_deref())?;
            let defaults = TopK::from(&settings.retrieval);
            let k = TopK {
                style: k_style.unwrap_or(defaults.style),
                facts: k_facts.unwrap_or(defaults.facts),
                corrections: k_corrections.unwrap_or(defaults.corrections),
            };

            let result = retriever.retrieve(&query, tenant.as_ref(), k);
            let confidence = result.confidence();

            if json {
                let output = RetrieveOutput {
                    query: &query,
                    confidence,
                    result: &result,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            for kb in KnowledgeBase::ALL {
                let hits = result.hits(kb);
                println!(
                    "{} {}",
                    THEME.apply(&THEME.header, kb.label()),
                    THEME.apply(&THEME.dim, format!("({} results)", hits.len()))
                );
                if result.degraded.contains(&kb) {
                    println!(
                        "{}",
                        THEME.warning_with_icon("Search failed, treated as empty")
                    );
                } else if !hits.is_empty() {
                    println!("{}", create_hits_table(hits));
                }
            }

            let verdict = if confidence >= settings.retrieval.confidence_threshold {
                THEME.success_with_icon("auto-approve")
            } else {
                THEME.warning_with_icon("needs review")
            };
            println!(
                "Confidence: {} {verdict}",
                THEME.apply(&THEME.number, format!("{confidence:.3}"))
            );
        }

        Commands::Prompt {
            email,
            tenant,
            language,
            system_prompt,
        } => {
            let tenant = parse_tenant(tenant.as_deref())?;
            let result =
                retriever.retrieve(&email, tenant.as_ref(), TopK::from(&settings.retrieval));
            let base = system_prompt
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(&settings.draft.base_instruction);
            println!("{}", build_prompt(base, language.as_deref(), &result, &email));
        }

        Commands::Stats { tenant, json } => {
            let tenant = parse_tenant(tenant.as_deref())?;
            let stats = retriever.stats(tenant.as_ref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", create_stats_table(&stats));
            }
        }

        Commands::Clear { tenant } => {
            let tenant = parse_tenant(tenant.as_deref())?;
            retriever.clear_all(tenant.as_ref())?;
            println!("{}", THEME.success_with_icon("Cleared all knowledge bases"));
        }

        Commands::CloneTenant { source, target } => {
            let source = TenantId::new(source).map_err(RagError::from)?;
            let target = TenantId::new(target).map_err(RagError::from)?;
            let copied = retriever.clone_tenant(&source, &target)?;
            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "Copied {copied} collections from {source} to {target}"
                ))
            );
        }

        Commands::DeleteTenant { tenant } => {
            let tenant = TenantId::new(tenant).map_err(RagError::from)?;
            let deleted = retriever.delete_tenant(&tenant)?;
            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "Deleted {deleted} collections of tenant {tenant}"
                ))
            );
        }
    }

    Ok(())
}
