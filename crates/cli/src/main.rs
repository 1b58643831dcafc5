mod config;
mod extractor;

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Parser, Subcommand};
use pagescribe_core::{
    decode_data_url, set_qualifier, BatchOrchestrator, BatchOutcome, BatchPhase,
    CompressionTier, Compressor, EntryPatch, NewEntry, PageSource, Qualifier,
};
use pagescribe_store::{
    commit_entry, EntryDraft, EntryStore, LocalUploader, SqliteEntryStore, DEFAULT_PAGE_SIZE,
};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, AppConfig, DEFAULT_CONFIG};
use crate::extractor::Extractor;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const VERSION_LONG: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (features: ",
    env!("PAGESCRIBE_FEATURES"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "pagescribe", version = VERSION, long_version = VERSION_LONG, about = "Turn photographed pages into local journal entries")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value = "local")]
    user: String,
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract text from page images, in order, into one combined text.
    Extract {
        #[arg(required = true)]
        images: Vec<String>,
        #[arg(long)]
        tier: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Commit the combined text as a journal entry.
        #[arg(long, default_value_t = false)]
        save: bool,
        #[arg(long, default_value = "")]
        title: String,
        /// Attach the pages to an existing entry instead of creating one.
        #[arg(long)]
        entry: Option<String>,
        #[arg(long = "qualifier")]
        qualifiers: Vec<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Compress one image with a tier and write the re-encoded bytes.
    Compress {
        image: String,
        #[arg(long)]
        tier: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Create an entry from manually typed text.
    New {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        text: String,
        #[arg(long = "qualifier")]
        qualifiers: Vec<String>,
        /// Entry date as YYYY-MM-DD; defaults to now.
        #[arg(long)]
        date: Option<String>,
    },
    Show {
        id: String,
    },
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long = "page-size", default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long = "qualifier")]
        qualifiers: Vec<String>,
        #[arg(long)]
        date: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = load_config(&config_path)?;
    debug!(config = %config_path.display(), "configuration loaded");

    match cli.command {
        Commands::Extract {
            images,
            tier,
            provider,
            model,
            save,
            title,
            entry,
            qualifiers,
            json,
        } => {
            let tier = resolve_tier(tier.as_deref(), &config)?;
            let provider = provider.unwrap_or_else(|| config.provider());
            let extractor = Extractor::build(&provider, model.or_else(|| config.model()), config.ocr_langs())?;
            let sources: Vec<PageSource> = images.iter().map(|s| PageSource::from_arg(s)).collect();
            let compressor = Compressor::new(config.tier_table()?);
            let batch = {
                let mut orchestrator = BatchOrchestrator::new(&extractor)
                    .with_compression(compressor, tier)
                    .on_phase(|phase| {
                        if phase == BatchPhase::Extracting {
                            info!(pages = sources.len(), "extracting pages");
                        }
                    });
                orchestrator.process_images(&sources).await
            };
            let outcome = batch.outcome();

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "results": batch.results,
                        "combinedText": batch.combined_text,
                    }))?
                );
            } else {
                for (idx, result) in batch.results.iter().enumerate() {
                    match &result.error {
                        None => eprintln!(
                            "page {}: ok ({} uncertain spans)",
                            idx + 1,
                            result.error_ranges.len()
                        ),
                        Some(err) => eprintln!("page {}: FAILED ({err})", idx + 1),
                    }
                }
                println!("{}", batch.combined_text);
            }

            match &outcome {
                BatchOutcome::AllFailed => {
                    bail!(
                        "no page could be read; retry the extraction or type the entry with `pagescribe new --text ...`"
                    );
                }
                BatchOutcome::PartialSuccess { failed_pages } => {
                    eprintln!(
                        "warning: pages {:?} failed and are missing from the combined text",
                        failed_pages
                    );
                }
                BatchOutcome::AllSucceeded => {}
            }

            if save {
                let store = SqliteEntryStore::open(config.store_path())?;
                let uploader = LocalUploader::new(config.upload_root());
                let mut draft = EntryDraft::from_batch(&batch, title);
                draft.qualifiers = collect_qualifiers(Vec::new(), &qualifiers)?;
                let saved = commit_entry(&store, &uploader, &cli.user, entry.as_deref(), draft)?;
                eprintln!("saved entry {}", saved.id);
            }
        }
        Commands::Compress { image, tier, out } => {
            let tier = resolve_tier(tier.as_deref(), &config)?;
            let data_url = PageSource::from_arg(&image).load()?;
            let compressed = Compressor::new(config.tier_table()?).compress(&data_url, tier);
            fs::write(&out, decode_data_url(&compressed.data_url)?)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "{} -> {}: {:.1} KB -> {:.1} KB (ratio {:.2})",
                image,
                out.display(),
                compressed.original_size_kb,
                compressed.compressed_size_kb,
                compressed.ratio
            );
        }
        Commands::New {
            title,
            text,
            qualifiers,
            date,
        } => {
            let store = SqliteEntryStore::open(config.store_path())?;
            let draft = EntryDraft {
                title,
                text,
                qualifiers: collect_qualifiers(Vec::new(), &qualifiers)?,
                entry_date: date.as_deref().map(parse_date).transpose()?,
                images: Vec::new(),
            };
            draft.validate()?;
            let entry = store.create(
                &cli.user,
                NewEntry {
                    title: draft.title,
                    text: draft.text,
                    images: Vec::new(),
                    qualifiers: draft.qualifiers,
                    entry_date: draft.entry_date,
                },
            )?;
            println!("{}", entry.id);
        }
        Commands::Show { id } => {
            let store = SqliteEntryStore::open(config.store_path())?;
            let entry = store.get_by_id(&cli.user, &id)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Commands::List { page, page_size } => {
            let store = SqliteEntryStore::open(config.store_path())?;
            let listing = store.list(&cli.user, page, page_size)?;
            for entry in &listing.entries {
                println!(
                    "{}\t{}\t{}",
                    entry.id,
                    entry.entry_date.format("%Y-%m-%d"),
                    if entry.title.is_empty() { "(untitled)" } else { &entry.title }
                );
            }
            eprintln!(
                "{} of {} entries (page {page})",
                listing.entries.len(),
                listing.total_count
            );
        }
        Commands::Edit {
            id,
            title,
            text,
            qualifiers,
            date,
        } => {
            let store = SqliteEntryStore::open(config.store_path())?;
            let current = store.get_by_id(&cli.user, &id)?;
            let patch = EntryPatch {
                title,
                text,
                images: None,
                qualifiers: if qualifiers.is_empty() {
                    None
                } else {
                    Some(collect_qualifiers(current.qualifiers, &qualifiers)?)
                },
                entry_date: date.as_deref().map(parse_date).transpose()?,
            };
            let updated = store.update(&cli.user, &id, &patch)?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Commands::Delete { id } => {
            let store = SqliteEntryStore::open(config.store_path())?;
            store.delete(&cli.user, &id)?;
            eprintln!("deleted entry {id}");
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_tier(flag: Option<&str>, config: &AppConfig) -> Result<CompressionTier> {
    match flag {
        Some(name) => name.parse().map_err(|e| anyhow!("{e}")),
        None => config.default_tier(),
    }
}

/// Applies `Key: Value` arguments on top of `existing`, one value per key.
fn collect_qualifiers(mut existing: Vec<String>, args: &[String]) -> Result<Vec<String>> {
    for raw in args {
        let qualifier =
            Qualifier::parse(raw).ok_or_else(|| anyhow!("qualifier {raw:?} is not `Key: Value`"))?;
        set_qualifier(&mut existing, &qualifier.key, &qualifier.value);
    }
    Ok(existing)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("invalid date {raw:?}"))
}
