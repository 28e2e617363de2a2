mod config;
mod error;
mod geocode;
mod models;
mod parsing;
mod pipeline;
mod scrapers;
mod storage;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use geocode::GeocodeChain;
use models::{ContractType, Property};
use pipeline::details::detailed_file;
use pipeline::process::FileReport;
use pipeline::scrape::listing_file;
use pipeline::{DetailJob, FinalOutputs, ProcessJob, ProcessOptions, ScrapeJob};
use scrapers::{BrowserFetcher, HttpFetcher, ListingSource, PageFetcher, RetryPolicy};
use std::path::{Path, PathBuf};
use std::pin::pin;
use storage::documents::mongo_uri_from_env;
use storage::{DelimitedFile, DocumentStore, MongoStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MERGED_DIR: &str = "raw_final_output";
const MERGED_FILE: &str = "merged_properties.tsv";

#[derive(Parser)]
#[command(
    name = "imoveis-scout",
    about = "Scrape, clean, geocode and store Brazilian real-estate listings"
)]
struct Cli {
    /// Configuration file. Defaults to ./imoveis.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page through a listing site and append results to its TSV files.
    Scrape {
        /// Site to scrape (dfimoveis, netimoveis).
        #[arg(long)]
        source: String,

        /// Contract types to scrape (venda, aluguel). Defaults to both.
        #[arg(long = "contract", value_name = "TYPE")]
        contracts: Vec<ContractType>,

        /// Property type slugs to search one by one. Defaults to all types at once.
        #[arg(long = "type", value_name = "SLUG")]
        property_types: Vec<String>,

        /// Stop after this many pages per search.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Concurrent page requests.
        #[arg(long)]
        workers: Option<usize>,

        /// Discard previous output instead of resuming.
        #[arg(long, default_value_t = false)]
        restart: bool,
    },
    /// Fetch each listing's detail page and keep its full description.
    Details {
        /// Site the listings came from.
        #[arg(long)]
        source: String,

        /// Contract types to enrich. Defaults to both.
        #[arg(long = "contract", value_name = "TYPE")]
        contracts: Vec<ContractType>,

        /// Discard previous output instead of resuming.
        #[arg(long, default_value_t = false)]
        restart: bool,
    },
    /// Merge every source's TSV files into one file tagged by source.
    Merge {
        /// Directory holding one subdirectory per source. Defaults to the scrape output dir.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Merged TSV path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Clean, normalize and geocode merged listings into the final CSV files.
    Process {
        /// Merged TSV to process. Without it, sources are merged first.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Write records without coordinates.
        #[arg(long, default_value_t = false)]
        skip_geocoding: bool,

        /// Records geocoded between saves.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Discard previous output instead of resuming.
        #[arg(long, default_value_t = false)]
        restart: bool,
    },
    /// Insert final CSV rows into the document store.
    Persist {
        /// Files to load. Defaults to both final CSV files.
        #[arg(long = "input")]
        inputs: Vec<PathBuf>,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("imoveis_scout=info")),
        )
        .init();
}

fn pick_source(name: &str) -> Result<Box<dyn ListingSource>> {
    match scrapers::source_by_name(name) {
        Some(source) => Ok(source),
        None => bail!(
            "unknown source '{name}', expected one of: {}",
            scrapers::SOURCE_NAMES.join(", ")
        ),
    }
}

fn fetcher_for(source: &dyn ListingSource, config: &AppConfig) -> Result<Box<dyn PageFetcher>> {
    if source.requires_browser() {
        Ok(Box::new(BrowserFetcher::launch(config.http.browser_settle())?))
    } else {
        let policy = RetryPolicy::from_config(&config.retry);
        Ok(Box::new(HttpFetcher::new(&config.http, policy)?))
    }
}

fn contracts_or_all(contracts: Vec<ContractType>) -> Vec<ContractType> {
    if contracts.is_empty() {
        ContractType::ALL.to_vec()
    } else {
        contracts
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn scrape(
    config: &AppConfig,
    source: &str,
    contracts: Vec<ContractType>,
    property_types: Vec<String>,
    restart: bool,
) -> Result<()> {
    let source = pick_source(source)?;
    let unknown = scrapers::unknown_property_types(source.as_ref(), &property_types);
    if !unknown.is_empty() {
        bail!(
            "{} does not search by {}, expected one of: {}",
            source.source_name(),
            unknown.join(", "),
            source.property_types().join(", ")
        );
    }
    let fetcher = fetcher_for(source.as_ref(), config)?;

    info!(
        source = source.source_name(),
        workers = config.scrape.workers,
        batch_size = config.scrape.batch_size,
        "Starting scrape"
    );
    let job = ScrapeJob::new(source.as_ref(), fetcher.as_ref(), &config.scrape);
    let contracts = contracts_or_all(contracts);

    let summaries = job
        .run(&contracts, &property_types, restart, shutdown_signal())
        .await
        .context("Scrape failed")?;
    for summary in summaries {
        info!(
            contract = %summary.contract_type,
            pages = summary.pages,
            written = summary.written,
            skipped = summary.skipped,
            path = %summary.file.path().display(),
            "💾 Listings saved"
        );
        if summary.interrupted {
            warn!("Interrupted; run again to resume");
        }
    }
    Ok(())
}

async fn details(
    config: &AppConfig,
    source: &str,
    contracts: Vec<ContractType>,
    restart: bool,
) -> Result<()> {
    let source = pick_source(source)?;
    let fetcher = fetcher_for(source.as_ref(), config)?;
    let job = DetailJob::new(
        source.as_ref(),
        fetcher.as_ref(),
        config.scrape.workers,
        config.scrape.batch_size,
    );
    let mut shutdown = pin!(shutdown_signal());

    for contract in contracts_or_all(contracts) {
        let input = listing_file(&config.scrape.output_dir, source.source_name(), contract);
        if input.is_blank() {
            warn!(path = %input.path().display(), "No listings to enrich");
            continue;
        }
        let output = detailed_file(input.path());
        let summary = job
            .run(&input, &output, restart, shutdown.as_mut())
            .await
            .with_context(|| format!("Detail enrichment failed for {}", input.path().display()))?;
        info!(
            contract = %contract,
            enriched = summary.enriched,
            missing = summary.missing,
            unlinked = summary.unlinked,
            skipped = summary.skipped,
            path = %output.path().display(),
            "💾 Detailed listings saved"
        );
        if summary.interrupted {
            warn!("Interrupted; run again to resume");
            break;
        }
    }
    Ok(())
}

fn merge(config: &AppConfig, root: Option<PathBuf>, output: Option<PathBuf>) -> Result<PathBuf> {
    let root = root.unwrap_or_else(|| config.scrape.output_dir.clone());
    let output = output.unwrap_or_else(|| {
        config
            .storage
            .pipeline_dir
            .join(MERGED_DIR)
            .join(MERGED_FILE)
    });

    info!(root = %root.display(), "===== DISCOVERING AND MERGING SOURCE FILES =====");
    let file = DelimitedFile::new(&output);
    let report = pipeline::merge::merge(&root, &file)
        .with_context(|| format!("Failed to merge files under {}", root.display()))?;
    if report.rows == 0 {
        bail!("no listings found under {}", root.display());
    }
    info!(
        files = report.files_read,
        failed = report.files_failed,
        rows = report.rows,
        path = %output.display(),
        "💾 Saved merged listings"
    );
    Ok(output)
}

fn print_summary(reports: &[FileReport]) {
    println!("\n===== PROCESSED DATA SUMMARY =====");
    let total: usize = reports.iter().map(|r| r.rows).sum();
    println!("Total properties: {total}");
    for report in reports {
        println!(
            "  - {}: {} rows, {} with coordinates ({:.1}%)",
            report.contract_type,
            report.rows,
            report.with_coordinates,
            report.coordinate_share()
        );
        println!(
            "    {} ({:.1} KB)",
            report.path,
            report.bytes as f64 / 1024.0
        );
    }
}

async fn process(
    config: &AppConfig,
    input: Option<PathBuf>,
    skip_geocoding: bool,
    batch_size: Option<usize>,
    restart: bool,
) -> Result<()> {
    let input = match input {
        Some(path) => path,
        None => merge(config, None, None)?,
    };
    let records = DelimitedFile::new(&input)
        .read_all()
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if records.is_empty() {
        bail!("{} has no listings", input.display());
    }
    info!(records = records.len(), path = %input.display(), "Loaded merged listings");

    let mut chain = if skip_geocoding {
        None
    } else {
        Some(GeocodeChain::from_config(&config.geocode, &config.http)?)
    };

    let outputs = FinalOutputs::in_dir(&config.storage.pipeline_dir);
    let options = ProcessOptions {
        batch_size: batch_size.unwrap_or(config.geocode.batch_size),
        skip_geocoding,
        restart,
    };
    let summary = ProcessJob::new(outputs.clone(), options, chain.as_mut())
        .run(records, shutdown_signal())
        .await
        .context("Processing failed")?;

    info!(
        resumed = summary.resumed,
        written = summary.written,
        geocoded = summary.geocoded,
        "✅ Processing complete"
    );
    if summary.interrupted {
        warn!("Stopped early; run again to resume");
    }

    print_summary(&outputs.report().context("Failed to read final files")?);
    Ok(())
}

async fn persist(config: &AppConfig, inputs: Vec<PathBuf>) -> Result<()> {
    let files: Vec<DelimitedFile> = if inputs.is_empty() {
        let outputs = FinalOutputs::in_dir(&config.storage.pipeline_dir);
        vec![outputs.rental, outputs.sales]
    } else {
        inputs.into_iter().map(DelimitedFile::new).collect()
    };

    let mut records: Vec<Property> = Vec::new();
    for file in &files {
        let rows = file
            .read_all()
            .with_context(|| format!("Failed to read {}", file.path().display()))?;
        info!(rows = rows.len(), path = %file.path().display(), "Loaded rows");
        records.extend(rows);
    }
    if records.is_empty() {
        warn!("Nothing to persist");
        return Ok(());
    }

    let uri = mongo_uri_from_env(&config.storage.mongo_cluster)?;
    let store = MongoStore::connect(&uri, &config.storage.database, &config.storage.collection)
        .await
        .context("Failed to connect to MongoDB")?;
    let inserted = store
        .insert_many(&records)
        .await
        .context("Failed to insert listings")?;

    info!(
        inserted,
        collection = %config.storage.collection,
        "💾 Listings persisted"
    );
    Ok(())
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    config::load_config(path).context("Failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let mut config = load(cli.config.as_deref())?;

    info!("🏠 Imóveis Scout");

    match cli.command {
        Commands::Scrape {
            source,
            contracts,
            property_types,
            max_pages,
            workers,
            restart,
        } => {
            if max_pages.is_some() {
                config.scrape.max_pages = max_pages;
            }
            if let Some(workers) = workers {
                config.scrape.workers = workers;
            }
            scrape(&config, &source, contracts, property_types, restart).await
        }
        Commands::Details {
            source,
            contracts,
            restart,
        } => details(&config, &source, contracts, restart).await,
        Commands::Merge { root, output } => merge(&config, root, output).map(|_| ()),
        Commands::Process {
            input,
            skip_geocoding,
            batch_size,
            restart,
        } => process(&config, input, skip_geocoding, batch_size, restart).await,
        Commands::Persist { inputs } => persist(&config, inputs).await,
    }
}
