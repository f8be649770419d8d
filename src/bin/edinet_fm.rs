use std::process::ExitCode;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use edinet_filing_manager::cache::FilingIndex;
use edinet_filing_manager::config::{ConfigLoader, ResolvedConfig};
use edinet_filing_manager::domain::{DocType, EntityId};
use edinet_filing_manager::edinet::EdinetHttpClient;
use edinet_filing_manager::error::FilingError;
use edinet_filing_manager::output::{JsonOutput, StderrSink};
use edinet_filing_manager::resolver::{self, CodeListHttpClient};
use edinet_filing_manager::retrieval::{self, DocumentRetriever, RetrievalOptions};
use edinet_filing_manager::store::Store;
use edinet_filing_manager::sync::{SyncCoordinator, SyncOptions};

#[derive(Parser)]
#[command(name = "edinet-fm")]
#[command(about = "Incremental EDINET filing index and report downloader")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Synchronize the filing index with the registry")]
    Sync(SyncArgs),
    #[command(about = "Download filing documents for tracked entities")]
    Fetch(FetchArgs),
    #[command(about = "Show filing index status")]
    Status,
    #[command(about = "Locate a saved report file for an entity")]
    Locate(LocateArgs),
}

#[derive(Args)]
struct SyncArgs {
    #[arg(long, help = "Refetch the full lookback window")]
    force: bool,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long, value_enum)]
    doc_type: Option<DocType>,

    #[arg(long, help = "Window start, YYYY-MM-DD")]
    start: Option<String>,

    #[arg(long, help = "Window end, YYYY-MM-DD")]
    end: Option<String>,
}

#[derive(Args)]
struct LocateArgs {
    entity_id: String,

    #[arg(long)]
    latest: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(filing) = report.downcast_ref::<FilingError>() {
            return ExitCode::from(map_exit_code(filing));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FilingError) -> u8 {
    match error {
        FilingError::CacheIntegrity(_) => 4,
        FilingError::EdinetHttp(_)
        | FilingError::EdinetStatus { .. }
        | FilingError::CodeListHttp(_)
        | FilingError::CodeListStatus { .. } => 3,
        FilingError::MissingApiKey
        | FilingError::ConfigRead(_)
        | FilingError::ConfigParse(_)
        | FilingError::InvalidDate(_)
        | FilingError::InvalidDateRange(_)
        | FilingError::InvalidDocType(_)
        | FilingError::InvalidEntityId(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    let store = match &config.data_root {
        Some(root) => Store::new_with_root(root.clone()),
        None => Store::new().into_diagnostic()?,
    };
    store.ensure_data_root().into_diagnostic()?;

    match cli.command {
        Commands::Sync(args) => run_sync(args, store, config),
        Commands::Fetch(args) => run_fetch(args, store, config),
        Commands::Status => run_status(store),
        Commands::Locate(args) => run_locate(args, store),
    }
}

fn run_sync(args: SyncArgs, store: Store, config: ResolvedConfig) -> miette::Result<()> {
    let edinet = EdinetHttpClient::from_env().into_diagnostic()?;
    let code_list = CodeListHttpClient::new().into_diagnostic()?;
    let entities = resolver::resolve_all(&store, &code_list).into_diagnostic()?;

    let options = SyncOptions {
        lookback_years: config.lookback_years,
        recency_window_days: config.recency_window_days,
        tracked_types: config.doc_types,
        force: args.force,
    };
    let coordinator = SyncCoordinator::new(store, edinet, options);
    let today = Local::now().date_naive();
    let report = coordinator
        .run(&entities, today, &StderrSink)
        .into_diagnostic()?;
    JsonOutput::print_sync(&report).into_diagnostic()?;
    Ok(())
}

fn run_fetch(args: FetchArgs, store: Store, config: ResolvedConfig) -> miette::Result<()> {
    let edinet = EdinetHttpClient::from_env().into_diagnostic()?;
    let code_list = CodeListHttpClient::new().into_diagnostic()?;
    let entities = resolver::resolve_all(&store, &code_list).into_diagnostic()?;

    let index = match FilingIndex::load(&store.index_path()) {
        Ok(index) => index,
        Err(err) => {
            eprintln!("index.unreadable error={err}; run sync first");
            FilingIndex::default()
        }
    };

    let options = RetrievalOptions {
        doc_type: args.doc_type.unwrap_or(DocType::SecuritiesRegistration),
        window_years: config.retrieval_window_years,
        start_date: parse_cli_date(args.start)
            .into_diagnostic()?
            .or(config.start_date),
        end_date: parse_cli_date(args.end)
            .into_diagnostic()?
            .or(config.end_date),
    };
    let retriever = DocumentRetriever::new(store, edinet, options);
    let report = retriever
        .run(&index, &entities, &StderrSink)
        .into_diagnostic()?;
    JsonOutput::print_retrieval(&report).into_diagnostic()?;
    Ok(())
}

fn run_status(store: Store) -> miette::Result<()> {
    let index = match FilingIndex::load(&store.index_path()) {
        Ok(index) => index,
        Err(err) => {
            eprintln!("index.unreadable error={err}");
            FilingIndex::default()
        }
    };
    JsonOutput::print_status(&index.status()).into_diagnostic()?;
    Ok(())
}

fn run_locate(args: LocateArgs, store: Store) -> miette::Result<()> {
    let entity_id: EntityId = args.entity_id.parse().into_diagnostic()?;
    match retrieval::find_report_path(&store, &entity_id, args.latest).into_diagnostic()? {
        Some(path) => println!("{path}"),
        None => eprintln!("no saved reports for {entity_id}"),
    }
    Ok(())
}

fn parse_cli_date(value: Option<String>) -> Result<Option<chrono::NaiveDate>, FilingError> {
    value
        .map(|text| {
            chrono::NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map_err(|_| FilingError::InvalidDate(text))
        })
        .transpose()
}
