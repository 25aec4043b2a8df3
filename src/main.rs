use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rentbill::application::engine::{BillingEngine, EngineSettings, Stores};
use rentbill::config::Config;
use rentbill::domain::invoice::BillingPeriod;
use rentbill::infrastructure::mpesa::DarajaClient;
use rentbill::interfaces::csv::directory_reader::DirectoryReader;
use rentbill::interfaces::csv::ledger_writer::LedgerWriter;
use rentbill::interfaces::csv::meter_reading_reader::MeterReadingReader;
use rentbill::interfaces::http::{AppState, run_server};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Rent and water billing with M-Pesa collection", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Tenant directory CSV (`tenant,name,phone,property,title,landlord,rent`)
    /// registered before the command runs.
    #[arg(long, global = true)]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API, including the payment callback endpoint.
    Serve,
    /// Record meter readings from a `tenant,reading,read_on` CSV and print ledgers.
    IngestReadings { input: PathBuf },
    /// Issue invoices for every tenant and print them.
    Bill {
        /// Billing month, `YYYY-MM`.
        #[arg(long)]
        period: BillingPeriod,
        /// Issue date, `YYYY-MM-DD`. Defaults to today.
        #[arg(long)]
        issued_on: Option<NaiveDate>,
        /// Meter readings to record before billing.
        #[arg(long)]
        readings: Option<PathBuf>,
    },
    /// Print every tenant ledger as CSV.
    Ledger,
    /// Expire pending payments whose callback never arrived.
    ExpirePending {
        /// Defaults to `mpesa.pending_timeout_minutes`.
        #[arg(long)]
        max_age_minutes: Option<u32>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rentbill=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries CSV output, so logs go to stderr.
    match std::env::var("RENTBILL_LOG_FORMAT").as_deref() {
        Ok("json") => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init(),
    }
}

fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = rentbill::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
            tracing::info!(path = %path.display(), "Using RocksDB storage");
            Ok(Stores::rocksdb(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Stores::in_memory())
        }
        None => Ok(Stores::in_memory()),
    }
}

async fn register_directory(engine: &BillingEngine, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let mut registered = 0usize;
    for record in DirectoryReader::new(file).records() {
        let outcome = async {
            let record = record?;
            engine.register_property(record.property()).await?;
            engine
                .register_tenant(record.tenant, &record.name, record.phone, record.property)
                .await
        }
        .await;
        match outcome {
            Ok(_) => registered += 1,
            Err(e) => tracing::warn!(error = %e, "Skipping directory row"),
        }
    }
    tracing::info!(registered, "Loaded tenant directory");
    Ok(())
}

async fn ingest(engine: &BillingEngine, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let summary = engine
        .ingest_readings(MeterReadingReader::new(file).readings())
        .await;
    tracing::info!(
        recorded = summary.recorded,
        rejected = summary.rejected,
        "Meter readings ingested"
    );
    Ok(())
}

async fn print_ledgers(engine: &BillingEngine) -> Result<()> {
    let ledgers = engine.ledgers().await.into_diagnostic()?;
    let stdout = io::stdout();
    LedgerWriter::new(stdout.lock())
        .write_ledgers(ledgers)
        .into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).into_diagnostic()?;
    let stores = open_stores(cli.db_path.as_deref())?;
    let mut engine = BillingEngine::new(stores, EngineSettings::from(&config));
    if config.mpesa.is_configured() {
        let client = DarajaClient::new(&config.mpesa).into_diagnostic()?;
        engine = engine.with_gateway(Box::new(client));
        tracing::info!(environment = ?config.mpesa.environment, "M-Pesa gateway configured");
    } else {
        tracing::debug!("M-Pesa credentials missing; payment initiation disabled");
    }

    if let Some(directory) = cli.directory.as_deref() {
        register_directory(&engine, directory).await?;
    }

    match cli.command {
        Command::Serve => {
            let state = AppState::new(engine, config.server.api_key.clone());
            let sweep = state.engine.clone().spawn_expiry_sweep(
                config.mpesa.pending_max_age(),
                config.mpesa.expiry_sweep_interval(),
            );
            let served = run_server(&config.server.bind, state).await;
            sweep.abort();
            served.into_diagnostic()?;
        }
        Command::IngestReadings { input } => {
            ingest(&engine, &input).await?;
            print_ledgers(&engine).await?;
        }
        Command::Bill {
            period,
            issued_on,
            readings,
        } => {
            if let Some(readings) = readings.as_deref() {
                ingest(&engine, readings).await?;
            }
            let issued_on = issued_on.unwrap_or_else(|| Utc::now().date_naive());
            let summary = engine
                .generate_monthly_invoices(period, issued_on)
                .await
                .into_diagnostic()?;
            for (tenant, error) in &summary.failed {
                eprintln!("Could not bill tenant {tenant}: {error}");
            }

            let mut invoices = Vec::new();
            for ledger in engine.ledgers().await.into_diagnostic()? {
                let billed = engine.invoices(ledger.tenant).await.into_diagnostic()?;
                invoices.extend(billed.into_iter().filter(|inv| inv.period == period));
            }
            let stdout = io::stdout();
            LedgerWriter::new(stdout.lock())
                .write_invoices(invoices)
                .into_diagnostic()?;
        }
        Command::Ledger => print_ledgers(&engine).await?,
        Command::ExpirePending { max_age_minutes } => {
            let max_age = max_age_minutes
                .map(|minutes| chrono::Duration::minutes(i64::from(minutes)))
                .unwrap_or_else(|| config.mpesa.pending_max_age());
            let expired = engine
                .expire_pending(Utc::now(), max_age)
                .await
                .into_diagnostic()?;
            println!("expired {} pending payment(s)", expired.len());
        }
    }

    Ok(())
}
