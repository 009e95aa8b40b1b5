// Statement Harvest CLI
//
//   statement-harvest banks
//   statement-harvest catalog summit --json
//   statement-harvest download cedar --out ./statements

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statement_harvest::{
    collect_catalog, download_all, file_names, AdapterRegistry, BankId, HarvestConfig,
    ReqwestTransport, SessionContext,
};

#[derive(Parser)]
#[command(name = "statement-harvest")]
#[command(about = "Pull statement PDFs out of online banking sessions", long_about = None)]
#[command(version = statement_harvest::VERSION)]
struct Cli {
    /// Cookie header value for the bank origins ("a=1; b=2")
    #[arg(long, env = "HARVEST_COOKIES")]
    cookies: Option<String>,

    /// File holding the cookie header value
    #[arg(long, env = "HARVEST_COOKIE_FILE", conflicts_with = "cookies")]
    cookie_file: Option<PathBuf>,

    /// Token store dump (flat JSON object of string values)
    #[arg(long, env = "HARVEST_TOKEN_STORE")]
    token_store: Option<PathBuf>,

    /// Per-bank settings (JSON)
    #[arg(short, long, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List banks and whether a session was found for each
    Banks,

    /// List accounts and statements for one bank
    Catalog {
        bank: BankId,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download every listed statement for one bank
    Download {
        bank: BankId,

        /// Output directory
        #[arg(short, long, default_value = "statements")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "statement_harvest=debug"
    } else {
        "statement_harvest=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let registry = build_registry(&cli)?;

    match cli.command {
        Commands::Banks => run_banks(&registry),
        Commands::Catalog { bank, json } => run_catalog(&registry, bank, json).await,
        Commands::Download { bank, out } => run_download(&registry, bank, &out).await,
    }
}

fn build_registry(cli: &Cli) -> Result<AdapterRegistry> {
    let cookies = match (&cli.cookies, &cli.cookie_file) {
        (Some(cookies), _) => cookies.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cookie file: {}", path.display()))?
            .trim()
            .to_string(),
        (None, None) => String::new(),
    };

    let mut ctx = SessionContext::new().with_cookies(cookies.clone());
    if let Some(path) = &cli.token_store {
        ctx = ctx.with_storage_file(path)?;
    }

    let config = match &cli.config {
        Some(path) => HarvestConfig::from_file(path)?,
        None => HarvestConfig::default(),
    };

    let transport = ReqwestTransport::new()?.with_cookies(cookies);
    let registry = AdapterRegistry::with_defaults(Arc::new(ctx), Arc::new(transport), &config)?;
    Ok(registry)
}

fn run_banks(registry: &AdapterRegistry) -> Result<()> {
    println!("🏦 Supported banks");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let available: Vec<&str> = registry.available().iter().map(|a| a.bank_id()).collect();
    for bank in BankId::ALL {
        let marker = if available.contains(&bank.code()) {
            "✓ session found"
        } else {
            "· no session"
        };
        println!("  {:<10} {:<24} {}", bank.code(), bank.name(), marker);
    }

    Ok(())
}

async fn run_catalog(registry: &AdapterRegistry, bank: BankId, json: bool) -> Result<()> {
    let adapter = registry.get(bank.code())?;
    let catalog = collect_catalog(adapter.as_ref())
        .await
        .with_context(|| format!("Failed to list statements for {}", bank.name()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!("📂 {} - {}", bank.name(), catalog.profile.profile_name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in &catalog.accounts {
        let account = &entry.account;
        println!(
            "\n  {} (...{}) [{}]",
            account.account_name,
            account.account_mask,
            account.account_type.as_str()
        );
        if entry.statements.is_empty() {
            println!("    no statements");
        }
        for statement in &entry.statements {
            println!(
                "    {}  {}",
                statement.statement_date.format("%Y-%m-%d"),
                statement.statement_id
            );
        }
    }
    println!("\n✓ {} statements", catalog.statement_count());

    Ok(())
}

async fn run_download(registry: &AdapterRegistry, bank: BankId, out: &Path) -> Result<()> {
    let adapter = registry.get(bank.code())?;
    let catalog = collect_catalog(adapter.as_ref())
        .await
        .with_context(|| format!("Failed to list statements for {}", bank.name()))?;

    println!("⬇️  Downloading {} statements from {}", catalog.statement_count(), bank.name());
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory: {}", out.display()))?;

    let report = download_all(adapter.as_ref(), &catalog).await;
    let names = file_names(adapter.bank_id(), report.outcomes.iter().map(|o| &o.statement));
    for (outcome, name) in report.outcomes.iter().zip(&names) {
        if let Ok(content) = &outcome.result {
            let path = out.join(name);
            std::fs::write(&path, content.bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("  ✓ {} ({} bytes)", path.display(), content.len());
        }
    }
    for (statement, err) in report.errors() {
        eprintln!("  ✗ {}: {}", statement.statement_id, err);
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ {} saved, {} failed", report.succeeded(), report.failed());

    if report.failed() > 0 {
        anyhow::bail!("{} of {} downloads failed", report.failed(), report.outcomes.len());
    }
    Ok(())
}
