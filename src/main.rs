use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use fraud_scan::{
    load_transactions, summarize_account, BankDataSource, DetectionEngine, DetectionReport,
    EngineConfig, FixtureSource, FraudType,
};

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("scan") => {
            let path = args.get(2).context("Usage: fraud-scan scan <file.json|file.csv> [--json]")?;
            let as_json = args.iter().skip(3).any(|a| a == "--json");
            run_scan(Path::new(path), as_json)?;
        }
        Some("summary") => {
            let path = args.get(2).context("Usage: fraud-scan summary <accounts.json>")?;
            run_summary(Path::new(path))?;
        }
        _ => print_usage(),
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fraud_scan=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("fraud-scan {}", fraud_scan::VERSION);
    println!();
    println!("Usage:");
    println!("  fraud-scan scan <file.json|file.csv> [--json]   Flag possible fraud in a transaction file");
    println!("  fraud-scan summary <accounts.json>              Show the primary account summary");
    println!();
    println!("Set LLM_API_KEY (and optionally LLM_BASE_URL, LLM_MODEL) to use the remote payee classifier.");
}

fn run_scan(path: &Path, as_json: bool) -> Result<()> {
    let config = EngineConfig::from_env()?;
    let engine = DetectionEngine::from_config(&config).context("Failed to build detection engine")?;

    let transactions = load_transactions(path)?;
    let report = engine.detect_all(&transactions);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("🔍 Fraud Scan - {}", path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Loaded {} transactions", transactions.len());
    println!("✓ Payee classifier: {}", engine.classifier_name());
    print_report(&report);

    Ok(())
}

fn print_report(report: &DetectionReport) {
    println!();
    for fraud_type in [FraudType::Duplicate, FraudType::SuspiciousPayee, FraudType::LargeP2p] {
        println!("{}: {}", fraud_type, report.count_of(fraud_type));
        for finding in report.findings_of(fraud_type) {
            for tx in &finding.transactions {
                let date = tx
                    .posted_at()
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| tx.posted.to_string());
                println!("   {} | {:>10} | {} | {}", date, tx.amount, tx.payee, tx.id);
            }
            println!();
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if report.is_partial() {
        for warning in &report.warnings {
            println!("⚠️  {} skipped: {}", warning.detector, warning.error);
        }
        println!("⚠️  Partial results: {} findings", report.findings.len());
    } else if report.findings.is_empty() {
        println!("✅ No possible fraud found");
    } else {
        println!("🚩 {} possible fraud findings", report.findings.len());
    }
}

fn run_summary(path: &Path) -> Result<()> {
    let source = FixtureSource::new(path);
    let set = source.fetch_accounts("")?;
    let summary = summarize_account(&set)?;

    println!("🏦 {} ({})", summary.account_name, summary.currency);
    println!("   Balance:   {}", summary.balance);
    println!("   Available: {}", summary.available_balance);
    println!("   Recent:");
    for tx in &summary.recent_transactions {
        println!("     {:>10} | {} | {}", tx.amount, tx.payee, tx.description);
    }

    Ok(())
}
