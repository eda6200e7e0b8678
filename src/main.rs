use anyhow::{Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use payrun_reconcile::{
    insert_runsheet_jobs, replace_statement, setup_database, Document, ExtractionReport,
    ReconciliationEngine, RunsheetExtractor, StatementParser,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("statements") if args.len() > 2 => run_statements(&args[2..]),
        Some("runsheets") if args.len() > 2 => run_runsheets(&args[2..]),
        Some("reconcile") => run_reconcile(),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("payrun-reconcile {}", payrun_reconcile::VERSION);
    println!();
    println!("Usage:");
    println!("  payrun-reconcile statements <file>...   parse + store pay statements");
    println!("  payrun-reconcile runsheets <file>...    extract + store runsheet jobs");
    println!("  payrun-reconcile reconcile              backfill, discrepancies, stats");
    println!();
    println!("Environment:");
    println!("  PAYRUN_DB      database path (default: payrun.db)");
    println!("  PAYRUN_PARTY   party whose runsheet pages to extract (default: all pages)");
}

fn open_db() -> Result<Connection> {
    let db_path = env::var("PAYRUN_DB").unwrap_or_else(|_| "payrun.db".to_string());
    let conn = Connection::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    setup_database(&conn)?;
    Ok(conn)
}

/// JSON inputs carry recovered table segments; anything else is plain
/// text with form-feed page breaks.
fn load_document(path: &str) -> Result<Document> {
    let path = Path::new(path);
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Document::from_json_file(path)
    } else {
        Document::from_text_file(path)
    }
}

fn run_statements(files: &[String]) -> Result<()> {
    println!("💷 Importing {} pay statement(s)...", files.len());

    let mut conn = open_db()?;
    let parser = StatementParser::new();
    let mut report = ExtractionReport::new();

    for file in files {
        let doc = match load_document(file) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(file = %file, error = %e, "could not load document");
                report.record_failure(file, &format!("load failed: {}", e));
                continue;
            }
        };

        match parser.parse(&doc, &mut report) {
            Ok(parsed) => {
                let items = replace_statement(&mut conn, &parsed)?;
                println!(
                    "✓ Week {} {}: {} line item(s) from {}",
                    parsed.statement.week_number, parsed.statement.tax_year, items, file
                );
            }
            Err(e) => {
                warn!(file = %file, error = %e, "statement rejected");
                report.record_failure(file, &format!("parse failed: {}", e));
            }
        }
    }

    println!("\n{}", report.summary());
    Ok(())
}

fn run_runsheets(files: &[String]) -> Result<()> {
    println!("🚚 Importing {} runsheet(s)...", files.len());

    let conn = open_db()?;
    let party = env::var("PAYRUN_PARTY").unwrap_or_default();
    let extractor = RunsheetExtractor::new(&party);
    let mut report = ExtractionReport::new();

    let mut inserted_total = 0;
    let mut skipped_total = 0;

    for file in files {
        let doc = match load_document(file) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(file = %file, error = %e, "could not load document");
                report.record_failure(file, &format!("load failed: {}", e));
                continue;
            }
        };

        match extractor.extract(&doc, &mut report) {
            Ok(jobs) => {
                let (inserted, skipped) = insert_runsheet_jobs(&conn, &jobs)?;
                inserted_total += inserted;
                skipped_total += skipped;
                println!(
                    "✓ {}: {} job(s) extracted, {} new, {} already stored",
                    file,
                    jobs.len(),
                    inserted,
                    skipped
                );
            }
            Err(e) => {
                warn!(file = %file, error = %e, "runsheet rejected");
                report.record_failure(file, &format!("extract failed: {}", e));
            }
        }
    }

    println!(
        "\n{} job(s) inserted, {} duplicate(s) skipped",
        inserted_total, skipped_total
    );
    println!("{}", report.summary());
    Ok(())
}

fn run_reconcile() -> Result<()> {
    println!("🔗 Reconciling runsheet jobs against pay statements...");

    let conn = open_db()?;
    let engine = ReconciliationEngine::new();
    let outcome = engine.run(&conn)?;

    println!("✓ Pay backfilled onto {} job(s)", outcome.pay_backfilled);
    println!(
        "✓ Placeholders repaired: {} address(es), {} customer(s)",
        outcome.addresses_backfilled, outcome.customers_backfilled
    );

    if !outcome.paid_without_runsheet.is_empty() {
        println!(
            "\n⚠️  {} line item(s) paid with no matching runsheet job:",
            outcome.paid_without_runsheet.len()
        );
        for item in &outcome.paid_without_runsheet {
            println!(
                "   {} {} £{:.2} (week {} {})",
                item.job_number,
                item.client.as_deref().unwrap_or("-"),
                item.amount.unwrap_or(0.0),
                item.settlement_week.map_or("?".to_string(), |w| w.to_string()),
                item.settlement_year.map_or("?".to_string(), |y| y.to_string()),
            );
        }
    }

    if !outcome.never_paid.is_empty() {
        println!(
            "\n⚠️  {} runsheet job(s) never paid:",
            outcome.never_paid.len()
        );
        for job in &outcome.never_paid {
            println!(
                "   {} {} ({})",
                job.job_number,
                job.customer.as_deref().unwrap_or("-"),
                job.run_date
            );
        }
    }

    println!("\n📊 {}", outcome.stats.summary());
    Ok(())
}
