// 🗄️ Persistence - SQLite schema and parameterized queries
// Three tables: pay_statements, line_items (cascade-owned), runsheet_jobs.
// The statement replace is the one multi-statement transaction: a reader
// must never observe a statement with half its line items.

use crate::runsheet::RunsheetJob;
use crate::statement::{LineItem, ParsedStatement, PayStatement};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Cascade deletes depend on this
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Pay statements: one per (tax_year, week_number)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pay_statements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tax_year INTEGER NOT NULL,
            week_number INTEGER NOT NULL,
            verification_number TEXT,
            tax_reference TEXT,
            vat_number TEXT,
            pay_date TEXT,
            period_end TEXT,
            total_company_income REAL,
            materials REAL,
            gross_payment REAL,
            gross_payment_ytd REAL,
            net_payment REAL,
            total_paid_to_bank REAL,
            source_file TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(tax_year, week_number)
        )",
        [],
    )?;

    // ==========================================================================
    // Line items: exclusively owned by their statement
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS line_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            statement_id INTEGER NOT NULL
                REFERENCES pay_statements(id) ON DELETE CASCADE,
            job_number TEXT,
            client TEXT,
            location TEXT,
            job_type TEXT,
            description TEXT NOT NULL,
            quantity REAL,
            rate REAL,
            amount REAL,
            work_date TEXT,
            work_time TEXT,
            agency TEXT,
            settlement_week INTEGER,
            settlement_year INTEGER,
            is_adjustment INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Runsheet jobs: one per (run_date, job_number)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runsheet_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_date TEXT NOT NULL,
            job_number TEXT NOT NULL,
            customer TEXT,
            activity TEXT,
            priority TEXT,
            job_address TEXT,
            postcode TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            source_file TEXT NOT NULL,
            pay_amount REAL,
            pay_rate REAL,
            pay_quantity REAL,
            pay_week INTEGER,
            pay_year INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME,
            UNIQUE(run_date, job_number)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_line_items_statement ON line_items(statement_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_line_items_job ON line_items(job_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runsheet_jobs_job ON runsheet_jobs(job_number)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// PAY STATEMENTS
// ============================================================================

/// Replace the statement for its (tax_year, week_number) atomically.
///
/// Old line items are deleted via cascade before the new ones are
/// inserted, never merged; the whole replace is one transaction, so a
/// concurrent reader sees either the old statement or the new one.
/// Returns the number of line items written.
pub fn replace_statement(conn: &mut Connection, parsed: &ParsedStatement) -> Result<usize> {
    let s = &parsed.statement;
    let tx = conn.transaction()?;

    tx.execute(
        "DELETE FROM pay_statements WHERE tax_year = ?1 AND week_number = ?2",
        params![s.tax_year, s.week_number],
    )?;

    tx.execute(
        "INSERT INTO pay_statements (
            tax_year, week_number, verification_number, tax_reference,
            vat_number, pay_date, period_end, total_company_income,
            materials, gross_payment, gross_payment_ytd, net_payment,
            total_paid_to_bank, source_file
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            s.tax_year,
            s.week_number,
            s.verification_number,
            s.tax_reference,
            s.vat_number,
            s.pay_date.map(|d| d.to_string()),
            s.period_end.map(|d| d.to_string()),
            s.total_company_income,
            s.materials,
            s.gross_payment,
            s.gross_payment_ytd,
            s.net_payment,
            s.total_paid_to_bank,
            s.source_file,
        ],
    )?;
    let statement_id = tx.last_insert_rowid();

    for item in &parsed.items {
        tx.execute(
            "INSERT INTO line_items (
                statement_id, job_number, client, location, job_type,
                description, quantity, rate, amount, work_date, work_time,
                agency, settlement_week, settlement_year, is_adjustment
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                statement_id,
                item.job_number,
                item.client,
                item.location,
                item.job_type,
                item.description,
                item.quantity,
                item.rate,
                item.amount,
                item.work_date,
                item.work_time,
                item.agency,
                // Settlement period comes from the parent statement
                s.week_number,
                s.tax_year,
                item.is_adjustment as i64,
            ],
        )?;
    }

    tx.commit().context("Failed to commit statement replace")?;
    Ok(parsed.items.len())
}

pub fn get_statement(
    conn: &Connection,
    tax_year: i32,
    week_number: u32,
) -> Result<Option<PayStatement>> {
    let mut stmt = conn.prepare(
        "SELECT tax_year, week_number, verification_number, tax_reference,
                vat_number, pay_date, period_end, total_company_income,
                materials, gross_payment, gross_payment_ytd, net_payment,
                total_paid_to_bank, source_file
         FROM pay_statements
         WHERE tax_year = ?1 AND week_number = ?2",
    )?;

    let mut rows = stmt.query_map(params![tax_year, week_number], |row| {
        let pay_date: Option<String> = row.get(5)?;
        let period_end: Option<String> = row.get(6)?;
        Ok(PayStatement {
            tax_year: row.get(0)?,
            week_number: row.get(1)?,
            verification_number: row.get(2)?,
            tax_reference: row.get(3)?,
            vat_number: row.get(4)?,
            pay_date: pay_date.and_then(|d| d.parse::<NaiveDate>().ok()),
            period_end: period_end.and_then(|d| d.parse::<NaiveDate>().ok()),
            total_company_income: row.get(7)?,
            materials: row.get(8)?,
            gross_payment: row.get(9)?,
            gross_payment_ytd: row.get(10)?,
            net_payment: row.get(11)?,
            total_paid_to_bank: row.get(12)?,
            source_file: row.get(13)?,
        })
    })?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub fn get_line_items(conn: &Connection, tax_year: i32, week_number: u32) -> Result<Vec<LineItem>> {
    let mut stmt = conn.prepare(
        "SELECT li.job_number, li.client, li.location, li.job_type,
                li.description, li.quantity, li.rate, li.amount,
                li.work_date, li.work_time, li.agency,
                li.settlement_week, li.settlement_year, li.is_adjustment
         FROM line_items li
         JOIN pay_statements s ON s.id = li.statement_id
         WHERE s.tax_year = ?1 AND s.week_number = ?2
         ORDER BY li.id",
    )?;

    let items = stmt
        .query_map(params![tax_year, week_number], map_line_item)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

fn map_line_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<LineItem> {
    let is_adjustment: i64 = row.get(13)?;
    Ok(LineItem {
        job_number: row.get(0)?,
        client: row.get(1)?,
        location: row.get(2)?,
        job_type: row.get(3)?,
        description: row.get(4)?,
        quantity: row.get(5)?,
        rate: row.get(6)?,
        amount: row.get(7)?,
        work_date: row.get(8)?,
        work_time: row.get(9)?,
        agency: row.get(10)?,
        settlement_week: row.get(11)?,
        settlement_year: row.get(12)?,
        is_adjustment: is_adjustment != 0,
    })
}

// ============================================================================
// RUNSHEET JOBS
// ============================================================================

/// Insert extracted jobs. Re-extraction of the same (run_date,
/// job_number) is a no-op: extraction never touches pay fields, and the
/// conflict rule keeps previously backfilled values intact.
/// Returns (inserted, skipped_existing).
pub fn insert_runsheet_jobs(conn: &Connection, jobs: &[RunsheetJob]) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut skipped = 0;

    for job in jobs {
        let affected = conn.execute(
            "INSERT INTO runsheet_jobs (
                run_date, job_number, customer, activity, priority,
                job_address, postcode, status, source_file
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(run_date, job_number) DO NOTHING",
            params![
                job.run_date.to_string(),
                job.job_number,
                job.customer,
                job.activity,
                job.priority,
                job.job_address,
                job.postcode,
                job.status,
                job.source_file,
            ],
        )?;
        if affected > 0 {
            inserted += 1;
        } else {
            skipped += 1;
        }
    }

    Ok((inserted, skipped))
}

pub fn get_runsheet_jobs(conn: &Connection, run_date: NaiveDate) -> Result<Vec<RunsheetJob>> {
    let mut stmt = conn.prepare(
        "SELECT run_date, job_number, customer, activity, priority,
                job_address, postcode, status, source_file,
                pay_amount, pay_rate, pay_quantity, pay_week, pay_year
         FROM runsheet_jobs
         WHERE run_date = ?1
         ORDER BY id",
    )?;

    let jobs = stmt
        .query_map(params![run_date.to_string()], map_runsheet_job)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(jobs)
}

fn map_runsheet_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunsheetJob> {
    let run_date: String = row.get(0)?;
    Ok(RunsheetJob {
        run_date: run_date
            .parse::<NaiveDate>()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        job_number: row.get(1)?,
        customer: row.get(2)?,
        activity: row.get(3)?,
        priority: row.get(4)?,
        job_address: row.get(5)?,
        postcode: row.get(6)?,
        status: row.get(7)?,
        source_file: row.get(8)?,
        pay_amount: row.get(9)?,
        pay_rate: row.get(10)?,
        pay_quantity: row.get(11)?,
        pay_week: row.get(12)?,
        pay_year: row.get(13)?,
    })
}

pub fn count_runsheet_jobs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM runsheet_jobs", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_line_items(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM line_items", [], |row| row.get(0))?;
    Ok(count)
}

/// Stamp for updated_at columns.
pub fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// TESTS
// ============================================================================
