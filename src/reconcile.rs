// 🔗 Reconciliation Engine - Join runsheet jobs to pay line items
// Matching is by job number only. Backfill copies pay facts onto jobs
// and repairs placeholder fields; it never overwrites real data, so
// repeated runs converge to the same state.

use crate::db;
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

/// Single tokens that show up in location fields but are internal
/// routing codes, never addresses.
const NON_ADDRESS_CODES: [&str; 5] = ["TBC", "DNCO", "WH", "RTN", "DEPO"];

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// Line item whose job number appears on no runsheet.
#[derive(Debug, Clone, Serialize)]
pub struct PaidWithoutRunsheet {
    pub job_number: String,
    pub client: Option<String>,
    pub amount: Option<f64>,
    pub settlement_week: Option<u32>,
    pub settlement_year: Option<i32>,
}

/// Runsheet job whose number appears on no statement.
#[derive(Debug, Clone, Serialize)]
pub struct NeverPaidJob {
    pub run_date: NaiveDate,
    pub job_number: String,
    pub customer: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReconcileStats {
    pub total_jobs: i64,
    pub pay_matched: i64,
    pub with_address: i64,
    pub with_customer: i64,
}

impl ReconcileStats {
    fn pct(part: i64, total: i64) -> f64 {
        if total == 0 {
            0.0
        } else {
            part as f64 * 100.0 / total as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} jobs | paid {} ({:.1}%) | address {} ({:.1}%) | customer {} ({:.1}%)",
            self.total_jobs,
            self.pay_matched,
            Self::pct(self.pay_matched, self.total_jobs),
            self.with_address,
            Self::pct(self.with_address, self.total_jobs),
            self.with_customer,
            Self::pct(self.with_customer, self.total_jobs),
        )
    }
}

/// Everything one reconciliation pass produced.
#[derive(Debug, Serialize)]
pub struct ReconcileOutcome {
    pub pay_backfilled: usize,
    pub addresses_backfilled: usize,
    pub customers_backfilled: usize,
    pub paid_without_runsheet: Vec<PaidWithoutRunsheet>,
    pub never_paid: Vec<NeverPaidJob>,
    pub stats: ReconcileStats,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Locations at or below this length are too short to be addresses.
    pub min_address_len: usize,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        ReconciliationEngine { min_address_len: 5 }
    }
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full pass: pay backfill, placeholder repair, discrepancy lists,
    /// coverage statistics.
    pub fn run(&self, conn: &Connection) -> Result<ReconcileOutcome> {
        let pay_backfilled = self.backfill_pay(conn)?;
        let (addresses_backfilled, customers_backfilled) = self.backfill_placeholders(conn)?;
        let paid_without_runsheet = self.paid_without_runsheet(conn)?;
        let never_paid = self.never_paid(conn)?;
        let stats = self.statistics(conn)?;

        info!(
            pay = pay_backfilled,
            addresses = addresses_backfilled,
            customers = customers_backfilled,
            unmatched_items = paid_without_runsheet.len(),
            unpaid_jobs = never_paid.len(),
            "reconciliation pass complete"
        );

        Ok(ReconcileOutcome {
            pay_backfilled,
            addresses_backfilled,
            customers_backfilled,
            paid_without_runsheet,
            never_paid,
            stats,
        })
    }

    /// Copy pay facts from the first matching line item onto each job.
    ///
    /// "First" is insertion order (line item rowid), so the pick is
    /// deterministic when a job number was paid more than once.
    pub fn backfill_pay(&self, conn: &Connection) -> Result<usize> {
        let jobs = job_numbers(conn)?;
        let mut updated = 0;

        for (id, job_number) in jobs {
            let hit = conn
                .query_row(
                    "SELECT amount, rate, quantity, settlement_week, settlement_year
                     FROM line_items
                     WHERE job_number = ?1
                     ORDER BY id
                     LIMIT 1",
                    params![job_number],
                    |row| {
                        Ok((
                            row.get::<_, Option<f64>>(0)?,
                            row.get::<_, Option<f64>>(1)?,
                            row.get::<_, Option<f64>>(2)?,
                            row.get::<_, Option<u32>>(3)?,
                            row.get::<_, Option<i32>>(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((amount, rate, quantity, week, year)) = hit else {
                continue;
            };

            conn.execute(
                "UPDATE runsheet_jobs
                 SET pay_amount = ?1, pay_rate = ?2, pay_quantity = ?3,
                     pay_week = ?4, pay_year = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![amount, rate, quantity, week, year, db::now_stamp(), id],
            )?;
            updated += 1;
        }

        Ok(updated)
    }

    /// Repair placeholder customer/address fields from statement data.
    /// Only placeholders are written; runsheet data always wins over
    /// statement data when both exist.
    pub fn backfill_placeholders(&self, conn: &Connection) -> Result<(usize, usize)> {
        let mut stmt = conn.prepare(
            "SELECT id, job_number, customer, job_address
             FROM runsheet_jobs
             WHERE job_number != ''",
        )?;
        let jobs = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut addresses = 0;
        let mut customers = 0;

        for (id, job_number, customer, job_address) in jobs {
            let need_customer = is_placeholder(customer.as_deref());
            let need_address = is_placeholder(job_address.as_deref());
            if !need_customer && !need_address {
                continue;
            }

            let hit = conn
                .query_row(
                    "SELECT client, location FROM line_items
                     WHERE job_number = ?1
                     ORDER BY id
                     LIMIT 1",
                    params![job_number],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                        ))
                    },
                )
                .optional()?;

            let Some((client, location)) = hit else {
                continue;
            };

            if need_customer {
                if let Some(client) = client.as_deref().filter(|c| !is_placeholder(Some(c))) {
                    conn.execute(
                        "UPDATE runsheet_jobs SET customer = ?1, updated_at = ?2 WHERE id = ?3",
                        params![client, db::now_stamp(), id],
                    )?;
                    customers += 1;
                    debug!(job = %job_number, "customer backfilled from statement");
                }
            }

            if need_address {
                if let Some(location) = location.as_deref().filter(|l| self.usable_address(l)) {
                    conn.execute(
                        "UPDATE runsheet_jobs SET job_address = ?1, updated_at = ?2 WHERE id = ?3",
                        params![location, db::now_stamp(), id],
                    )?;
                    addresses += 1;
                    debug!(job = %job_number, "address backfilled from statement");
                }
            }
        }

        Ok((addresses, customers))
    }

    /// Line items for job numbers that appear on no runsheet.
    pub fn paid_without_runsheet(&self, conn: &Connection) -> Result<Vec<PaidWithoutRunsheet>> {
        let mut stmt = conn.prepare(
            "SELECT li.job_number, li.client, li.amount,
                    li.settlement_week, li.settlement_year
             FROM line_items li
             WHERE li.job_number IS NOT NULL AND li.job_number != ''
               AND NOT EXISTS (
                   SELECT 1 FROM runsheet_jobs rj
                   WHERE rj.job_number = li.job_number
               )
             ORDER BY li.id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(PaidWithoutRunsheet {
                    job_number: row.get(0)?,
                    client: row.get(1)?,
                    amount: row.get(2)?,
                    settlement_week: row.get(3)?,
                    settlement_year: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Runsheet jobs whose number appears on no statement.
    pub fn never_paid(&self, conn: &Connection) -> Result<Vec<NeverPaidJob>> {
        let mut stmt = conn.prepare(
            "SELECT rj.run_date, rj.job_number, rj.customer
             FROM runsheet_jobs rj
             WHERE rj.job_number != ''
               AND NOT EXISTS (
                   SELECT 1 FROM line_items li
                   WHERE li.job_number = rj.job_number
               )
             ORDER BY rj.id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let run_date: String = row.get(0)?;
                Ok(NeverPaidJob {
                    run_date: run_date
                        .parse::<NaiveDate>()
                        .map_err(|_| rusqlite::Error::InvalidQuery)?,
                    job_number: row.get(1)?,
                    customer: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Coverage counts over the whole runsheet table. Placeholder
    /// customer/address values do not count as populated. A pay match is
    /// a populated pay_week: every backfill hit sets it, while pay_amount
    /// is legitimately null when the item's money fields never parsed.
    pub fn statistics(&self, conn: &Connection) -> Result<ReconcileStats> {
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN pay_week IS NOT NULL THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN job_address IS NOT NULL
                                       AND TRIM(job_address) != ''
                                       AND UPPER(TRIM(job_address)) NOT IN ('N/A', 'NA')
                                  THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN customer IS NOT NULL
                                       AND TRIM(customer) != ''
                                       AND UPPER(TRIM(customer)) NOT IN ('N/A', 'NA')
                                  THEN 1 ELSE 0 END), 0)
             FROM runsheet_jobs",
            [],
            |row| {
                Ok(ReconcileStats {
                    total_jobs: row.get(0)?,
                    pay_matched: row.get(1)?,
                    with_address: row.get(2)?,
                    with_customer: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn usable_address(&self, location: &str) -> bool {
        let trimmed = location.trim();
        if is_placeholder(Some(trimmed)) || trimmed.len() <= self.min_address_len {
            return false;
        }
        let upper = trimmed.to_uppercase();
        !NON_ADDRESS_CODES.contains(&upper.as_str())
    }
}

/// Null, blank, and "N/A"/"NA" (any case) are placeholders.
pub fn is_placeholder(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => {
            let trimmed = v.trim();
            trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") || trimmed.eq_ignore_ascii_case("na")
        }
    }
}

fn job_numbers(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT id, job_number FROM runsheet_jobs WHERE job_number != ''")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{open_test_db, test_item, test_job, test_statement};
    use crate::db::{get_runsheet_jobs, insert_runsheet_jobs, replace_statement};
    use crate::statement::ParsedStatement;

    fn seed_statement(conn: &mut Connection, items: Vec<crate::statement::LineItem>) {
        let parsed = ParsedStatement {
            statement: test_statement(2024, 12),
            items,
        };
        replace_statement(conn, &parsed).unwrap();
    }

    #[test]
    fn test_pay_backfill_uses_first_item_and_is_idempotent() {
        let mut conn = open_test_db();
        let date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        // Same job paid twice on one statement; the first item wins
        seed_statement(
            &mut conn,
            vec![
                test_item(Some("4209480"), 22.50),
                test_item(Some("4209480"), 99.99),
            ],
        );
        insert_runsheet_jobs(&conn, &[test_job(date, "4209480")]).unwrap();

        let engine = ReconciliationEngine::new();
        assert_eq!(engine.backfill_pay(&conn).unwrap(), 1);

        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].pay_amount, Some(22.50));
        assert_eq!(jobs[0].pay_week, Some(12));
        assert_eq!(jobs[0].pay_year, Some(2024));

        // Second pass rewrites the same values
        assert_eq!(engine.backfill_pay(&conn).unwrap(), 1);
        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].pay_amount, Some(22.50));

        let stats = engine.statistics(&conn).unwrap();
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.pay_matched, 1);
    }

    #[test]
    fn test_null_money_match_still_counts_as_paid() {
        let mut conn = open_test_db();
        let date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        // Item kept with null money fields after an exhausted lookahead
        let mut item = test_item(Some("4209480"), 0.0);
        item.quantity = None;
        item.rate = None;
        item.amount = None;
        seed_statement(&mut conn, vec![item]);
        insert_runsheet_jobs(&conn, &[test_job(date, "4209480")]).unwrap();

        let engine = ReconciliationEngine::new();
        let outcome = engine.run(&conn).unwrap();

        assert_eq!(outcome.pay_backfilled, 1);
        assert!(outcome.paid_without_runsheet.is_empty());
        assert!(outcome.never_paid.is_empty());

        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].pay_amount, None);
        assert_eq!(jobs[0].pay_week, Some(12));

        // A match with null money is still a match
        assert_eq!(outcome.stats.pay_matched, 1);
    }

    #[test]
    fn test_pay_backfill_first_match_across_statements() {
        let mut conn = open_test_db();
        let date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        // Same job number settled on two different weeks
        replace_statement(
            &mut conn,
            &ParsedStatement {
                statement: test_statement(2024, 12),
                items: vec![test_item(Some("4209480"), 22.50)],
            },
        )
        .unwrap();
        replace_statement(
            &mut conn,
            &ParsedStatement {
                statement: test_statement(2024, 13),
                items: vec![test_item(Some("4209480"), 99.0)],
            },
        )
        .unwrap();
        insert_runsheet_jobs(&conn, &[test_job(date, "4209480")]).unwrap();

        let engine = ReconciliationEngine::new();
        let outcome = engine.run(&conn).unwrap();
        assert_eq!(outcome.stats.pay_matched, 1);

        // First item in insertion order wins, with its settlement period
        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].pay_amount, Some(22.50));
        assert_eq!(jobs[0].pay_week, Some(12));
        assert_eq!(jobs[0].pay_year, Some(2024));
    }

    #[test]
    fn test_placeholder_backfill_never_overwrites_real_data() {
        let mut conn = open_test_db();
        let date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        seed_statement(&mut conn, vec![test_item(Some("4209480"), 22.50)]);

        // Real customer and address from the runsheet
        insert_runsheet_jobs(&conn, &[test_job(date, "4209480")]).unwrap();

        let engine = ReconciliationEngine::new();
        let (addresses, customers) = engine.backfill_placeholders(&conn).unwrap();
        assert_eq!((addresses, customers), (0, 0));

        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].customer.as_deref(), Some("TESCO Stores Limited"));
        assert_eq!(
            jobs[0].job_address.as_deref(),
            Some("Oxford Street\nMANCHESTER")
        );
    }

    #[test]
    fn test_placeholder_backfill_repairs_and_stays_stable() {
        let mut conn = open_test_db();
        let date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        seed_statement(&mut conn, vec![test_item(Some("4209480"), 22.50)]);

        let mut job = test_job(date, "4209480");
        job.customer = Some("N/A".to_string());
        job.job_address = None;
        insert_runsheet_jobs(&conn, &[job]).unwrap();

        let engine = ReconciliationEngine::new();
        let (addresses, customers) = engine.backfill_placeholders(&conn).unwrap();
        assert_eq!((addresses, customers), (1, 1));

        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].customer.as_deref(), Some("Acme Corp"));
        assert_eq!(jobs[0].job_address.as_deref(), Some("High Street Leeds"));

        // Second pass: nothing left to repair
        let (addresses, customers) = engine.backfill_placeholders(&conn).unwrap();
        assert_eq!((addresses, customers), (0, 0));
        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].customer.as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn test_internal_codes_rejected_as_addresses() {
        let mut conn = open_test_db();
        let date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        let mut item = test_item(Some("4209480"), 22.50);
        item.location = Some("DNCO".to_string());
        seed_statement(&mut conn, vec![item]);

        let mut job = test_job(date, "4209480");
        job.job_address = None;
        insert_runsheet_jobs(&conn, &[job]).unwrap();

        let engine = ReconciliationEngine::new();
        let (addresses, _) = engine.backfill_placeholders(&conn).unwrap();
        assert_eq!(addresses, 0);

        let jobs = get_runsheet_jobs(&conn, date).unwrap();
        assert_eq!(jobs[0].job_address, None);
    }

    #[test]
    fn test_discrepancy_lists_are_disjoint_from_matches() {
        let mut conn = open_test_db();
        let date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        // 4209480 matched, 7777777 paid but never on a runsheet,
        // 8888888 on a runsheet but never paid
        seed_statement(
            &mut conn,
            vec![
                test_item(Some("4209480"), 22.50),
                test_item(Some("7777777"), 40.0),
                test_item(None, 11.0),
            ],
        );
        insert_runsheet_jobs(
            &conn,
            &[test_job(date, "4209480"), test_job(date, "8888888")],
        )
        .unwrap();

        let engine = ReconciliationEngine::new();
        let outcome = engine.run(&conn).unwrap();

        assert_eq!(outcome.pay_backfilled, 1);
        assert_eq!(outcome.paid_without_runsheet.len(), 1);
        assert_eq!(outcome.paid_without_runsheet[0].job_number, "7777777");
        assert_eq!(outcome.never_paid.len(), 1);
        assert_eq!(outcome.never_paid[0].job_number, "8888888");

        assert_eq!(outcome.stats.total_jobs, 2);
        assert_eq!(outcome.stats.pay_matched, 1);
    }

    #[test]
    fn test_is_placeholder() {
        assert!(is_placeholder(None));
        assert!(is_placeholder(Some("")));
        assert!(is_placeholder(Some("  ")));
        assert!(is_placeholder(Some("n/a")));
        assert!(is_placeholder(Some("NA")));
        assert!(!is_placeholder(Some("TESCO Stores Limited")));
    }
}
