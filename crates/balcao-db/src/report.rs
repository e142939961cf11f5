//! # Balance Report Aggregator
//!
//! Derives period balances (entradas, saidas, saldo) from the cash
//! ledger for reporting consumers.
//!
//! Pure read: nothing here mutates Sale, Order, CashSession or Product
//! state. Rendering (text, PDF) happens outside this workspace.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use crate::repository::cash;
use balcao_core::{CashSession, CashSessionStatus};

// =============================================================================
// Report DTOs
// =============================================================================

/// Aggregated cash balance over a period.
///
/// Covers every session whose opening timestamp falls in
/// `[period_start, period_end)`. Sessions are ordered by
/// `(opened_at, id)` so the earliest/latest picks are deterministic.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodBalance {
    /// Opening balance of the earliest session in the period.
    pub opening_balance_cents: i64,
    /// Closing balance of the latest session (its running balance if
    /// that session is still open).
    pub closing_balance_cents: i64,
    /// Sum of all entradas in the period's sessions.
    pub total_in_cents: i64,
    /// Sum of all saidas in the period's sessions.
    pub total_out_cents: i64,
    /// total_in - total_out.
    pub net_cents: i64,
    /// How many sessions opened in the period.
    pub session_count: usize,
}

impl PeriodBalance {
    fn empty() -> Self {
        PeriodBalance {
            opening_balance_cents: 0,
            closing_balance_cents: 0,
            total_in_cents: 0,
            total_out_cents: 0,
            net_cents: 0,
            session_count: 0,
        }
    }
}

/// Per-session movement summary, the data a closing report consumes.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub operator_id: String,
    pub opening_balance_cents: i64,
    pub total_in_cents: i64,
    pub total_out_cents: i64,
    /// opening + in - out at the time of the query.
    pub balance_cents: i64,
    pub movement_count: usize,
}

// =============================================================================
// Aggregator
// =============================================================================

/// Read-only aggregator over the cash ledger.
#[derive(Debug, Clone)]
pub struct ReportAggregator {
    pool: SqlitePool,
}

impl ReportAggregator {
    /// Creates a new ReportAggregator.
    pub fn new(pool: SqlitePool) -> Self {
        ReportAggregator { pool }
    }

    /// Computes the cash balance over `[period_start, period_end)`.
    ///
    /// Returns all zeros when no session opened in the period.
    pub async fn period_balance(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<PeriodBalance> {
        let sessions: Vec<CashSession> = sqlx::query_as(
            "SELECT id, operator_id, opening_balance_cents, closing_balance_cents, \
                    status, opened_at, closed_at, observation \
             FROM cash_sessions \
             WHERE opened_at >= ?1 AND opened_at < ?2 \
             ORDER BY opened_at, id",
        )
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await?;

        if sessions.is_empty() {
            return Ok(PeriodBalance::empty());
        }

        let (total_in_cents, total_out_cents): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE m.kind WHEN 'entrada' THEN m.amount_cents ELSE 0 END), 0),
                COALESCE(SUM(CASE m.kind WHEN 'saida' THEN m.amount_cents ELSE 0 END), 0)
            FROM cash_movements m
            JOIN cash_sessions s ON s.id = m.cash_session_id
            WHERE s.opened_at >= ?1 AND s.opened_at < ?2
            "#,
        )
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        let earliest = &sessions[0];
        let latest = &sessions[sessions.len() - 1];

        let closing_balance_cents = match (latest.status, latest.closing_balance_cents) {
            (CashSessionStatus::Closed, Some(balance)) => balance,
            _ => {
                // Latest session still open: report its running balance
                let mut conn = self.pool.acquire().await?;
                cash::running_balance(&mut conn, latest).await?
            }
        };

        Ok(PeriodBalance {
            opening_balance_cents: earliest.opening_balance_cents,
            closing_balance_cents,
            total_in_cents,
            total_out_cents,
            net_cents: total_in_cents - total_out_cents,
            session_count: sessions.len(),
        })
    }

    /// Summarizes one session's movements.
    pub async fn session_summary(&self, session_id: &str) -> DbResult<SessionSummary> {
        let session: Option<CashSession> = sqlx::query_as(
            "SELECT id, operator_id, opening_balance_cents, closing_balance_cents, \
                    status, opened_at, closed_at, observation \
             FROM cash_sessions WHERE id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let session = session.ok_or_else(|| DbError::not_found("Cash session", session_id))?;

        let (total_in_cents, total_out_cents, movement_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE kind WHEN 'entrada' THEN amount_cents ELSE 0 END), 0),
                COALESCE(SUM(CASE kind WHEN 'saida' THEN amount_cents ELSE 0 END), 0),
                COUNT(*)
            FROM cash_movements
            WHERE cash_session_id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SessionSummary {
            session_id: session.id,
            operator_id: session.operator_id,
            opening_balance_cents: session.opening_balance_cents,
            total_in_cents,
            total_out_cents,
            balance_cents: session.opening_balance_cents + total_in_cents - total_out_cents,
            movement_count: movement_count as usize,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
