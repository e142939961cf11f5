//! # Cash Session Ledger
//!
//! Owns the lifecycle of the cash drawer session ("caixa") and its
//! movements.
//!
//! ## State Machine
//! ```text
//! +---------------------------------------------------------------------+
//! |                                                                     |
//! |   NONE ----open----> OPEN ----close----> CLOSED (terminal)          |
//! |                       |                                             |
//! |                       +-- add_movement (entrada / saida)            |
//! |                                                                     |
//! |   Invariants:                                                       |
//! |   * at most one OPEN session at any time                            |
//! |   * movements only on OPEN sessions, amount > 0                     |
//! |   * a saida never pushes the running balance below zero             |
//! |   * closing balance = opening + sum(entradas) - sum(saidas),        |
//! |     set once at close, immutable afterwards                         |
//! |                                                                     |
//! +---------------------------------------------------------------------+
//! ```
//!
//! Every check runs inside the same transaction as the write it guards:
//! the open-session check and the insert, the status check and the
//! movement append, the balance computation and the close.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use balcao_core::validation::{
    validate_description, validate_movement_amount, validate_opening_balance,
};
use balcao_core::{CashMovement, CashSession, CashSessionStatus, CoreError, MovementKind};

const SESSION_COLUMNS: &str = "id, operator_id, opening_balance_cents, closing_balance_cents, \
     status, opened_at, closed_at, observation";

const MOVEMENT_COLUMNS: &str =
    "id, cash_session_id, kind, amount_cents, description, occurred_at";

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Finds the OPEN session, if any, inside the caller's transaction.
pub(crate) async fn find_open(conn: &mut SqliteConnection) -> DbResult<Option<CashSession>> {
    let session: Option<CashSession> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS} FROM cash_sessions WHERE status = 'open'"
    ))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(session)
}

/// Loads a session inside the caller's transaction.
pub(crate) async fn load_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<CashSession> {
    let session: Option<CashSession> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS} FROM cash_sessions WHERE id = ?1"
    ))
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;

    session.ok_or_else(|| DbError::not_found("Cash session", session_id))
}

/// Computes a session's running balance inside the caller's transaction.
///
/// opening + sum(entradas) - sum(saidas)
pub(crate) async fn running_balance(
    conn: &mut SqliteConnection,
    session: &CashSession,
) -> DbResult<i64> {
    let moved: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(
            CASE kind WHEN 'entrada' THEN amount_cents ELSE -amount_cents END
        ), 0)
        FROM cash_movements
        WHERE cash_session_id = ?1
        "#,
    )
    .bind(&session.id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(session.opening_balance_cents + moved)
}

/// Appends a movement to an OPEN session inside the caller's transaction.
///
/// Re-reads the session status and, for saidas, the running balance, so
/// the invariants hold no matter how stale the caller's view is.
pub(crate) async fn append_movement(
    conn: &mut SqliteConnection,
    session_id: &str,
    kind: MovementKind,
    amount_cents: i64,
    description: &str,
) -> DbResult<CashMovement> {
    validate_movement_amount(amount_cents).map_err(CoreError::from)?;
    validate_description(description).map_err(CoreError::from)?;

    let session = load_session(&mut *conn, session_id).await?;
    if !session.is_open() {
        return Err(CoreError::InvalidSessionState {
            session_id: session_id.to_string(),
            current: "closed".to_string(),
        }
        .into());
    }

    if kind == MovementKind::Saida {
        let balance = running_balance(&mut *conn, &session).await?;
        if amount_cents > balance {
            return Err(CoreError::InsufficientCashBalance {
                session_id: session_id.to_string(),
                available: balance,
                requested: amount_cents,
            }
            .into());
        }
    }

    let movement = CashMovement {
        id: Uuid::new_v4().to_string(),
        cash_session_id: session_id.to_string(),
        kind,
        amount_cents,
        description: description.to_string(),
        occurred_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO cash_movements (
            id, cash_session_id, kind, amount_cents, description, occurred_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.cash_session_id)
    .bind(movement.kind)
    .bind(movement.amount_cents)
    .bind(&movement.description)
    .bind(movement.occurred_at)
    .execute(&mut *conn)
    .await?;

    debug!(
        session_id = %session_id,
        kind = ?kind,
        amount = %amount_cents,
        "Cash movement appended"
    );

    Ok(movement)
}

// =============================================================================
// Ledger
// =============================================================================

/// The cash session ledger.
///
/// ## Usage
/// ```rust,ignore
/// let cash = db.cash();
/// let session = cash.open("operator-id", 10_000).await?;
/// cash.add_movement(&session.id, MovementKind::Saida, 2_000, "troco").await?;
/// let closed = cash.close(&session.id, Some("fim do turno")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct CashLedger {
    pool: SqlitePool,
}

impl CashLedger {
    /// Creates a new CashLedger.
    pub fn new(pool: SqlitePool) -> Self {
        CashLedger { pool }
    }

    /// Opens a new cash session.
    ///
    /// Fails with `CashSessionAlreadyOpen` if any session is OPEN. The
    /// check and the insert run in the same transaction, so two
    /// interleaved opens cannot both succeed.
    pub async fn open(&self, operator_id: &str, opening_balance_cents: i64) -> DbResult<CashSession> {
        validate_opening_balance(opening_balance_cents).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;

        if let Some(existing) = find_open(&mut tx).await? {
            return Err(CoreError::CashSessionAlreadyOpen {
                session_id: existing.id,
            }
            .into());
        }

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            operator_id: operator_id.to_string(),
            opening_balance_cents,
            closing_balance_cents: None,
            status: CashSessionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            observation: None,
        };

        sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, operator_id, opening_balance_cents, closing_balance_cents,
                status, opened_at, closed_at, observation
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&session.id)
        .bind(&session.operator_id)
        .bind(session.opening_balance_cents)
        .bind(session.closing_balance_cents)
        .bind(session.status)
        .bind(session.opened_at)
        .bind(session.closed_at)
        .bind(&session.observation)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            session_id = %session.id,
            operator_id = %operator_id,
            opening_balance = %opening_balance_cents,
            "Cash session opened"
        );

        Ok(session)
    }

    /// Appends a movement to an open session in its own transaction.
    pub async fn add_movement(
        &self,
        session_id: &str,
        kind: MovementKind,
        amount_cents: i64,
        description: &str,
    ) -> DbResult<CashMovement> {
        let mut tx = self.pool.begin().await?;
        let movement = append_movement(&mut tx, session_id, kind, amount_cents, description).await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Closes an open session.
    ///
    /// Sets the closing balance to the running balance at this moment,
    /// records the closing timestamp, and transitions to CLOSED. Once
    /// closed, no further movements can be appended and the closing
    /// balance never changes.
    pub async fn close(&self, session_id: &str, observation: Option<&str>) -> DbResult<CashSession> {
        let mut tx = self.pool.begin().await?;

        let mut session = load_session(&mut tx, session_id).await?;
        if !session.is_open() {
            return Err(CoreError::InvalidSessionState {
                session_id: session_id.to_string(),
                current: "closed".to_string(),
            }
            .into());
        }

        let balance = running_balance(&mut tx, &session).await?;
        let closed_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE cash_sessions SET
                closing_balance_cents = ?2,
                status = 'closed',
                closed_at = ?3,
                observation = ?4
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(session_id)
        .bind(balance)
        .bind(closed_at)
        .bind(observation)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        session.closing_balance_cents = Some(balance);
        session.status = CashSessionStatus::Closed;
        session.closed_at = Some(closed_at);
        session.observation = observation.map(|s| s.to_string());

        info!(
            session_id = %session_id,
            closing_balance = %balance,
            "Cash session closed"
        );

        Ok(session)
    }

    /// Returns the currently open session, if any.
    pub async fn current_open(&self) -> DbResult<Option<CashSession>> {
        let mut conn = self.pool.acquire().await?;
        find_open(&mut conn).await
    }

    /// Gets a session by ID.
    pub async fn get_by_id(&self, session_id: &str) -> DbResult<Option<CashSession>> {
        let session: Option<CashSession> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM cash_sessions WHERE id = ?1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Gets a session's movements in chronological order.
    pub async fn movements(&self, session_id: &str) -> DbResult<Vec<CashMovement>> {
        let movements: Vec<CashMovement> = sqlx::query_as(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM cash_movements \
             WHERE cash_session_id = ?1 ORDER BY occurred_at, rowid"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Computes a session's running balance.
    pub async fn running_balance(&self, session_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        let session = load_session(&mut conn, session_id).await?;
        running_balance(&mut conn, &session).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use balcao_core::ValidationError;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_and_current() {
        let db = test_db().await;
        let cash = db.cash();

        assert!(cash.current_open().await.unwrap().is_none());

        let session = cash.open("op-1", 10_000).await.unwrap();
        assert!(session.is_open());
        assert_eq!(session.opening_balance_cents, 10_000);
        assert!(session.closing_balance_cents.is_none());

        let current = cash.current_open().await.unwrap().unwrap();
        assert_eq!(current.id, session.id);
    }

    #[tokio::test]
    async fn test_second_open_rejected() {
        let db = test_db().await;
        let cash = db.cash();

        let first = cash.open("op-1", 10_000).await.unwrap();
        let err = cash.open("op-2", 5_000).await.unwrap_err();

        match err {
            DbError::Core(CoreError::CashSessionAlreadyOpen { session_id }) => {
                assert_eq!(session_id, first.id);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Original session unchanged
        let unchanged = cash.get_by_id(&first.id).await.unwrap().unwrap();
        assert!(unchanged.is_open());
        assert_eq!(unchanged.opening_balance_cents, 10_000);
    }

    #[tokio::test]
    async fn test_open_after_close_allowed() {
        let db = test_db().await;
        let cash = db.cash();

        let first = cash.open("op-1", 10_000).await.unwrap();
        cash.close(&first.id, None).await.unwrap();

        let second = cash.open("op-2", 2_000).await.unwrap();
        assert!(second.is_open());
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_negative_opening_balance_rejected() {
        let db = test_db().await;
        let err = db.cash().open("op-1", -1).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::MustBeNonNegative { .. }))
        ));
    }

    #[tokio::test]
    async fn test_close_balance_equation() {
        let db = test_db().await;
        let cash = db.cash();

        // 100.00 open, +50.00, -20.00 => close at 130.00
        let session = cash.open("op-1", 10_000).await.unwrap();
        cash.add_movement(&session.id, MovementKind::Entrada, 5_000, "venda avulsa")
            .await
            .unwrap();
        cash.add_movement(&session.id, MovementKind::Saida, 2_000, "sangria")
            .await
            .unwrap();

        let closed = cash.close(&session.id, Some("fim do turno")).await.unwrap();
        assert_eq!(closed.closing_balance_cents, Some(13_000));
        assert_eq!(closed.status, CashSessionStatus::Closed);
        assert!(closed.closed_at.is_some());

        let stored = cash.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.closing_balance_cents, Some(13_000));
        assert_eq!(stored.observation.as_deref(), Some("fim do turno"));
    }

    #[tokio::test]
    async fn test_close_twice_rejected() {
        let db = test_db().await;
        let cash = db.cash();

        let session = cash.open("op-1", 1_000).await.unwrap();
        cash.close(&session.id, None).await.unwrap();

        let err = cash.close(&session.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidSessionState { .. })
        ));

        // Closing balance untouched by the failed second close
        let stored = cash.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.closing_balance_cents, Some(1_000));
    }

    #[tokio::test]
    async fn test_movement_on_closed_session_rejected() {
        let db = test_db().await;
        let cash = db.cash();

        let session = cash.open("op-1", 1_000).await.unwrap();
        cash.close(&session.id, None).await.unwrap();

        let err = cash
            .add_movement(&session.id, MovementKind::Entrada, 500, "tarde demais")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidSessionState { .. })
        ));
        assert!(cash.movements(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amount_rejected() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open("op-1", 1_000).await.unwrap();

        for bad in [0, -500] {
            let err = cash
                .add_movement(&session.id, MovementKind::Entrada, bad, "nada")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DbError::Core(CoreError::Validation(ValidationError::MustBePositive { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn test_saida_cannot_overdraw() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open("op-1", 1_000).await.unwrap();

        let err = cash
            .add_movement(&session.id, MovementKind::Saida, 1_500, "sangria grande")
            .await
            .unwrap_err();

        match err {
            DbError::Core(CoreError::InsufficientCashBalance {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, 1_000);
                assert_eq!(requested, 1_500);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Exact drain down to zero is fine
        cash.add_movement(&session.id, MovementKind::Saida, 1_000, "sangria total")
            .await
            .unwrap();
        assert_eq!(cash.running_balance(&session.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_movements_listing() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open("op-1", 0).await.unwrap();

        cash.add_movement(&session.id, MovementKind::Entrada, 300, "primeira")
            .await
            .unwrap();
        cash.add_movement(&session.id, MovementKind::Entrada, 700, "segunda")
            .await
            .unwrap();

        let movements = cash.movements(&session.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].description, "primeira");
        assert_eq!(session.balance_with(&movements), 1_000);
    }
}
