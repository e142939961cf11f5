//! # balcao-db: Database Layer for Balcao POS
//!
//! This crate provides persistence and transactional orchestration for
//! the sale-settlement and cash-ledger core. It uses SQLite for local
//! storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Balcao POS Data Flow                        |
//! |                                                                    |
//! |  Caller (screen controller, report renderer)                       |
//! |       |                                                            |
//! |       v                                                            |
//! |  +--------------------------------------------------------------+  |
//! |  |                   balcao-db (THIS CRATE)                     |  |
//! |  |                                                              |  |
//! |  |  +-----------+  +---------------+  +-----------------------+ |  |
//! |  |  | Database  |  | Repositories  |  | Settlement            | |  |
//! |  |  | (pool.rs) |  | inventory     |  | (settlement.rs)       | |  |
//! |  |  |           |  | order / sale  |  |                       | |  |
//! |  |  | SqlitePool|<-| cash ledger   |  | one transaction per   | |  |
//! |  |  | WAL mode  |  | reports       |  | logical action, retry | |  |
//! |  |  +-----------+  +---------------+  | on lock contention    | |  |
//! |  |                                    +-----------------------+ |  |
//! |  +--------------------------------------------------------------+  |
//! |       |                                                            |
//! |       v                                                            |
//! |  SQLite database file (WAL)                                        |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types and contention classification
//! - [`repository`] - Ledger implementations (inventory, order, sale, cash)
//! - [`settlement`] - The sale settlement coordinator
//! - [`report`] - Read-only balance reports
//!
//! ## Usage
//!
//! ```rust,ignore
//! use balcao_db::{Database, DbConfig, SettlementConfig};
//!
//! let db = Database::new(DbConfig::new("balcao.db")).await?;
//!
//! let session = db.cash().open("operator-id", 10_000).await?;
//! let order = db.orders().create(Some("customer"), Some("seller")).await?;
//! // ... add lines, save ...
//! let sale = db
//!     .settlement(SettlementConfig::default())
//!     .finalize_order(&order.id, &payment)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod report;
pub mod repository;
pub mod settlement;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use report::{PeriodBalance, ReportAggregator, SessionSummary};
pub use settlement::{Settlement, SettlementConfig};

// Repository re-exports for convenience
pub use repository::cash::CashLedger;
pub use repository::inventory::InventoryRepository;
pub use repository::order::OrderRepository;
pub use repository::sale::SaleRepository;
