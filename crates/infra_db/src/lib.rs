//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the period closing engine, using SQLx.
//!
//! # Architecture
//!
//! - `repositories`: SQL and row types
//! - `adapters`: `ClosingStore` and `LedgerPort` implementations over the
//!   repositories
//! - `pool`: connection pool and embedded migrations
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresClosingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/closing")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresClosingStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PostgresClosingStore, PostgresLedger};
