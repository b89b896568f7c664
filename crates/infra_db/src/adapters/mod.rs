//! Domain Adapters
//!
//! PostgreSQL implementations of the closing ports. Each adapter wraps a
//! repository, converts rows to domain types and maps database errors to
//! `PortError`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{PostgresClosingStore, PostgresLedger};
//! use domain_closing::{ClosingEngine, EngineConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(PostgresClosingStore::new(pool.clone()));
//! let ledger = Arc::new(PostgresLedger::new(pool));
//! let engine = ClosingEngine::spawn(store, ledger, EngineConfig::default());
//! ```

pub mod closing;
pub mod ledger;

pub use closing::PostgresClosingStore;
pub use ledger::PostgresLedger;
