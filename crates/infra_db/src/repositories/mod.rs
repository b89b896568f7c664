//! Repository implementations
//!
//! Repositories hold the SQL. They speak database row types and
//! [`DatabaseError`](crate::DatabaseError); the adapters translate to domain
//! types and port errors.
//!
//! Queries are built at runtime with `sqlx::query_as::<_, Row>` so the crate
//! compiles without a live database.

pub mod closing;
pub mod ledger;

pub use closing::ClosingRepository;
pub use ledger::LedgerRepository;
