//! Test Utilities Crate
//!
//! Shared test infrastructure, fixtures, and helpers for the period closing
//! test suites.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built accounts, periods and vouchers
//! - `builders`: Ledger seeds and voucher builders
//! - `database`: PostgreSQL testcontainer management
//! - `assertions`: Assertion helpers for closing entries and unit counts
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
