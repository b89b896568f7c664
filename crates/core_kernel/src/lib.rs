//! Core Kernel - Foundational types for the period closing engine
//!
//! This crate provides the building blocks shared by every other crate:
//! - Amount normalization and currency codes
//! - Closing periods with calendar-day iteration
//! - Strongly-typed identifiers
//! - Port error types for the hexagonal adapters

pub mod amount;
pub mod period;
pub mod identifiers;
pub mod ports;

pub use amount::{CurrencyCode, Precision, AmountError};
pub use period::{ClosingPeriod, TemporalError};
pub use identifiers::{RunId, VoucherId, GlEntryId, PostingBatchId};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
