//! Request handlers

pub mod closing;
pub mod health;
