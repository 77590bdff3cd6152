//! volley-core: shared fault types, time budgets, and configuration.
//! The engine and the binary both depend on this one.

pub mod budget;
pub mod config;
pub mod fault;

pub use budget::TimeBudget;
pub use fault::{BoxError, Fault, Outcome, WaitError};
