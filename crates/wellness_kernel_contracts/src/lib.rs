#![forbid(unsafe_code)]

pub mod common;
pub mod dashboard;

pub use common::{ContractViolation, SchemaVersion, Validate};
