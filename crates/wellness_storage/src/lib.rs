#![forbid(unsafe_code)]

pub mod dashboard;
pub mod repo;
