#![forbid(unsafe_code)]

pub mod analytics_rollup;
pub mod batch;
pub mod dashboard_layout;
pub mod layout_learning;
pub mod schedule;
