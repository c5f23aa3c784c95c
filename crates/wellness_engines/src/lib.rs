#![forbid(unsafe_code)]

pub mod engagement;
pub mod layout;
pub mod motivation;
