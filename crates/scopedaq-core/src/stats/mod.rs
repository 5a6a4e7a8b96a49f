//! Session statistics

pub mod store;
