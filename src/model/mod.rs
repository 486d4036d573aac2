//! Data model: sender addresses, partial aggregates, filter settings and ranked output.

pub mod address;
pub mod aggregate;
pub mod filter;
pub mod personal;
pub mod ranked;
