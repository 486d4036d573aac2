//! Mail parsing: the line scanner, header matching and date parsing.

pub mod header;
pub mod scanner;
