//! `mboxrank`: rank the sending domains of an MBOX file of any size.
//!
//! The file is streamed in batches, sender statistics are merged into a
//! bounded in-memory accumulator, and whatever does not fit is spilled to an
//! on-disk overflow store. The result is a list of domains ranked by message
//! count, which [`consolidate`] can filter and fold by root domain.
//!
//! ```no_run
//! use mboxrank::engine::{CancelToken, Engine, EngineOptions};
//! use mboxrank::source::FileSource;
//! use mboxrank::store::MemoryStore;
//!
//! # fn main() -> mboxrank::error::Result<()> {
//! let mut source = FileSource::open("archive.mbox")?;
//! let mut engine = Engine::new(MemoryStore::new(), EngineOptions::default());
//! let output = engine.run(&mut source, None, &CancelToken::new())?;
//! for group in output.groups.iter().take(10) {
//!     println!("{:>8}  {}", group.total_count, group.domain);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod source;
pub mod store;
