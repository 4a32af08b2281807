//! State log: records every committed world state for later playback.
//!
//! # Layout
//! A saved log is two files side by side:
//! ```text
//! run.stlog        - CBOR + zstd compressed states
//! run.stlog.json   - header: schema version, counts, time range, sha256 of the body
//! ```
//! The header is verified before the body is decoded; a mismatch fails the load.

mod file;
mod record;

pub use file::{LogError, LogHeader, header_path, load, read_header, save};
pub use record::{LogHandle, LogSink, StateLog};
