//! Local media metadata inspection.
//!
//! A file of up to 24 GiB is presented to a pull-based [`engine::MetadataEngine`]
//! through either an in-memory buffer or a [`reader::ChunkedReader`], chosen
//! once per file by [`analysis::Analyzer`].

pub mod analysis;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod constants;
pub mod engine;
pub mod format;
pub mod logging;
pub mod progress;
pub mod reader;
pub mod report;
pub mod source;
pub mod util;
