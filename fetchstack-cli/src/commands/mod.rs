//! CLI command implementations.
//!
//! - [`get`] - Download URLs as one stack
//! - [`output`] - File naming and console summaries for downloaded bodies

pub mod get;
pub mod output;
