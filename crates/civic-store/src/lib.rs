//! Storage layer: append-only feedback log, filtering, aggregation and export.

mod aggregate;
mod error;
mod export;
mod filter;
mod log;
mod store;

pub use aggregate::{AggregateReport, SentimentCounts, TagCount};
pub use error::StoreError;
pub use export::{ExportFormat, render_report, to_record_batch};
pub use filter::FeedbackFilter;
pub use store::{DEFAULT_TOP_TAGS, FeedbackStore, Listing};
