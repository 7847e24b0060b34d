pub mod config;
pub mod feedback;
pub mod ingest;
pub mod readability;
pub mod schema;

pub use config::{ApiKey, BridgeConfig, ConfigError, ReadingLevel, Taxonomy};
pub use feedback::{
    Demographics, FeedbackDraft, FeedbackEntry, FeedbackKind, SentimentLabel, UnknownVariant,
};
pub use ingest::IngestError;
pub use readability::ReadingStats;
pub use schema::feedback as feedback_schema;
