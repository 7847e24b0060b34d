//! The analysis capability consumed by the rest of the system.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use civic_core::{FeedbackKind, ReadingLevel, SentimentLabel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("analysis service rejected credentials: {0}")]
    Auth(String),

    #[error("rate limited by analysis service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("analysis request timed out after {0:?}")]
    Timeout(Duration),

    #[error("analysis service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("analysis transport error: {0}")]
    Http(String),

    #[error("malformed analysis response: {0}")]
    Malformed(String),

    #[error("analysis client not configured: {0}")]
    NotConfigured(String),

    #[error("analysis unavailable after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ServiceError>,
    },
}

impl ServiceError {
    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Http(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Parameters for document simplification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentParams {
    pub reading_level: ReadingLevel,
    pub language: String,
}

impl Default for DocumentParams {
    fn default() -> Self {
        Self {
            reading_level: ReadingLevel::default(),
            language: "English".to_string(),
        }
    }
}

/// Expected effect of a policy on one demographic group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactSummary {
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub concerns: String,
    #[serde(default)]
    pub benefits: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub simplified_text: String,
    /// group name → impact summary
    pub demographic_impact: BTreeMap<String, ImpactSummary>,
    pub key_provisions: Vec<String>,
    /// Original grade level minus simplified grade level.
    pub readability_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    pub sentiment: SentimentLabel,
    pub category_tags: BTreeSet<String>,
    pub key_points: Vec<String>,
}

impl FeedbackAnalysis {
    pub fn new(sentiment: SentimentLabel) -> Self {
        Self {
            sentiment,
            category_tags: BTreeSet::new(),
            key_points: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.category_tags.insert(tag.into());
        self
    }
}

/// Hosted-model analysis, abstracted so tests can run without a network.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Simplify `text` and summarise its demographic impact.
    async fn analyze_document(
        &self,
        text: &str,
        params: &DocumentParams,
    ) -> Result<DocumentAnalysis, ServiceError>;

    /// Label one feedback comment with sentiment, categories and key points.
    async fn analyze_feedback(
        &self,
        text: &str,
        kind: Option<FeedbackKind>,
    ) -> Result<FeedbackAnalysis, ServiceError>;
}

#[async_trait]
impl<C: AnalysisClient + ?Sized> AnalysisClient for Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn analyze_document(
        &self,
        text: &str,
        params: &DocumentParams,
    ) -> Result<DocumentAnalysis, ServiceError> {
        (**self).analyze_document(text, params).await
    }

    async fn analyze_feedback(
        &self,
        text: &str,
        kind: Option<FeedbackKind>,
    ) -> Result<FeedbackAnalysis, ServiceError> {
        (**self).analyze_feedback(text, kind).await
    }
}
