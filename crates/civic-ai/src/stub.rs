//! Scripted client for tests and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use civic_core::{FeedbackKind, SentimentLabel};

use crate::client::{
    AnalysisClient, DocumentAnalysis, DocumentParams, FeedbackAnalysis, ServiceError,
};

/// Answers from a fixed script; never touches the network.
///
/// Feedback text without a scripted answer gets `default_feedback`
/// (neutral, no tags). Documents echo their input unless a document
/// analysis was scripted. Queued failures are returned first, one per call.
pub struct StubClient {
    feedback: HashMap<String, FeedbackAnalysis>,
    default_feedback: FeedbackAnalysis,
    document: Option<DocumentAnalysis>,
    failures: Mutex<VecDeque<ServiceError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Default for StubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            feedback: HashMap::new(),
            default_feedback: FeedbackAnalysis::new(SentimentLabel::Neutral),
            document: None,
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_feedback(mut self, text: impl Into<String>, analysis: FeedbackAnalysis) -> Self {
        self.feedback.insert(text.into(), analysis);
        self
    }

    pub fn with_default_feedback(mut self, analysis: FeedbackAnalysis) -> Self {
        self.default_feedback = analysis;
        self
    }

    pub fn with_document(mut self, analysis: DocumentAnalysis) -> Self {
        self.document = Some(analysis);
        self
    }

    /// Queue a failure for the next call that has none queued before it.
    pub fn fail_next(self, err: ServiceError) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(err);
        }
        self
    }

    pub fn fail_times(mut self, times: usize, err: ServiceError) -> Self {
        for _ in 0..times {
            self = self.fail_next(err.clone());
        }
        self
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin_call(&self) -> Result<(), ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self
            .failures
            .lock()
            .map_err(|_| ServiceError::Http("stub failure queue poisoned".to_string()))?
            .pop_front();
        match queued {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AnalysisClient for StubClient {
    fn name(&self) -> &str {
        "stub"
    }

    async fn analyze_document(
        &self,
        text: &str,
        _params: &DocumentParams,
    ) -> Result<DocumentAnalysis, ServiceError> {
        self.begin_call().await?;
        Ok(self.document.clone().unwrap_or_else(|| DocumentAnalysis {
            simplified_text: text.trim().to_string(),
            demographic_impact: Default::default(),
            key_provisions: Vec::new(),
            readability_delta: 0.0,
        }))
    }

    async fn analyze_feedback(
        &self,
        text: &str,
        _kind: Option<FeedbackKind>,
    ) -> Result<FeedbackAnalysis, ServiceError> {
        self.begin_call().await?;
        Ok(self
            .feedback
            .get(text)
            .unwrap_or(&self.default_feedback)
            .clone())
    }
}
