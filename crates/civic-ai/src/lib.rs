//! AI analysis boundary: the capability trait, a hosted chat-completions
//! client, retry with backoff, and a scripted stub.

mod client;
mod retry;
mod stub;

#[cfg(feature = "openai")]
mod openai;
#[cfg(feature = "openai")]
mod prompts;

pub use client::{
    AnalysisClient, DocumentAnalysis, DocumentParams, FeedbackAnalysis, ImpactSummary,
    ServiceError,
};
#[cfg(feature = "openai")]
pub use openai::OpenAiClient;
pub use retry::{Resilient, RetryPolicy};
pub use stub::StubClient;
