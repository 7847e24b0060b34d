//! Analysis pipelines: document ingestion → analysis, feedback → analysis → store.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use civic_ai::{AnalysisClient, DocumentAnalysis, DocumentParams, ServiceError};
use civic_core::ingest;
use civic_core::{FeedbackDraft, FeedbackEntry, FeedbackKind, ReadingStats, SentimentLabel};
use civic_store::FeedbackStore;
use tracing::info;

pub struct DocumentReport {
    pub source: PathBuf,
    pub document_id: String,
    pub original: ReadingStats,
    pub simplified: ReadingStats,
    pub analysis: DocumentAnalysis,
    pub elapsed_secs: f64,
}

/// Feedback as typed by the citizen, before analysis.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub document_id: String,
    pub text: String,
    pub demographics: Vec<(String, String)>,
    pub submitter: Option<String>,
    pub kind: Option<FeedbackKind>,
}

fn unavailable(err: ServiceError) -> anyhow::Error {
    anyhow::Error::new(err).context("analysis unavailable")
}

/// Ingest → simplify and analyse impact.
pub async fn analyze_file<C: AnalysisClient + ?Sized>(
    client: &C,
    path: &Path,
    params: &DocumentParams,
    max_bytes: u64,
) -> anyhow::Result<DocumentReport> {
    let start = Instant::now();

    let text = ingest::extract_file(path, max_bytes)
        .with_context(|| format!("reading {}", path.display()))?;
    let document_id = ingest::document_id(&text);
    info!(
        document = %document_id,
        path = %path.display(),
        chars = text.chars().count(),
        client = client.name(),
        "analysing document"
    );

    let analysis = client
        .analyze_document(&text, params)
        .await
        .map_err(unavailable)?;

    Ok(DocumentReport {
        source: path.to_path_buf(),
        document_id,
        original: ReadingStats::compute(&text),
        simplified: ReadingStats::compute(&analysis.simplified_text),
        analysis,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// Analyse one comment and commit it with the analysis attached.
///
/// The draft is checked against the store before the client is called, and
/// nothing is stored when analysis fails.
pub async fn submit_feedback<C: AnalysisClient + ?Sized>(
    store: &FeedbackStore,
    client: &C,
    submission: Submission,
) -> anyhow::Result<FeedbackEntry> {
    // Sentiment is a placeholder until the analysis below fills it in.
    let mut draft = FeedbackDraft::new(
        submission.document_id,
        submission.text,
        SentimentLabel::Neutral,
    );
    draft.submitter = submission.submitter;
    draft.feedback_kind = submission.kind;
    for (key, value) in submission.demographics {
        draft = draft.with_demographic(key, value);
    }
    store.check(&draft).context("invalid feedback")?;

    let analysis = client
        .analyze_feedback(&draft.free_text, draft.feedback_kind)
        .await
        .map_err(unavailable)?;
    draft.sentiment_label = analysis.sentiment;
    draft.category_tags = analysis.category_tags;
    draft.key_points = analysis.key_points;

    let entry = store.submit(draft).context("storing feedback")?;
    Ok(entry)
}
