//! The feedback store: validated, append-only, concurrently readable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use civic_core::feedback_schema::LIST_SEPARATOR;
use civic_core::{FeedbackDraft, FeedbackEntry, Taxonomy};
use tracing::{debug, info};

use crate::aggregate::AggregateReport;
use crate::export::{self, ExportFormat};
use crate::filter::FeedbackFilter;
use crate::log::FeedbackLog;
use crate::StoreError;

/// Default number of tags kept in [`AggregateReport::top_tags`].
pub const DEFAULT_TOP_TAGS: usize = 10;

/// Append-only collection of [`FeedbackEntry`] records.
///
/// Construct one per process with [`in_memory`](Self::in_memory) or
/// [`open`](Self::open) and hand out references (or an `Arc`) to whatever
/// needs it. All methods take `&self`.
///
/// Submits are serialised behind a write lock and become visible only once
/// committed (for a durable store: written and synced to the log). Readers
/// clone a snapshot of entry handles and never observe a partial entry.
pub struct FeedbackStore {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
    taxonomy: Taxonomy,
    top_tags: usize,
}

struct Inner {
    entries: Vec<Arc<FeedbackEntry>>,
    next_id: u64,
    log: Option<FeedbackLog>,
}

impl FeedbackStore {
    /// An ephemeral store; contents are lost when it is dropped.
    pub fn in_memory() -> Self {
        Self::from_parts(Vec::new(), None, None)
    }

    /// Open or create a durable store backed by a JSON-lines log at `path`.
    ///
    /// Committed entries are replayed; the id counter resumes after the
    /// highest persisted id.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let (log, entries) = FeedbackLog::open(path)?;
        Ok(Self::from_parts(entries, Some(log), Some(path.to_path_buf())))
    }

    fn from_parts(
        entries: Vec<FeedbackEntry>,
        log: Option<FeedbackLog>,
        path: Option<PathBuf>,
    ) -> Self {
        let next_id = entries.iter().map(|e| e.id).max().map_or(1, |id| id + 1);
        Self {
            inner: RwLock::new(Inner {
                entries: entries.into_iter().map(Arc::new).collect(),
                next_id,
                log,
            }),
            path,
            taxonomy: Taxonomy::open(),
            top_tags: DEFAULT_TOP_TAGS,
        }
    }

    /// Restrict demographic values according to `taxonomy`.
    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    /// How many tags aggregate reports keep.
    pub fn with_top_tags(mut self, limit: usize) -> Self {
        self.top_tags = limit;
        self
    }

    /// Backing log path, `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Validate, stamp and commit a draft.
    ///
    /// Fails with [`StoreError::Validation`] for bad input and
    /// [`StoreError::Storage`] if the log write fails; in both cases nothing
    /// is committed and the id counter is unchanged.
    pub fn submit(&self, draft: FeedbackDraft) -> Result<FeedbackEntry, StoreError> {
        let draft = self.prepare(draft)?;

        let mut inner = self.write()?;
        let entry = FeedbackEntry::from_draft(inner.next_id, Utc::now(), draft);
        if let Some(log) = inner.log.as_mut() {
            log.append(&entry)?;
        }
        inner.next_id += 1;
        inner.entries.push(Arc::new(entry.clone()));

        info!(
            id = entry.id,
            document = %entry.policy_document_id,
            sentiment = %entry.sentiment_label,
            "feedback committed"
        );
        Ok(entry)
    }

    /// Run the checks `submit` applies to `draft` without committing it.
    pub fn check(&self, draft: &FeedbackDraft) -> Result<(), StoreError> {
        self.prepare(draft.clone()).map(drop)
    }

    fn prepare(&self, draft: FeedbackDraft) -> Result<FeedbackDraft, StoreError> {
        let draft = normalize(draft)?;
        self.taxonomy
            .check_demographics(&draft.demographics)
            .map_err(StoreError::Validation)?;
        Ok(draft)
    }

    /// Snapshot of entries matching `filter`, in insertion order.
    pub fn list(&self, filter: &FeedbackFilter) -> Result<Listing, StoreError> {
        filter.validate()?;
        let snapshot: Arc<[Arc<FeedbackEntry>]> = self.read()?.entries.as_slice().into();
        debug!(entries = snapshot.len(), "listing snapshot taken");
        Ok(Listing {
            snapshot,
            filter: filter.clone(),
        })
    }

    /// Aggregate statistics over entries matching `filter`.
    pub fn aggregate(&self, filter: &FeedbackFilter) -> Result<AggregateReport, StoreError> {
        let listing = self.list(filter)?;
        Ok(AggregateReport::from_entries(listing.iter(), self.top_tags))
    }

    /// Serialise entries matching `filter` in `format`.
    pub fn export(
        &self,
        filter: &FeedbackFilter,
        format: ExportFormat,
    ) -> Result<Vec<u8>, StoreError> {
        let listing = self.list(filter)?;
        let entries: Vec<&FeedbackEntry> = listing.iter().collect();
        let bytes = match format {
            ExportFormat::Csv => export::to_csv(&entries)?,
            ExportFormat::Json => export::to_json(&entries)?,
            #[cfg(feature = "parquet")]
            ExportFormat::Parquet => export::to_parquet(&entries)?,
            ExportFormat::Report => {
                let report = AggregateReport::from_entries(entries.iter().copied(), self.top_tags);
                let focus = self.focus_attribute(&report);
                export::render_report(&report, Utc::now(), focus.as_deref()).into_bytes()
            }
        };
        info!(format = %format, entries = entries.len(), bytes = bytes.len(), "exported feedback");
        Ok(bytes)
    }

    /// Demographic attribute to highlight in reports: the first configured
    /// taxonomy attribute present in `report`, else the first one seen.
    pub fn focus_attribute(&self, report: &AggregateReport) -> Option<String> {
        self.taxonomy
            .demographic_attributes
            .keys()
            .find(|k| report.demographics.contains_key(k.as_str()))
            .or_else(|| report.demographics.keys().next())
            .cloned()
    }

    /// Recommendations for `report`, inspecting `attribute` or, when that is
    /// `None`, the focus attribute.
    pub fn recommendations(&self, report: &AggregateReport, attribute: Option<&str>) -> Vec<String> {
        let focus = attribute
            .map(str::to_string)
            .or_else(|| self.focus_attribute(report));
        report.recommendations(focus.as_deref().unwrap_or_default())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

/// A restartable view over a store snapshot.
///
/// Entries submitted after the snapshot was taken are not included.
#[derive(Clone)]
pub struct Listing {
    snapshot: Arc<[Arc<FeedbackEntry>]>,
    filter: FeedbackFilter,
}

impl Listing {
    /// Lazily yield matching entries in insertion order. May be called
    /// repeatedly; each call starts from the beginning.
    pub fn iter(&self) -> impl Iterator<Item = &FeedbackEntry> + '_ {
        self.snapshot
            .iter()
            .map(|e| e.as_ref())
            .filter(|e| self.filter.matches(e))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn to_vec(&self) -> Vec<FeedbackEntry> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a FeedbackEntry;
    type IntoIter = Box<dyn Iterator<Item = &'a FeedbackEntry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Trim and check a draft before it is stamped.
fn normalize(mut draft: FeedbackDraft) -> Result<FeedbackDraft, StoreError> {
    if draft.free_text.trim().is_empty() {
        return Err(StoreError::Validation(
            "feedback text must not be empty".into(),
        ));
    }
    draft.policy_document_id = draft.policy_document_id.trim().to_string();
    if draft.policy_document_id.is_empty() {
        return Err(StoreError::Validation(
            "policy document id must not be empty".into(),
        ));
    }

    let mut demographics = civic_core::Demographics::new();
    for (key, value) in std::mem::take(&mut draft.demographics) {
        let key = key.trim();
        if key.is_empty() {
            return Err(StoreError::Validation(
                "demographic attribute name must not be empty".into(),
            ));
        }
        let value = value.trim();
        if !value.is_empty() {
            demographics.insert(key.to_string(), value.to_string());
        }
    }
    draft.demographics = demographics;

    draft.category_tags = clean_list(std::mem::take(&mut draft.category_tags))
        .into_iter()
        .collect::<BTreeSet<_>>();
    draft.key_points = clean_list(std::mem::take(&mut draft.key_points));
    draft.submitter = draft
        .submitter
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(draft)
}

/// Trim items, drop empties, and replace the export list separator.
fn clean_list(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().replace(LIST_SEPARATOR, ","))
        .filter(|s| !s.is_empty())
        .collect()
}
