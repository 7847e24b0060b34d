//! Append-only JSON-lines log backing a durable [`FeedbackStore`](crate::FeedbackStore).
//!
//! One committed entry per line. A line is committed once it has been
//! written in full, newline included, and `sync_data` has returned.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use civic_core::FeedbackEntry;
use tracing::{info, warn};

use crate::StoreError;

pub(crate) struct FeedbackLog {
    path: PathBuf,
    file: File,
    /// Byte length of the committed prefix.
    len: u64,
    /// Set when a failed append could not be rolled back; the file may end
    /// in a partial line, so nothing more is appended until reopen.
    poisoned: bool,
    /// Test hook: write only this many bytes of the next line, then fail.
    #[cfg(test)]
    pub(crate) fail_after: Option<usize>,
    /// Test hook: make the next rollback fail.
    #[cfg(test)]
    pub(crate) fail_rollback: bool,
}

impl FeedbackLog {
    /// Open or create the log and replay its committed entries.
    ///
    /// A torn final line (crash mid-append) is truncated away. Anything
    /// unparsable before the final line is reported as corruption.
    pub(crate) fn open(path: &Path) -> Result<(Self, Vec<FeedbackEntry>), StoreError> {
        let storage = |source| StoreError::Storage {
            path: path.to_path_buf(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(storage)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw).map_err(storage)?;

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0usize;
        let mut committed = 0usize;
        let mut needs_newline = false;

        for (idx, segment) in raw.split_inclusive(|b| *b == b'\n').enumerate() {
            let line_no = idx + 1;
            let terminated = segment.ends_with(b"\n");
            let body = if terminated {
                &segment[..segment.len() - 1]
            } else {
                segment
            };
            let start = offset;
            offset += segment.len();

            if body.iter().all(|b| b.is_ascii_whitespace()) {
                committed = offset;
                continue;
            }

            match serde_json::from_slice::<FeedbackEntry>(body) {
                Ok(entry) => {
                    if !seen.insert(entry.id) {
                        return Err(StoreError::Corrupt {
                            path: path.to_path_buf(),
                            line: line_no,
                            reason: format!("duplicate id {}", entry.id),
                        });
                    }
                    entries.push(entry);
                    committed = offset;
                    needs_newline = !terminated;
                }
                Err(e) if !terminated => {
                    warn!(
                        path = %path.display(),
                        line = line_no,
                        bytes = segment.len(),
                        error = %e,
                        "discarding torn final line in feedback log"
                    );
                    committed = start;
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        path: path.to_path_buf(),
                        line: line_no,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if committed < raw.len() {
            file.set_len(committed as u64).map_err(storage)?;
        }
        let mut len = committed as u64;
        if needs_newline {
            file.write_all(b"\n").map_err(storage)?;
            len += 1;
        }
        file.sync_data().map_err(storage)?;

        info!(path = %path.display(), entries = entries.len(), "opened feedback log");
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len,
                poisoned: false,
                #[cfg(test)]
                fail_after: None,
                #[cfg(test)]
                fail_rollback: false,
            },
            entries,
        ))
    }

    /// Append one entry. On failure the log is cut back to its previous
    /// length so no partial line survives. If that rollback fails too, the
    /// log refuses further appends until it is reopened, where the partial
    /// line is discarded as a torn tail.
    pub(crate) fn append(&mut self, entry: &FeedbackEntry) -> Result<(), StoreError> {
        if self.poisoned {
            return Err(StoreError::Storage {
                path: self.path.clone(),
                source: std::io::Error::other(
                    "feedback log has an unrolled partial write; reopen the store",
                ),
            });
        }

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        if let Err(source) = self.write_line(&line) {
            if let Err(e) = self.rollback() {
                self.poisoned = true;
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to roll back partial append; log closed for writes"
                );
            }
            return Err(StoreError::Storage {
                path: self.path.clone(),
                source,
            });
        }

        self.len += line.len() as u64;
        Ok(())
    }

    fn rollback(&mut self) -> std::io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_rollback) {
            return Err(std::io::Error::other("injected rollback failure"));
        }
        self.file.set_len(self.len)
    }

    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.fail_after.take() {
            self.file.write_all(&line[..n.min(line.len())])?;
            return Err(std::io::Error::other("injected write failure"));
        }
        self.file.write_all(line)?;
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use civic_core::{FeedbackDraft, SentimentLabel};

    fn entry(id: u64, text: &str) -> FeedbackEntry {
        FeedbackEntry::from_draft(
            id,
            Utc::now(),
            FeedbackDraft::new("doc-1", text, SentimentLabel::Neutral),
        )
    }

    #[test]
    fn append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");

        let (mut log, entries) = FeedbackLog::open(&path).unwrap();
        assert!(entries.is_empty());
        log.append(&entry(1, "first")).unwrap();
        log.append(&entry(2, "second")).unwrap();
        drop(log);

        let (_, entries) = FeedbackLog::open(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].free_text, "second");
    }

    #[test]
    fn torn_final_line_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let mut good = serde_json::to_vec(&entry(1, "kept")).unwrap();
        good.push(b'\n');
        let committed_len = good.len() as u64;
        good.extend_from_slice(br#"{"id":2,"timestamp":"2026-"#);
        std::fs::write(&path, &good).unwrap();

        let (_, entries) = FeedbackLog::open(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_len);
    }

    #[test]
    fn complete_line_missing_newline_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        std::fs::write(&path, serde_json::to_vec(&entry(1, "kept")).unwrap()).unwrap();

        let (mut log, entries) = FeedbackLog::open(&path).unwrap();
        assert_eq!(entries.len(), 1);
        log.append(&entry(2, "next")).unwrap();
        drop(log);

        let (_, entries) = FeedbackLog::open(&path).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let mut raw = b"not json\n".to_vec();
        raw.extend(serde_json::to_vec(&entry(1, "after")).unwrap());
        raw.push(b'\n');
        std::fs::write(&path, &raw).unwrap();

        let err = FeedbackLog::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn duplicate_ids_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let mut raw = Vec::new();
        for text in ["a", "b"] {
            raw.extend(serde_json::to_vec(&entry(1, text)).unwrap());
            raw.push(b'\n');
        }
        std::fs::write(&path, &raw).unwrap();

        let err = FeedbackLog::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { line: 2, .. }));
    }

    #[test]
    fn failed_append_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let (mut log, _) = FeedbackLog::open(&path).unwrap();
        log.append(&entry(1, "first")).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();

        log.fail_after = Some(10);
        let err = log.append(&entry(2, "second")).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len);

        log.append(&entry(2, "second")).unwrap();
        drop(log);
        let (_, entries) = FeedbackLog::open(&path).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn failed_rollback_blocks_appends_until_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let (mut log, _) = FeedbackLog::open(&path).unwrap();
        log.append(&entry(1, "first")).unwrap();

        log.fail_after = Some(10);
        log.fail_rollback = true;
        assert!(log.append(&entry(2, "second")).is_err());

        // The partial line is still on disk; nothing may be glued onto it.
        let err = log.append(&entry(2, "second")).unwrap_err();
        assert!(matches!(err, StoreError::Storage { .. }));
        drop(log);

        let (mut log, entries) = FeedbackLog::open(&path).unwrap();
        assert_eq!(entries.len(), 1);
        log.append(&entry(2, "second")).unwrap();
        drop(log);
        let (_, entries) = FeedbackLog::open(&path).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("feedback.jsonl");
        let err = FeedbackLog::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Storage { .. }));
    }
}
