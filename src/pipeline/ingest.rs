use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::PipelineError;
use crate::store::{IssueRecord, Metadata, ReviewStatus, Store};
use crate::tracker::{RawIssue, Tracker};

/// Upper bound on issues pulled in one ingestion.
pub const ISSUE_CAP: usize = 5000;

/// Body previews are clipped to this many characters.
pub const BODY_PREVIEW_CHARS: usize = 500;

const TRUNCATION_MARKER: &str = "...";
const UNKNOWN_AUTHOR: &str = "unknown";

/// Local vs remote open-issue counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountCheck {
    pub local: usize,
    pub remote: usize,
}

impl CountCheck {
    pub fn matches(&self) -> bool {
        self.local == self.remote
    }
}

/// Clip `body` to [`BODY_PREVIEW_CHARS`] characters, marking the cut.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_CHARS {
        return body.to_string();
    }
    let mut clipped: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    clipped.push_str(TRUNCATION_MARKER);
    clipped
}

/// Snapshot one tracker issue into a fresh, unclassified record.
pub fn normalize_issue(raw: RawIssue, now: DateTime<Utc>) -> IssueRecord {
    let age_days = (now - raw.created_at).num_days().max(0);
    IssueRecord {
        number: raw.number,
        title: raw.title,
        body_preview: truncate_body(raw.body.as_deref().unwrap_or_default()),
        created_at: raw.created_at,
        age_days,
        author: raw
            .user
            .map(|u| u.login)
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        comment_count: raw.comments,
        url: raw.html_url,
        existing_labels: raw.labels.into_iter().map(|l| l.name).collect(),
        classification: None,
        proposed_labels: None,
        review_status: ReviewStatus::Pending,
        applied_at: None,
    }
}

/// Replace the record store with the tracker's current open issues.
///
/// Destructive: all classification, review and apply progress is discarded and
/// metadata is reset. Returns the number of records written.
pub async fn ingest(tracker: &dyn Tracker, store: &Store) -> Result<usize, PipelineError> {
    ingest_at(tracker, store, Utc::now()).await
}

#[instrument(skip(tracker, store), fields(repo = %tracker.repo()))]
pub async fn ingest_at(
    tracker: &dyn Tracker,
    store: &Store,
    now: DateTime<Utc>,
) -> Result<usize, PipelineError> {
    let raw = tracker.list_open_issues(ISSUE_CAP).await?;
    if raw.is_empty() {
        warn!("no issues found");
        return Ok(0);
    }
    if raw.len() >= ISSUE_CAP {
        warn!(cap = ISSUE_CAP, "issue cap reached; later issues were not fetched");
    }

    let mut records: Vec<IssueRecord> = raw.into_iter().map(|r| normalize_issue(r, now)).collect();
    records.sort_by_key(|r| r.number);
    store.save_all(&records)?;

    store.save_metadata(&Metadata {
        repo: Some(tracker.repo()),
        total_issues: records.len(),
        fetched_at: Some(now),
        ..Metadata::default()
    })?;

    info!(count = records.len(), "ingested open issues");
    Ok(records.len())
}

/// Compare the stored record count with the tracker's live open-issue count.
/// Reports only; nothing is corrected.
#[instrument(skip(tracker, store), fields(repo = %tracker.repo()))]
pub async fn verify_count(tracker: &dyn Tracker, store: &Store) -> Result<CountCheck, PipelineError> {
    let local = store.load_all()?.len();
    let remote = tracker.open_issue_count().await?;
    let check = CountCheck { local, remote };
    if check.matches() {
        info!(local, remote, "issue count matches tracker");
    } else {
        warn!(local, remote, "issue count drift detected");
    }
    Ok(check)
}
