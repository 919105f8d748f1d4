use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issue category assigned by the classifier. Doubles as the tracker label name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueType {
    #[serde(rename = "bug")]
    Bug,
    #[serde(rename = "enhancement")]
    Enhancement,
    #[serde(rename = "feature request")]
    FeatureRequest,
}

impl IssueType {
    pub const ALL: [IssueType; 3] = [
        IssueType::Bug,
        IssueType::Enhancement,
        IssueType::FeatureRequest,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            IssueType::Bug => "bug",
            IssueType::Enhancement => "enhancement",
            IssueType::FeatureRequest => "feature request",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Bug impact. Only meaningful when the type is [`IssueType::Bug`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Impact {
    High,
    Low,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Impact::High => write!(f, "High"),
            Impact::Low => write!(f, "Low"),
        }
    }
}

/// Bug severity. Only meaningful when the type is [`IssueType::Bug`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Major,
    Minor,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Major => write!(f, "Major"),
            Severity::Minor => write!(f, "Minor"),
        }
    }
}

/// Bug-only triage flags plus free-text notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Triage {
    pub needs_test_case: bool,
    pub ai_fixable: bool,
    pub potentially_fixed: bool,
    pub potentially_outdated: bool,
    #[serde(default)]
    pub triage_notes: String,
}

impl Triage {
    pub fn any_flag(&self) -> bool {
        self.needs_test_case || self.ai_fixable || self.potentially_fixed || self.potentially_outdated
    }
}

/// Structured classification produced by the oracle (or revised in review).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub impact: Option<Impact>,
    pub severity: Option<Severity>,
    #[serde(default)]
    pub modules: Vec<String>,
    pub good_first_issue: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub triage: Option<Triage>,
}

/// Label delta to push to the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedLabels {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl ProposedLabels {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Persisted review state. Skips are never stored; a skipped record stays `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Applied,
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewStatus::Pending => write!(f, "pending"),
            ReviewStatus::Approved => write!(f, "approved"),
            ReviewStatus::Applied => write!(f, "applied"),
        }
    }
}

/// One tracked issue and its full pipeline state.
///
/// Snapshot fields (`title` through `existing_labels`) are captured at ingestion
/// and never refreshed; `age_days` is frozen at that moment too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    pub body_preview: String,
    pub created_at: DateTime<Utc>,
    pub age_days: i64,
    pub author: String,
    pub comment_count: u64,
    #[serde(default)]
    pub url: String,
    pub existing_labels: Vec<String>,
    pub classification: Option<Classification>,
    pub proposed_labels: Option<ProposedLabels>,
    #[serde(default)]
    pub review_status: ReviewStatus,
    pub applied_at: Option<DateTime<Utc>>,
}

impl IssueRecord {
    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.existing_labels.iter().any(|l| l == label)
    }
}

/// Run-cycle progress document. Replaced on ingestion, patched by later stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub repo: Option<String>,
    pub total_issues: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Where the last classification chunk ended. Progress reporting only.
    pub last_chunk_offset: usize,
    pub classified_count: usize,
    pub reviewed_count: usize,
    pub applied_count: usize,
}

/// Partial metadata update. `Some` fields overwrite, `None` fields keep the stored value.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub last_chunk_offset: Option<usize>,
    pub classified_count: Option<usize>,
    pub reviewed_count: Option<usize>,
    pub applied_count: Option<usize>,
}

impl MetadataPatch {
    pub fn merge_into(self, meta: &mut Metadata) {
        if let Some(v) = self.last_chunk_offset {
            meta.last_chunk_offset = v;
        }
        if let Some(v) = self.classified_count {
            meta.classified_count = v;
        }
        if let Some(v) = self.reviewed_count {
            meta.reviewed_count = v;
        }
        if let Some(v) = self.applied_count {
            meta.applied_count = v;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    Success,
    Failed,
}

/// One line of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub issue_number: u64,
    pub labels_added: Vec<String>,
    pub labels_removed: Vec<String>,
    pub status: ApplyOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_type_serializes_as_label() {
        let json = serde_json::to_string(&IssueType::FeatureRequest).unwrap();
        assert_eq!(json, "\"feature request\"");
        assert_eq!(IssueType::Bug.to_string(), "bug");
    }

    #[test]
    fn test_review_status_lowercase() {
        let status: ReviewStatus = serde_json::from_str("\"approved\"").unwrap();
        assert_eq!(status, ReviewStatus::Approved);
        assert_eq!(ReviewStatus::default(), ReviewStatus::Pending);
    }

    #[test]
    fn test_metadata_patch_keeps_absent_fields() {
        let mut meta = Metadata {
            total_issues: 10,
            classified_count: 4,
            reviewed_count: 2,
            ..Metadata::default()
        };
        MetadataPatch {
            classified_count: Some(6),
            last_chunk_offset: Some(8),
            ..MetadataPatch::default()
        }
        .merge_into(&mut meta);

        assert_eq!(meta.classified_count, 6);
        assert_eq!(meta.last_chunk_offset, 8);
        assert_eq!(meta.reviewed_count, 2);
        assert_eq!(meta.total_issues, 10);
    }

    #[test]
    fn test_null_classification_distinct_from_empty_modules() {
        let classification = Classification {
            issue_type: IssueType::Enhancement,
            impact: None,
            severity: None,
            modules: vec![],
            good_first_issue: false,
            confidence: 0.5,
            reasoning: "r".to_string(),
            triage: None,
        };
        let value = serde_json::to_value(&classification).unwrap();
        assert_eq!(value["modules"], serde_json::json!([]));
        assert!(value["triage"].is_null());
    }

    #[test]
    fn test_audit_entry_omits_error_on_success() {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            issue_number: 3,
            labels_added: vec!["bug".to_string()],
            labels_removed: vec![],
            status: ApplyOutcome::Success,
            error: None,
        };
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("\"status\":\"success\""));
        assert!(!line.contains("error"));
    }
}
