use chrono::{DateTime, Utc};
use serde::Deserialize;

/// An open issue as returned by the GitHub issues endpoint.
/// Only the fields the pipeline snapshots are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    pub number: u64,
    pub title: String,
    /// GitHub returns `null` for issues created without a description
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    pub created_at: DateTime<Utc>,
    #[allow(dead_code)] // Decoded for completeness, not snapshotted
    pub updated_at: Option<DateTime<Utc>>,
    /// Deleted accounts come back as `null`
    #[serde(default)]
    pub user: Option<RawAuthor>,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub html_url: String,
    /// Present only when the "issue" is actually a pull request
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAuthor {
    pub login: String,
}

/// Owner/name pair identifying a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
