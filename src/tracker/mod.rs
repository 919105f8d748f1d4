#[cfg(test)]
pub mod fake;
pub mod types;

pub use types::{RawIssue, RepoRef};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

const GITHUB_API: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const USER_AGENT: &str = "issue-triage";

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid repository reference: {0}")]
    InvalidRepo(String),

    #[error("GitHub token not found in config or environment")]
    MissingToken,

    #[error("GitHub returned {status} for issue #{number}")]
    UnexpectedStatus { number: u64, status: StatusCode },
}

/// Remote issue tracker the pipeline reads from and writes labels back to.
///
/// Label mutations must be idempotent: adding a label that is already present
/// or removing one that is already gone succeeds.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// `owner/name` of the tracked repository.
    fn repo(&self) -> String;

    /// All open issues (pull requests excluded), at most `cap`.
    async fn list_open_issues(&self, cap: usize) -> Result<Vec<RawIssue>, TrackerError>;

    /// Live count of open issues, used for drift detection.
    async fn open_issue_count(&self) -> Result<usize, TrackerError>;

    /// Current label names on one issue.
    async fn get_issue_labels(&self, number: u64) -> Result<Vec<String>, TrackerError>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError>;

    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError>;
}

/// Parse a repository reference into owner and name.
///
/// Accepts `owner/name` or a full `https://github.com/owner/name` URL.
pub fn parse_repo(input: &str) -> Result<RepoRef, TrackerError> {
    let invalid = || TrackerError::InvalidRepo(input.to_string());

    let path = if input.contains("://") {
        let parsed = Url::parse(input).map_err(|_| invalid())?;
        if parsed.host_str() != Some("github.com") {
            return Err(invalid());
        }
        parsed.path().to_string()
    } else {
        input.to_string()
    };

    let segments: Vec<_> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 2 {
        return Err(invalid());
    }

    Ok(RepoRef {
        owner: segments[0].to_string(),
        name: segments[1].trim_end_matches(".git").to_string(),
    })
}

/// [`Tracker`] backed by the GitHub REST API.
pub struct GitHubTracker {
    client: Client,
    repo: RepoRef,
    token: Option<String>,
    base_url: String,
}

impl GitHubTracker {
    pub fn new(repo: RepoRef, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            repo,
            token,
            base_url: GITHUB_API.to_string(),
        }
    }

    fn issue_url(&self, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}",
            self.base_url, self.repo.owner, self.repo.name, number
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn require_token(&self) -> Result<(), TrackerError> {
        self.token.as_ref().map(|_| ()).ok_or(TrackerError::MissingToken)
    }
}

#[derive(Deserialize)]
struct LabelName {
    name: String,
}

#[derive(Deserialize)]
struct SearchCount {
    total_count: usize,
}

#[async_trait]
impl Tracker for GitHubTracker {
    fn repo(&self) -> String {
        self.repo.to_string()
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn list_open_issues(&self, cap: usize) -> Result<Vec<RawIssue>, TrackerError> {
        let url = format!(
            "{}/repos/{}/{}/issues",
            self.base_url, self.repo.owner, self.repo.name
        );
        let mut issues = Vec::new();
        let mut page = 1usize;

        loop {
            debug!(page, "fetching issue page");
            let batch = self
                .authed(self.client.get(&url))
                .query(&[
                    ("state", "open".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<RawIssue>>()
                .await?;

            let fetched = batch.len();
            issues.extend(batch.into_iter().filter(|i| i.pull_request.is_none()));

            if fetched < PER_PAGE || issues.len() >= cap {
                break;
            }
            page += 1;
        }

        issues.truncate(cap);
        debug!(count = issues.len(), pages = page, "fetched open issues");
        Ok(issues)
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn open_issue_count(&self) -> Result<usize, TrackerError> {
        let query = format!("repo:{} is:issue is:open", self.repo);
        let count = self
            .authed(self.client.get(format!("{}/search/issues", self.base_url)))
            .query(&[("q", query.as_str()), ("per_page", "1")])
            .send()
            .await?
            .error_for_status()?
            .json::<SearchCount>()
            .await?;
        Ok(count.total_count)
    }

    async fn get_issue_labels(&self, number: u64) -> Result<Vec<String>, TrackerError> {
        let labels = self
            .authed(self.client.get(format!("{}/labels", self.issue_url(number))))
            .query(&[("per_page", PER_PAGE)])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<LabelName>>()
            .await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.require_token()?;
        self.authed(self.client.post(format!("{}/labels", self.issue_url(number))))
            .json(&serde_json::json!({ "labels": labels }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.require_token()?;
        for label in labels {
            let mut url = Url::parse(&format!("{}/labels", self.issue_url(number)))
                .map_err(|_| TrackerError::InvalidRepo(self.repo.to_string()))?;
            url.path_segments_mut()
                .map_err(|_| TrackerError::InvalidRepo(self.repo.to_string()))?
                .push(label);

            let response = self.authed(self.client.delete(url)).send().await?;
            match response.status() {
                // Label already absent
                StatusCode::NOT_FOUND => debug!(label = %label, "label not present"),
                status if status.is_success() => {}
                status => return Err(TrackerError::UnexpectedStatus { number, status }),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_repo() {
        let repo = parse_repo("vaadin/flow").unwrap();
        assert_eq!(repo.owner, "vaadin");
        assert_eq!(repo.name, "flow");
    }

    #[test]
    fn test_parse_repo_url() {
        let repo = parse_repo("https://github.com/vaadin/flow.git").unwrap();
        assert_eq!(repo.owner, "vaadin");
        assert_eq!(repo.name, "flow");
    }

    #[test]
    fn test_parse_invalid_repo() {
        assert!(parse_repo("https://example.com/vaadin/flow").is_err());
        assert!(parse_repo("flow").is_err());
        assert!(parse_repo("https://github.com/vaadin/flow/issues/1").is_err());
    }

    #[tokio::test]
    async fn test_mutations_require_token() {
        let tracker = GitHubTracker::new(parse_repo("vaadin/flow").unwrap(), None);
        let err = tracker
            .add_labels(1, &["bug".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::MissingToken));
    }
}
