//! In-memory tracker used by pipeline tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;

use super::types::{RawAuthor, RawIssue, RawLabel};
use super::{Tracker, TrackerError};

#[derive(Default)]
pub struct FakeTracker {
    pub issues: Vec<RawIssue>,
    pub labels: Mutex<BTreeMap<u64, Vec<String>>>,
    pub fail_add: HashSet<u64>,
    pub fail_remove: HashSet<u64>,
    pub fail_fetch: HashSet<u64>,
    pub fail_list: bool,
    pub remote_count: Option<usize>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeTracker {
    pub fn with_issues(numbers: &[u64]) -> Self {
        Self {
            issues: numbers.iter().map(|n| raw_issue(*n)).collect(),
            ..Self::default()
        }
    }

    pub fn set_labels(&self, number: u64, labels: &[&str]) {
        self.labels
            .lock()
            .unwrap()
            .insert(number, labels.iter().map(|l| l.to_string()).collect());
    }

    pub fn labels_of(&self, number: u64) -> Vec<String> {
        self.labels.lock().unwrap().get(&number).cloned().unwrap_or_default()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejected(number: u64) -> TrackerError {
        TrackerError::UnexpectedStatus {
            number,
            status: StatusCode::FORBIDDEN,
        }
    }
}

pub fn raw_issue(number: u64) -> RawIssue {
    RawIssue {
        number,
        title: format!("Issue {}", number),
        body: Some("Steps to reproduce".to_string()),
        labels: vec![],
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        updated_at: None,
        user: Some(RawAuthor {
            login: "octocat".to_string(),
        }),
        comments: 1,
        html_url: format!("https://github.com/vaadin/flow/issues/{}", number),
        pull_request: None,
    }
}

pub fn with_labels(mut issue: RawIssue, labels: &[&str]) -> RawIssue {
    issue.labels = labels
        .iter()
        .map(|l| RawLabel {
            name: l.to_string(),
        })
        .collect();
    issue
}

#[async_trait]
impl Tracker for FakeTracker {
    fn repo(&self) -> String {
        "vaadin/flow".to_string()
    }

    async fn list_open_issues(&self, cap: usize) -> Result<Vec<RawIssue>, TrackerError> {
        self.record("list".to_string());
        if self.fail_list {
            return Err(TrackerError::InvalidRepo("vaadin/flow".to_string()));
        }
        Ok(self.issues.iter().take(cap).cloned().collect())
    }

    async fn open_issue_count(&self) -> Result<usize, TrackerError> {
        Ok(self.remote_count.unwrap_or(self.issues.len()))
    }

    async fn get_issue_labels(&self, number: u64) -> Result<Vec<String>, TrackerError> {
        self.record(format!("get {}", number));
        if self.fail_fetch.contains(&number) {
            return Err(Self::rejected(number));
        }
        Ok(self.labels_of(number))
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.record(format!("add {} {:?}", number, labels));
        if self.fail_add.contains(&number) {
            return Err(Self::rejected(number));
        }
        let mut map = self.labels.lock().unwrap();
        let current = map.entry(number).or_default();
        for label in labels {
            if !current.contains(label) {
                current.push(label.clone());
            }
        }
        Ok(())
    }

    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.record(format!("remove {} {:?}", number, labels));
        if self.fail_remove.contains(&number) {
            return Err(Self::rejected(number));
        }
        let mut map = self.labels.lock().unwrap();
        if let Some(current) = map.get_mut(&number) {
            current.retain(|l| !labels.contains(l));
        }
        Ok(())
    }
}
