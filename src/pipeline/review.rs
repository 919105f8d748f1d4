use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Select};
use tracing::{debug, info, instrument};

use super::labels::derive_proposed_labels;
use super::PipelineError;
use crate::report;
use crate::store::{Impact, IssueRecord, IssueType, MetadataPatch, ReviewStatus, Severity, Store};

/// Operator corrections applied before approval. `None` keeps the oracle's value;
/// for impact and severity `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub issue_type: Option<IssueType>,
    pub impact: Option<Option<Impact>>,
    pub severity: Option<Option<Severity>>,
    pub good_first_issue: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approve,
    Modify(Overrides),
    Skip,
    Quit,
}

/// Source of review decisions, one record at a time.
pub trait Reviewer {
    /// `position` is zero-based within a queue of `queue_len` records.
    fn decide(
        &mut self,
        record: &IssueRecord,
        position: usize,
        queue_len: usize,
    ) -> Result<Decision, PipelineError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub queued: usize,
    /// Plain approvals plus modified approvals
    pub approved: usize,
    pub modified: usize,
    pub skipped: usize,
    pub quit: bool,
}

/// Indices of records awaiting review: classified, still `pending`, at or after
/// `start_from` in canonical order, optionally limited to one issue.
pub fn build_queue(records: &[IssueRecord], start_from: usize, only_issue: Option<u64>) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .skip(start_from)
        .filter(|(_, r)| r.is_classified() && r.review_status == ReviewStatus::Pending)
        .filter(|(_, r)| only_issue.map_or(true, |n| r.number == n))
        .map(|(idx, _)| idx)
        .collect()
}

/// Apply operator overrides and recompute the label delta.
/// Records without a classification are left untouched.
pub fn apply_overrides(record: &mut IssueRecord, overrides: &Overrides) {
    let Some(classification) = record.classification.as_mut() else {
        return;
    };
    if let Some(issue_type) = overrides.issue_type {
        classification.issue_type = issue_type;
    }
    if let Some(impact) = overrides.impact {
        classification.impact = impact;
    }
    if let Some(severity) = overrides.severity {
        classification.severity = severity;
    }
    if let Some(flag) = overrides.good_first_issue {
        classification.good_first_issue = flag;
    }
    record.proposed_labels = Some(derive_proposed_labels(classification, &record.existing_labels));
}

/// Run one review session over the queue.
///
/// Approvals (plain or modified) are persisted immediately. Skips leave the
/// record `pending`; quitting stops the session without undoing earlier
/// decisions. The reviewed counter grows once, by this session's approvals.
#[instrument(skip(store, reviewer))]
pub fn run_review(
    store: &Store,
    reviewer: &mut dyn Reviewer,
    start_from: usize,
    only_issue: Option<u64>,
) -> Result<ReviewSummary, PipelineError> {
    let mut records = store.load_all()?;
    if let Some(number) = only_issue {
        if !records.iter().any(|r| r.number == number) {
            return Err(PipelineError::IssueNotFound(number));
        }
    }

    let queue = build_queue(&records, start_from, only_issue);
    let mut summary = ReviewSummary {
        queued: queue.len(),
        ..ReviewSummary::default()
    };
    info!(queued = queue.len(), "starting review session");

    for (position, &idx) in queue.iter().enumerate() {
        let decision = reviewer.decide(&records[idx], position, queue.len())?;
        debug!(issue = records[idx].number, ?decision, "review decision");

        match decision {
            Decision::Approve => {
                records[idx].review_status = ReviewStatus::Approved;
            }
            Decision::Modify(overrides) => {
                apply_overrides(&mut records[idx], &overrides);
                records[idx].review_status = ReviewStatus::Approved;
                summary.modified += 1;
            }
            Decision::Skip => {
                summary.skipped += 1;
                continue;
            }
            Decision::Quit => {
                summary.quit = true;
                break;
            }
        }

        store.save_all(&records)?;
        summary.approved += 1;
    }

    let meta = store.load_metadata()?;
    store.patch_metadata(MetadataPatch {
        reviewed_count: Some(meta.reviewed_count + summary.approved),
        ..MetadataPatch::default()
    })?;

    info!(
        approved = summary.approved,
        modified = summary.modified,
        skipped = summary.skipped,
        quit = summary.quit,
        "review session finished"
    );
    Ok(summary)
}

/// Interactive reviewer prompting on the terminal.
pub struct TerminalReviewer {
    theme: ColorfulTheme,
}

impl TerminalReviewer {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    fn prompt_overrides(&self, record: &IssueRecord) -> Result<Overrides, PipelineError> {
        let Some(current) = record.classification.as_ref() else {
            return Ok(Overrides::default());
        };

        let type_labels: Vec<&str> = IssueType::ALL.iter().map(|t| t.label()).collect();
        let type_default = IssueType::ALL
            .iter()
            .position(|t| *t == current.issue_type)
            .unwrap_or(0);
        let type_idx = Select::with_theme(&self.theme)
            .with_prompt("Type")
            .default(type_default)
            .items(&type_labels)
            .interact()?;
        let issue_type = IssueType::ALL[type_idx];

        let (impact, severity) = if issue_type == IssueType::Bug {
            let impact_options = [Some(Impact::High), Some(Impact::Low), None];
            let impact_idx = Select::with_theme(&self.theme)
                .with_prompt("Impact")
                .default(impact_options.iter().position(|o| *o == current.impact).unwrap_or(2))
                .items(&["High", "Low", "(none)"])
                .interact()?;

            let severity_options = [Some(Severity::Major), Some(Severity::Minor), None];
            let severity_idx = Select::with_theme(&self.theme)
                .with_prompt("Severity")
                .default(severity_options.iter().position(|o| *o == current.severity).unwrap_or(2))
                .items(&["Major", "Minor", "(none)"])
                .interact()?;

            (impact_options[impact_idx], severity_options[severity_idx])
        } else {
            (None, None)
        };

        let good_first_issue = Confirm::with_theme(&self.theme)
            .with_prompt("Good first issue?")
            .default(current.good_first_issue)
            .interact()?;

        Ok(Overrides {
            issue_type: Some(issue_type),
            impact: Some(impact),
            severity: Some(severity),
            good_first_issue: Some(good_first_issue),
        })
    }
}

impl Default for TerminalReviewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reviewer for TerminalReviewer {
    fn decide(
        &mut self,
        record: &IssueRecord,
        position: usize,
        queue_len: usize,
    ) -> Result<Decision, PipelineError> {
        println!();
        println!("{}", format!("── Review {}/{} ──", position + 1, queue_len).bold());
        report::print_terminal_report(&report::issue_detail(record));

        let choice = Select::with_theme(&self.theme)
            .with_prompt("Decision")
            .default(0)
            .items(&["Approve", "Modify", "Skip", "Quit"])
            .interact()?;

        Ok(match choice {
            0 => Decision::Approve,
            1 => Decision::Modify(self.prompt_overrides(record)?),
            2 => Decision::Skip,
            _ => Decision::Quit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::labels::attach_classification;
    use crate::store::tests::{temp_store, test_classification, test_record};
    use std::collections::VecDeque;

    /// Replays a fixed list of decisions, then skips.
    struct ScriptedReviewer {
        decisions: VecDeque<Decision>,
        seen: Vec<u64>,
    }

    impl ScriptedReviewer {
        fn new(decisions: Vec<Decision>) -> Self {
            Self {
                decisions: decisions.into(),
                seen: Vec::new(),
            }
        }
    }

    impl Reviewer for ScriptedReviewer {
        fn decide(&mut self, record: &IssueRecord, _: usize, _: usize) -> Result<Decision, PipelineError> {
            self.seen.push(record.number);
            Ok(self.decisions.pop_front().unwrap_or(Decision::Skip))
        }
    }

    fn classified(number: u64, issue_type: IssueType) -> IssueRecord {
        let mut record = test_record(number);
        attach_classification(&mut record, test_classification(issue_type));
        record
    }

    fn seed(store: &Store) {
        let mut approved = classified(3, IssueType::Bug);
        approved.review_status = ReviewStatus::Approved;
        store
            .save_all(&[
                classified(1, IssueType::Bug),
                test_record(2),
                approved,
                classified(4, IssueType::Enhancement),
                classified(5, IssueType::FeatureRequest),
            ])
            .unwrap();
    }

    #[test]
    fn test_queue_filters_and_start_index() {
        let (_dir, store) = temp_store();
        seed(&store);
        let records = store.load_all().unwrap();

        assert_eq!(build_queue(&records, 0, None), vec![0, 3, 4]);
        assert_eq!(build_queue(&records, 1, None), vec![3, 4]);
        assert_eq!(build_queue(&records, 0, Some(4)), vec![3]);
        assert!(build_queue(&records, 0, Some(3)).is_empty());
    }

    #[test]
    fn test_approve_skip_quit() {
        let (_dir, store) = temp_store();
        seed(&store);
        let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve, Decision::Skip, Decision::Quit]);

        let summary = run_review(&store, &mut reviewer, 0, None).unwrap();
        assert_eq!(summary.queued, 3);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.quit);

        let records = store.load_all().unwrap();
        assert_eq!(records[0].review_status, ReviewStatus::Approved);
        assert_eq!(records[3].review_status, ReviewStatus::Pending);
        assert_eq!(records[4].review_status, ReviewStatus::Pending);
        assert_eq!(store.load_metadata().unwrap().reviewed_count, 1);
    }

    #[test]
    fn test_skipped_records_reappear() {
        let (_dir, store) = temp_store();
        seed(&store);
        let mut first = ScriptedReviewer::new(vec![Decision::Skip, Decision::Skip, Decision::Skip]);
        run_review(&store, &mut first, 0, None).unwrap();

        let mut second = ScriptedReviewer::new(vec![]);
        run_review(&store, &mut second, 0, None).unwrap();
        assert_eq!(second.seen, vec![1, 4, 5]);
    }

    #[test]
    fn test_modify_recomputes_delta() {
        let (_dir, store) = temp_store();
        let mut record = classified(8, IssueType::Enhancement);
        record.existing_labels = vec!["bug".to_string()];
        store.save_all(&[record]).unwrap();

        let mut reviewer = ScriptedReviewer::new(vec![Decision::Modify(Overrides {
            issue_type: Some(IssueType::Bug),
            impact: Some(Some(Impact::Low)),
            severity: Some(Some(Severity::Minor)),
            good_first_issue: Some(true),
        })]);
        let summary = run_review(&store, &mut reviewer, 0, None).unwrap();
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.modified, 1);

        let record = &store.load_all().unwrap()[0];
        assert_eq!(record.review_status, ReviewStatus::Approved);
        let delta = record.proposed_labels.as_ref().unwrap();
        assert_eq!(delta.add, vec!["Impact: Low", "Severity: Minor", "Good First Issue"]);
        assert!(delta.remove.is_empty());
    }

    #[test]
    fn test_reviewed_counter_accumulates_across_sessions() {
        let (_dir, store) = temp_store();
        seed(&store);
        store
            .patch_metadata(MetadataPatch {
                reviewed_count: Some(10),
                ..MetadataPatch::default()
            })
            .unwrap();

        let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve, Decision::Approve]);
        run_review(&store, &mut reviewer, 0, None).unwrap();
        assert_eq!(store.load_metadata().unwrap().reviewed_count, 12);
    }

    #[test]
    fn test_unknown_issue_is_an_error() {
        let (_dir, store) = temp_store();
        seed(&store);
        let mut reviewer = ScriptedReviewer::new(vec![]);
        assert!(matches!(
            run_review(&store, &mut reviewer, 0, Some(99)),
            Err(PipelineError::IssueNotFound(99))
        ));
    }

    #[test]
    fn test_overrides_ignore_unclassified() {
        let mut record = test_record(1);
        apply_overrides(
            &mut record,
            &Overrides {
                good_first_issue: Some(true),
                ..Overrides::default()
            },
        );
        assert!(record.classification.is_none());
        assert!(record.proposed_labels.is_none());
    }
}
