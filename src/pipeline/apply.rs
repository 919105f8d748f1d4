use std::time::Duration;

use chrono::Utc;
use rand::seq::IndexedRandom;
use tracing::{info, instrument, warn};

use super::PipelineError;
use crate::store::{
    ApplyOutcome, AuditEntry, IssueRecord, MetadataPatch, ProposedLabels, ReviewStatus, Store,
};
use crate::tracker::Tracker;

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub dry_run: bool,
    /// Records per batch; a pause follows every full batch
    pub batch_size: usize,
    pub batch_delay: Duration,
}

/// A label change that is (or would be) pushed to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub number: u64,
    pub title: String,
    pub delta: ProposedLabels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub dry_run: bool,
    pub planned: Vec<PlannedChange>,
    pub applied: usize,
    pub failed: usize,
    /// Inter-batch pauses taken
    pub pauses: usize,
}

/// Approved records whose delta has something to add or remove, in collection order.
pub fn select_for_apply(records: &[IssueRecord]) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.review_status == ReviewStatus::Approved)
        .filter(|(_, r)| r.proposed_labels.as_ref().is_some_and(|d| !d.is_empty()))
        .map(|(idx, _)| idx)
        .collect()
}

/// Push approved label deltas to the tracker.
///
/// A record becomes `applied` only when every tracker call for it succeeds;
/// otherwise it stays `approved` and is retried on the next run. Every attempt
/// appends one audit entry. The collection is saved at each batch boundary and
/// once at the end.
#[instrument(skip(tracker, store), fields(repo = %tracker.repo()))]
pub async fn apply(
    tracker: &dyn Tracker,
    store: &Store,
    options: &ApplyOptions,
) -> Result<ApplySummary, PipelineError> {
    let mut records = store.load_all()?;
    let selected = select_for_apply(&records);
    let batch_size = options.batch_size.max(1);

    let mut summary = ApplySummary {
        dry_run: options.dry_run,
        planned: selected
            .iter()
            .map(|&idx| PlannedChange {
                number: records[idx].number,
                title: records[idx].title.clone(),
                delta: records[idx].proposed_labels.clone().unwrap_or_default(),
            })
            .collect(),
        ..ApplySummary::default()
    };

    if options.dry_run {
        info!(selected = selected.len(), "dry run; no changes made");
        return Ok(summary);
    }

    for (position, &idx) in selected.iter().enumerate() {
        if position > 0 && position % batch_size == 0 {
            store.save_all(&records)?;
            summary.pauses += 1;
            info!(
                done = position,
                total = selected.len(),
                delay_ms = options.batch_delay.as_millis() as u64,
                "batch complete; pausing"
            );
            if !options.batch_delay.is_zero() {
                tokio::time::sleep(options.batch_delay).await;
            }
        }

        let number = records[idx].number;
        let delta = records[idx].proposed_labels.clone().unwrap_or_default();
        let mut errors = Vec::new();

        if !delta.add.is_empty() {
            if let Err(e) = tracker.add_labels(number, &delta.add).await {
                warn!(issue = number, error = %e, "adding labels failed");
                errors.push(format!("add: {}", e));
            }
        }
        if !delta.remove.is_empty() {
            if let Err(e) = tracker.remove_labels(number, &delta.remove).await {
                warn!(issue = number, error = %e, "removing labels failed");
                errors.push(format!("remove: {}", e));
            }
        }

        let now = Utc::now();
        let status = if errors.is_empty() {
            records[idx].review_status = ReviewStatus::Applied;
            records[idx].applied_at = Some(now);
            summary.applied += 1;
            ApplyOutcome::Success
        } else {
            summary.failed += 1;
            ApplyOutcome::Failed
        };

        store.append_audit(&AuditEntry {
            timestamp: now,
            issue_number: number,
            labels_added: delta.add,
            labels_removed: delta.remove,
            status,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        })?;
    }

    store.save_all(&records)?;
    let meta = store.load_metadata()?;
    store.patch_metadata(MetadataPatch {
        applied_count: Some(meta.applied_count + summary.applied),
        ..MetadataPatch::default()
    })?;

    info!(
        applied = summary.applied,
        failed = summary.failed,
        "apply finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub number: u64,
    pub missing_adds: Vec<String>,
    pub lingering_removes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub sampled: usize,
    pub verified: Vec<u64>,
    pub mismatched: Vec<Mismatch>,
    pub fetch_failures: Vec<(u64, String)>,
}

/// Compare an intended delta with the labels observed on the tracker.
/// Labels outside the delta are irrelevant.
pub fn check_labels(number: u64, delta: &ProposedLabels, remote: &[String]) -> Option<Mismatch> {
    let missing_adds: Vec<String> = delta
        .add
        .iter()
        .filter(|l| !remote.contains(l))
        .cloned()
        .collect();
    let lingering_removes: Vec<String> = delta
        .remove
        .iter()
        .filter(|l| remote.contains(l))
        .cloned()
        .collect();

    if missing_adds.is_empty() && lingering_removes.is_empty() {
        None
    } else {
        Some(Mismatch {
            number,
            missing_adds,
            lingering_removes,
        })
    }
}

/// Re-read a random sample of applied records from the tracker and report drift.
/// Read-only: nothing is corrected.
#[instrument(skip(tracker, store), fields(repo = %tracker.repo()))]
pub async fn verify(
    tracker: &dyn Tracker,
    store: &Store,
    sample_size: usize,
) -> Result<VerificationReport, PipelineError> {
    let records = store.load_all()?;
    let applied: Vec<&IssueRecord> = records
        .iter()
        .filter(|r| r.review_status == ReviewStatus::Applied)
        .collect();

    let mut sample: Vec<&IssueRecord> = {
        let mut rng = rand::rng();
        applied.choose_multiple(&mut rng, sample_size).copied().collect()
    };
    sample.sort_by_key(|r| r.number);

    let mut report = VerificationReport {
        sampled: sample.len(),
        ..VerificationReport::default()
    };

    for record in sample {
        let remote = match tracker.get_issue_labels(record.number).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(issue = record.number, error = %e, "could not fetch labels");
                report.fetch_failures.push((record.number, e.to_string()));
                continue;
            }
        };

        let delta = record.proposed_labels.clone().unwrap_or_default();
        match check_labels(record.number, &delta, &remote) {
            None => report.verified.push(record.number),
            Some(mismatch) => {
                warn!(
                    issue = record.number,
                    missing = ?mismatch.missing_adds,
                    lingering = ?mismatch.lingering_removes,
                    "remote labels differ from applied delta"
                );
                report.mismatched.push(mismatch);
            }
        }
    }

    info!(
        sampled = report.sampled,
        verified = report.verified.len(),
        mismatched = report.mismatched.len(),
        fetch_failures = report.fetch_failures.len(),
        "verification finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::labels::attach_classification;
    use crate::store::tests::{temp_store, test_classification, test_record};
    use crate::store::IssueType;
    use crate::tracker::fake::FakeTracker;

    fn approved(number: u64, add: &[&str], remove: &[&str]) -> IssueRecord {
        let mut record = test_record(number);
        attach_classification(&mut record, test_classification(IssueType::Bug));
        record.proposed_labels = Some(ProposedLabels {
            add: add.iter().map(|s| s.to_string()).collect(),
            remove: remove.iter().map(|s| s.to_string()).collect(),
        });
        record.review_status = ReviewStatus::Approved;
        record
    }

    fn live(batch_size: usize) -> ApplyOptions {
        ApplyOptions {
            dry_run: false,
            batch_size,
            batch_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_successful_apply() {
        let (_dir, store) = temp_store();
        store.save_all(&[approved(1, &["bug"], &["needs triage"])]).unwrap();
        let tracker = FakeTracker::default();
        tracker.set_labels(1, &["needs triage"]);

        let summary = apply(&tracker, &store, &live(10)).await.unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.failed, 0);

        let record = &store.load_all().unwrap()[0];
        assert_eq!(record.review_status, ReviewStatus::Applied);
        assert!(record.applied_at.is_some());
        assert_eq!(tracker.labels_of(1), vec!["bug"]);

        let audit = store.load_audit().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, ApplyOutcome::Success);
        assert_eq!(store.load_metadata().unwrap().applied_count, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_stays_approved() {
        let (_dir, store) = temp_store();
        store.save_all(&[approved(7, &["bug"], &["invalid"])]).unwrap();
        let mut tracker = FakeTracker::default();
        tracker.fail_add.insert(7);

        let summary = apply(&tracker, &store, &live(10)).await.unwrap();
        assert_eq!(summary.applied, 0);
        assert_eq!(summary.failed, 1);
        assert!(tracker.call_log().iter().any(|c| c.starts_with("remove 7")));

        let record = &store.load_all().unwrap()[0];
        assert_eq!(record.review_status, ReviewStatus::Approved);
        assert!(record.applied_at.is_none());

        let audit = store.load_audit().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, ApplyOutcome::Failed);
        assert!(audit[0].error.as_deref().unwrap().starts_with("add:"));
        assert_eq!(store.load_metadata().unwrap().applied_count, 0);
    }

    #[tokio::test]
    async fn test_failed_record_retried_next_run() {
        let (_dir, store) = temp_store();
        store.save_all(&[approved(7, &["bug"], &[])]).unwrap();
        let mut flaky = FakeTracker::default();
        flaky.fail_add.insert(7);
        apply(&flaky, &store, &live(10)).await.unwrap();

        let healthy = FakeTracker::default();
        let summary = apply(&healthy, &store, &live(10)).await.unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(store.load_audit().unwrap().len(), 2);
        assert_eq!(store.load_all().unwrap()[0].review_status, ReviewStatus::Applied);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let (_dir, store) = temp_store();
        store.save_all(&[approved(1, &["bug"], &[])]).unwrap();
        let tracker = FakeTracker::default();

        let summary = apply(
            &tracker,
            &store,
            &ApplyOptions {
                dry_run: true,
                ..live(10)
            },
        )
        .await
        .unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.planned.len(), 1);
        assert_eq!(summary.applied, 0);
        assert_eq!(summary.failed, 0);
        assert!(tracker.call_log().is_empty());
        assert!(store.load_audit().unwrap().is_empty());
        assert_eq!(store.load_all().unwrap()[0].review_status, ReviewStatus::Approved);
    }

    #[tokio::test]
    async fn test_selection_skips_empty_and_unapproved() {
        let (_dir, store) = temp_store();
        let mut pending = approved(2, &["bug"], &[]);
        pending.review_status = ReviewStatus::Pending;
        store
            .save_all(&[approved(1, &[], &[]), pending, approved(3, &[], &["wontfix"])])
            .unwrap();

        let records = store.load_all().unwrap();
        assert_eq!(select_for_apply(&records), vec![2]);
    }

    #[tokio::test]
    async fn test_batch_pauses_keyed_on_selection_position() {
        let (_dir, store) = temp_store();
        let mut records = vec![test_record(1)];
        records.extend((2..=6).map(|n| approved(n, &["bug"], &[])));
        store.save_all(&records).unwrap();
        let tracker = FakeTracker::default();

        let summary = apply(&tracker, &store, &live(2)).await.unwrap();
        assert_eq!(summary.applied, 5);
        assert_eq!(summary.pauses, 2);
    }

    #[tokio::test]
    async fn test_single_batch_never_pauses() {
        let (_dir, store) = temp_store();
        store
            .save_all(&[approved(1, &["bug"], &[]), approved(2, &["bug"], &[])])
            .unwrap();
        let summary = apply(&FakeTracker::default(), &store, &live(2)).await.unwrap();
        assert_eq!(summary.pauses, 0);
    }

    #[test]
    fn test_check_labels_ignores_unrelated() {
        let delta = ProposedLabels {
            add: vec!["X".to_string()],
            remove: vec!["Y".to_string()],
        };
        let remote = vec!["X".to_string(), "Z".to_string()];
        assert_eq!(check_labels(1, &delta, &remote), None);
    }

    #[test]
    fn test_check_labels_reports_both_directions() {
        let delta = ProposedLabels {
            add: vec!["X".to_string()],
            remove: vec!["Y".to_string()],
        };
        let mismatch = check_labels(4, &delta, &["Y".to_string()]).unwrap();
        assert_eq!(mismatch.missing_adds, vec!["X"]);
        assert_eq!(mismatch.lingering_removes, vec!["Y"]);
    }

    #[tokio::test]
    async fn test_verify_sample() {
        let (_dir, store) = temp_store();
        let mut ok = approved(1, &["X"], &["Y"]);
        ok.review_status = ReviewStatus::Applied;
        let mut drifted = approved(2, &["X"], &[]);
        drifted.review_status = ReviewStatus::Applied;
        let mut unreachable = approved(3, &["X"], &[]);
        unreachable.review_status = ReviewStatus::Applied;
        store
            .save_all(&[ok, drifted, unreachable, approved(4, &["X"], &[])])
            .unwrap();

        let mut tracker = FakeTracker::default();
        tracker.fail_fetch.insert(3);
        tracker.set_labels(1, &["X", "Z"]);
        tracker.set_labels(2, &["Z"]);

        let report = verify(&tracker, &store, 10).await.unwrap();
        assert_eq!(report.sampled, 3);
        assert_eq!(report.verified, vec![1]);
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].number, 2);
        assert_eq!(report.fetch_failures.len(), 1);
        assert_eq!(report.fetch_failures[0].0, 3);
        assert!(!tracker.call_log().iter().any(|c| c.starts_with("add")));
    }

    #[tokio::test]
    async fn test_verify_sample_size_caps() {
        let (_dir, store) = temp_store();
        let records: Vec<IssueRecord> = (1..=6)
            .map(|n| {
                let mut r = approved(n, &["bug"], &[]);
                r.review_status = ReviewStatus::Applied;
                r
            })
            .collect();
        store.save_all(&records).unwrap();

        let report = verify(&FakeTracker::default(), &store, 2).await.unwrap();
        assert_eq!(report.sampled, 2);
        assert_eq!(report.mismatched.len(), 2);
    }
}
