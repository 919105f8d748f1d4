use crate::store::{Classification, IssueRecord, IssueType, ProposedLabels};

pub const GOOD_FIRST_ISSUE_LABEL: &str = "Good First Issue";

pub fn impact_label(impact: impl std::fmt::Display) -> String {
    format!("Impact: {}", impact)
}

pub fn severity_label(severity: impl std::fmt::Display) -> String {
    format!("Severity: {}", severity)
}

/// Labels a classification implies that the issue doesn't already carry.
///
/// Nothing is ever proposed for removal here; `remove` is always empty.
pub fn derive_proposed_labels(
    classification: &Classification,
    existing_labels: &[String],
) -> ProposedLabels {
    let mut add = Vec::new();
    let mut push = |label: String| {
        if !existing_labels.contains(&label) && !add.contains(&label) {
            add.push(label);
        }
    };

    push(classification.issue_type.label().to_string());

    if classification.issue_type == IssueType::Bug {
        if let Some(impact) = classification.impact {
            push(impact_label(impact));
        }
        if let Some(severity) = classification.severity {
            push(severity_label(severity));
        }
    }

    if classification.good_first_issue {
        push(GOOD_FIRST_ISSUE_LABEL.to_string());
    }

    ProposedLabels {
        add,
        remove: Vec::new(),
    }
}

/// Set `classification` and its derived delta together so neither is ever
/// present without the other.
pub fn attach_classification(record: &mut IssueRecord, classification: Classification) {
    record.proposed_labels = Some(derive_proposed_labels(
        &classification,
        &record.existing_labels,
    ));
    record.classification = Some(classification);
}
