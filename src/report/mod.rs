pub mod types;

pub use types::{Item, Report, ReportKind, Section, Tone};

use std::collections::BTreeMap;
use std::path::Path;

use colored::Colorize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::pipeline::apply::{ApplySummary, VerificationReport};
use crate::pipeline::classify::ClassifySummary;
use crate::pipeline::labels::GOOD_FIRST_ISSUE_LABEL;
use crate::store::{ApplyOutcome, AuditEntry, IssueRecord, Metadata, ReviewStatus};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Build the requested store view.
pub fn build(
    kind: ReportKind,
    records: &[IssueRecord],
    meta: &Metadata,
    audit: &[AuditEntry],
) -> Report {
    match kind {
        ReportKind::Progress => progress(records, meta, audit),
        ReportKind::Labels => label_distribution(records),
        ReportKind::Unlabeled => unlabeled(records),
        ReportKind::GoodFirst => good_first(records),
        ReportKind::Triage => triage(records),
    }
}

fn issue_line(record: &IssueRecord) -> String {
    format!("#{} {}", record.number, record.title)
}

fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / whole as f64)
}

fn counted<K: Ord + ToString>(counts: BTreeMap<K, usize>, total: usize) -> Vec<Item> {
    let mut rows: Vec<(K, usize)> = counts.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows.into_iter()
        .map(|(key, n)| Item::new(key.to_string()).detail(format!("{} ({})", n, percent(n, total))))
        .collect()
}

/// Pipeline stage counts, the stored metadata counters and the audit tally.
pub fn progress(records: &[IssueRecord], meta: &Metadata, audit: &[AuditEntry]) -> Report {
    let total = records.len();
    let classified = records.iter().filter(|r| r.is_classified()).count();
    let by_status = |status: ReviewStatus| records.iter().filter(|r| r.review_status == status).count();
    let approved = by_status(ReviewStatus::Approved);
    let applied = by_status(ReviewStatus::Applied);
    let awaiting_review = records
        .iter()
        .filter(|r| r.is_classified() && r.review_status == ReviewStatus::Pending)
        .count();

    let fetched = meta
        .fetched_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    let audit_failed = audit.iter().filter(|e| e.status == ApplyOutcome::Failed).count();

    Report {
        title: "Triage Progress".to_string(),
        summary: vec![
            ("Repository".to_string(), meta.repo.clone().unwrap_or_else(|| "-".to_string())),
            ("Fetched".to_string(), fetched),
            ("Issues".to_string(), total.to_string()),
        ],
        sections: vec![
            Section::new(
                "Pipeline",
                vec![
                    Item::new("Classified").detail(format!("{}/{} ({})", classified, total, percent(classified, total))),
                    Item::new("Unclassified")
                        .detail((total - classified).to_string())
                        .tone(if classified < total { Tone::Warn } else { Tone::Good }),
                    Item::new("Awaiting review").detail(awaiting_review.to_string()),
                    Item::new("Approved, not applied").detail(approved.to_string()),
                    Item::new("Applied").detail(applied.to_string()).tone(Tone::Good),
                ],
            ),
            Section::new(
                "Run counters",
                vec![
                    Item::new("Last chunk offset").detail(meta.last_chunk_offset.to_string()),
                    Item::new("Classified").detail(meta.classified_count.to_string()),
                    Item::new("Reviewed").detail(meta.reviewed_count.to_string()),
                    Item::new("Applied").detail(meta.applied_count.to_string()),
                ],
            ),
            Section::new(
                "Audit log",
                vec![
                    Item::new("Successful attempts").detail((audit.len() - audit_failed).to_string()),
                    Item::new("Failed attempts")
                        .detail(audit_failed.to_string())
                        .tone(if audit_failed > 0 { Tone::Bad } else { Tone::Normal }),
                ],
            ),
        ],
    }
}

/// How often each label is proposed for addition.
pub fn label_distribution(records: &[IssueRecord]) -> Report {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut with_delta = 0usize;
    for delta in records.iter().filter_map(|r| r.proposed_labels.as_ref()) {
        if !delta.add.is_empty() {
            with_delta += 1;
        }
        for label in &delta.add {
            *counts.entry(label.clone()).or_default() += 1;
        }
    }

    Report {
        title: "Proposed Labels".to_string(),
        summary: vec![("Issues with additions".to_string(), with_delta.to_string())],
        sections: vec![Section::new("Label frequency", counted(counts, with_delta))],
    }
}

/// Issues that had no labels at ingestion, with what would be added.
pub fn unlabeled(records: &[IssueRecord]) -> Report {
    let items: Vec<Item> = records
        .iter()
        .filter(|r| r.existing_labels.is_empty())
        .map(|r| {
            let detail = match &r.proposed_labels {
                Some(delta) if !delta.add.is_empty() => format!("+ {}", delta.add.join(", ")),
                Some(_) => "nothing proposed".to_string(),
                None => "not classified".to_string(),
            };
            let tone = if r.is_classified() { Tone::Normal } else { Tone::Warn };
            Item::new(issue_line(r)).detail(detail).tone(tone)
        })
        .collect();

    Report {
        title: "Unlabeled Issues".to_string(),
        summary: vec![("Count".to_string(), items.len().to_string())],
        sections: vec![Section::new("Issues", items)],
    }
}

/// Classified good-first-issue candidates, most confident first.
pub fn good_first(records: &[IssueRecord]) -> Report {
    let mut candidates: Vec<&IssueRecord> = records
        .iter()
        .filter(|r| r.classification.as_ref().is_some_and(|c| c.good_first_issue))
        .collect();
    candidates.sort_by(|a, b| {
        let conf = |r: &IssueRecord| r.classification.as_ref().map_or(0.0, |c| c.confidence);
        conf(*b).total_cmp(&conf(*a))
    });

    let items = candidates
        .iter()
        .map(|r| {
            let c = r.classification.as_ref();
            let modules = c.map(|c| c.modules.join(", ")).unwrap_or_default();
            let confidence = c.map_or(0.0, |c| c.confidence);
            let tone = if r.has_label(GOOD_FIRST_ISSUE_LABEL) { Tone::Good } else { Tone::Normal };
            Item::new(issue_line(r))
                .detail(format!("{:.0}% [{}] {}", confidence * 100.0, modules, r.review_status))
                .tone(tone)
        })
        .collect::<Vec<_>>();

    Report {
        title: "Good First Issue Candidates".to_string(),
        summary: vec![("Candidates".to_string(), items.len().to_string())],
        sections: vec![Section::new("Candidates", items)],
    }
}

/// Bugs with triage flags set, grouped by flag.
pub fn triage(records: &[IssueRecord]) -> Report {
    type Flag = fn(&crate::store::Triage) -> bool;
    let flags: [(&str, Flag); 4] = [
        ("Needs test case", |t| t.needs_test_case),
        ("AI fixable", |t| t.ai_fixable),
        ("Potentially fixed", |t| t.potentially_fixed),
        ("Potentially outdated", |t| t.potentially_outdated),
    ];

    let flagged: Vec<(&IssueRecord, &crate::store::Triage)> = records
        .iter()
        .filter_map(|r| {
            r.classification
                .as_ref()
                .and_then(|c| c.triage.as_ref())
                .filter(|t| t.any_flag())
                .map(|t| (r, t))
        })
        .collect();

    let sections = flags
        .iter()
        .map(|(heading, flag)| {
            let items = flagged
                .iter()
                .filter(|(_, t)| flag(t))
                .map(|(r, t)| {
                    let item = Item::new(issue_line(r));
                    if t.triage_notes.is_empty() {
                        item
                    } else {
                        item.detail(t.triage_notes.clone())
                    }
                })
                .collect();
            Section::new(*heading, items)
        })
        .collect();

    Report {
        title: "Bug Triage".to_string(),
        summary: vec![("Flagged bugs".to_string(), flagged.len().to_string())],
        sections,
    }
}

/// Distribution of classification fields and issue ages.
pub fn stats(records: &[IssueRecord], meta: &Metadata) -> Report {
    let classifications: Vec<_> = records.iter().filter_map(|r| r.classification.as_ref()).collect();
    let classified = classifications.len();

    let mut types = BTreeMap::new();
    let mut impacts = BTreeMap::new();
    let mut severities = BTreeMap::new();
    let mut modules: BTreeMap<String, usize> = BTreeMap::new();
    for c in &classifications {
        *types.entry(c.issue_type).or_default() += 1;
        if let Some(impact) = c.impact {
            *impacts.entry(impact).or_default() += 1;
        }
        if let Some(severity) = c.severity {
            *severities.entry(severity).or_default() += 1;
        }
        for module in &c.modules {
            *modules.entry(module.clone()).or_default() += 1;
        }
    }

    let mean_confidence = if classified == 0 {
        0.0
    } else {
        classifications.iter().map(|c| c.confidence).sum::<f64>() / classified as f64
    };

    let mut ages: BTreeMap<&str, usize> = BTreeMap::new();
    for r in records {
        let bucket = match r.age_days {
            d if d < 30 => "1. under 30 days",
            d if d < 180 => "2. 30-179 days",
            d if d < 365 => "3. 180-364 days",
            _ => "4. a year or more",
        };
        *ages.entry(bucket).or_default() += 1;
    }
    let age_items = ages
        .into_iter()
        .map(|(bucket, n)| Item::new(&bucket[3..]).detail(format!("{} ({})", n, percent(n, records.len()))))
        .collect();

    Report {
        title: "Issue Statistics".to_string(),
        summary: vec![
            ("Issues".to_string(), records.len().to_string()),
            ("Classified".to_string(), classified.to_string()),
            ("Mean confidence".to_string(), format!("{:.2}", mean_confidence)),
            ("Snapshot taken".to_string(), meta.fetched_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())),
        ],
        sections: vec![
            Section::new("Type", counted(types, classified)),
            Section::new("Impact (bugs)", counted(impacts, classified)),
            Section::new("Severity (bugs)", counted(severities, classified)),
            Section::new("Modules", counted(modules, classified)),
            Section::new("Age at ingestion", age_items),
        ],
    }
}

/// Everything known about one record.
pub fn issue_detail(record: &IssueRecord) -> Report {
    let mut summary = vec![
        ("Author".to_string(), record.author.clone()),
        ("Age".to_string(), format!("{} days (at ingestion)", record.age_days)),
        ("Comments".to_string(), record.comment_count.to_string()),
        ("Status".to_string(), record.review_status.to_string()),
        ("Labels".to_string(), if record.existing_labels.is_empty() { "(none)".to_string() } else { record.existing_labels.join(", ") }),
    ];
    if !record.url.is_empty() {
        summary.push(("URL".to_string(), record.url.clone()));
    }
    if let Some(at) = record.applied_at {
        summary.push(("Applied".to_string(), at.to_rfc3339()));
    }

    let mut sections = vec![Section::new("Body", vec![Item::new(record.body_preview.clone())])];

    match &record.classification {
        None => sections.push(Section::new("Classification", vec![Item::new("not classified").tone(Tone::Warn)])),
        Some(c) => {
            let mut items = vec![
                Item::new("Type").detail(c.issue_type.to_string()),
                Item::new("Impact").detail(c.impact.map_or("-".to_string(), |i| i.to_string())),
                Item::new("Severity").detail(c.severity.map_or("-".to_string(), |s| s.to_string())),
                Item::new("Modules").detail(if c.modules.is_empty() { "-".to_string() } else { c.modules.join(", ") }),
                Item::new("Good first issue").detail(c.good_first_issue.to_string()),
                Item::new("Confidence").detail(format!("{:.0}%", c.confidence * 100.0)).tone(if c.confidence < 0.6 {
                    Tone::Warn
                } else {
                    Tone::Normal
                }),
                Item::new("Reasoning").detail(c.reasoning.clone()),
            ];
            if let Some(t) = &c.triage {
                let flags: Vec<&str> = [
                    (t.needs_test_case, "needs test case"),
                    (t.ai_fixable, "ai fixable"),
                    (t.potentially_fixed, "potentially fixed"),
                    (t.potentially_outdated, "potentially outdated"),
                ]
                .iter()
                .filter(|(set, _)| *set)
                .map(|(_, name)| *name)
                .collect();
                items.push(Item::new("Triage").detail(if flags.is_empty() { "-".to_string() } else { flags.join(", ") }));
                if !t.triage_notes.is_empty() {
                    items.push(Item::new("Triage notes").detail(t.triage_notes.clone()));
                }
            }
            sections.push(Section::new("Classification", items));
        }
    }

    if let Some(delta) = &record.proposed_labels {
        let mut items: Vec<Item> = delta.add.iter().map(|l| Item::new(format!("+ {}", l)).tone(Tone::Good)).collect();
        items.extend(delta.remove.iter().map(|l| Item::new(format!("- {}", l)).tone(Tone::Bad)));
        sections.push(Section::new("Proposed labels", items));
    }

    Report {
        title: issue_line(record),
        summary,
        sections,
    }
}

/// End-of-run tally for `classify` and `resume`.
pub fn classify_result(summary: &ClassifySummary) -> Report {
    Report {
        title: "Classification".to_string(),
        summary: vec![
            ("Classified".to_string(), summary.classified.to_string()),
            ("Failed".to_string(), summary.failed.to_string()),
            ("Chunks".to_string(), summary.chunks.to_string()),
            ("Still unclassified".to_string(), format!("{}/{}", summary.remaining, summary.total)),
        ],
        sections: vec![],
    }
}

/// End-of-run tally for `apply`, including the dry-run preview.
pub fn apply_result(summary: &ApplySummary) -> Report {
    let changes = summary
        .planned
        .iter()
        .map(|p| {
            let mut parts = Vec::new();
            if !p.delta.add.is_empty() {
                parts.push(format!("+ {}", p.delta.add.join(", ")));
            }
            if !p.delta.remove.is_empty() {
                parts.push(format!("- {}", p.delta.remove.join(", ")));
            }
            Item::new(format!("#{} {}", p.number, p.title)).detail(parts.join("  "))
        })
        .collect();

    let mut lines = vec![("Selected".to_string(), summary.planned.len().to_string())];
    if summary.dry_run {
        lines.push(("Mode".to_string(), "dry run, nothing changed".to_string()));
    } else {
        lines.push(("Applied".to_string(), summary.applied.to_string()));
        lines.push(("Failed".to_string(), summary.failed.to_string()));
        lines.push(("Batch pauses".to_string(), summary.pauses.to_string()));
    }

    Report {
        title: if summary.dry_run { "Apply (dry run)" } else { "Apply" }.to_string(),
        summary: lines,
        sections: vec![Section::new("Changes", changes)],
    }
}

/// Outcome of a verification sample.
pub fn verification_result(report: &VerificationReport) -> Report {
    let mismatches = report
        .mismatched
        .iter()
        .map(|m| {
            let mut parts = Vec::new();
            if !m.missing_adds.is_empty() {
                parts.push(format!("missing: {}", m.missing_adds.join(", ")));
            }
            if !m.lingering_removes.is_empty() {
                parts.push(format!("still present: {}", m.lingering_removes.join(", ")));
            }
            Item::new(format!("#{}", m.number)).detail(parts.join("; ")).tone(Tone::Bad)
        })
        .collect();
    let failures = report
        .fetch_failures
        .iter()
        .map(|(n, e)| Item::new(format!("#{}", n)).detail(e.clone()).tone(Tone::Warn))
        .collect();

    Report {
        title: "Verification".to_string(),
        summary: vec![
            ("Sampled".to_string(), report.sampled.to_string()),
            ("Verified".to_string(), report.verified.len().to_string()),
            ("Mismatched".to_string(), report.mismatched.len().to_string()),
            ("Fetch failures".to_string(), report.fetch_failures.len().to_string()),
        ],
        sections: vec![
            Section::new("Mismatches", mismatches),
            Section::new("Fetch failures", failures),
        ],
    }
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(title = %report.title))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

/// Print the report to the terminal with colors.
pub fn print_terminal_report(report: &Report) {
    println!();
    println!("{}", report.title.bold());
    for (key, value) in &report.summary {
        println!("{}: {}", key.dimmed(), value);
    }
    println!();

    for section in &report.sections {
        println!("═══ {} ═══", section.heading);
        if section.items.is_empty() {
            println!("  None.");
        }
        for item in &section.items {
            let text = colorize(&item.text, item.tone);
            match &item.detail {
                Some(detail) => println!("  • {} {}", text, detail.dimmed()),
                None => println!("  • {}", text),
            }
        }
        println!();
    }
}

/// Write the report as a markdown file.
fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    let mut md = String::new();
    md.push_str(&format!("# {}\n\n", report.title));
    for (key, value) in &report.summary {
        md.push_str(&format!("- **{}:** {}\n", key, value));
    }
    if !report.summary.is_empty() {
        md.push('\n');
    }

    for section in &report.sections {
        md.push_str(&format!("## {}\n\n", section.heading));
        if section.items.is_empty() {
            md.push_str("None.\n\n");
            continue;
        }
        for item in &section.items {
            match &item.detail {
                Some(detail) => md.push_str(&format!("- {}: {}\n", item.text, detail)),
                None => md.push_str(&format!("- {}\n", item.text)),
            }
        }
        md.push('\n');
    }

    std::fs::write(path, md)?;
    Ok(())
}

fn colorize(text: &str, tone: Tone) -> colored::ColoredString {
    match tone {
        Tone::Normal => text.normal(),
        Tone::Good => text.green(),
        Tone::Warn => text.yellow(),
        Tone::Bad => text.red().bold(),
    }
}
