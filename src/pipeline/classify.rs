use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::labels::attach_classification;
use super::parse::{parse_classification, snippet};
use super::prompt::build_prompt;
use super::PipelineError;
use crate::oracle::Oracle;
use crate::store::{Classification, IssueRecord, MetadataPatch, Store};

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub chunk_size: usize,
    /// Pause between consecutive oracle calls within a chunk
    pub rate_limit: Duration,
    pub max_output_tokens: u32,
}

/// Result of one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub classified: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Rate-limit pauses taken; one fewer than the oracle calls made
    pub pauses: usize,
    /// Exclusive end index of the processed range
    pub end: usize,
}

/// Cumulative result of a `classify_all` or `resume` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifySummary {
    pub classified: usize,
    pub failed: usize,
    pub chunks: usize,
    pub total: usize,
    /// Records still lacking a classification after the run
    pub remaining: usize,
}

/// Drives the oracle over the canonical record order.
pub struct Classifier<'a> {
    store: &'a Store,
    oracle: &'a dyn Oracle,
    options: ClassifyOptions,
}

impl<'a> Classifier<'a> {
    pub fn new(store: &'a Store, oracle: &'a dyn Oracle, options: ClassifyOptions) -> Self {
        Self {
            store,
            oracle,
            options,
        }
    }

    fn chunk_size(&self) -> usize {
        self.options.chunk_size.max(1)
    }

    /// Ask the oracle about one record. Failures are logged and yield `None`.
    #[instrument(skip(self, record), fields(issue = record.number))]
    pub async fn classify_one(&self, record: &IssueRecord) -> Option<Classification> {
        let prompt = build_prompt(record);
        let response = match self
            .oracle
            .complete(&prompt, self.options.max_output_tokens)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "oracle call failed; leaving issue unclassified");
                return None;
            }
        };

        match parse_classification(&response) {
            Ok(classification) => {
                debug!(
                    issue_type = %classification.issue_type,
                    confidence = classification.confidence,
                    "classified"
                );
                Some(classification)
            }
            Err(e) => {
                warn!(error = %e, response = %snippet(&response), "unusable oracle response");
                None
            }
        }
    }

    /// Classify records in `[start, min(start + chunk_size, total))`.
    ///
    /// Already-classified records are skipped without an oracle call. Each
    /// success is persisted before the next call, so an interruption loses at
    /// most the in-flight issue. Afterwards the cursor moves to the chunk end and
    /// the classified counter grows by this chunk's successes.
    #[instrument(skip(self))]
    pub async fn classify_chunk(
        &self,
        start: usize,
        chunk_size: usize,
    ) -> Result<ChunkOutcome, PipelineError> {
        let mut records = self.store.load_all()?;
        let total = records.len();
        let start = start.min(total);
        let end = start.saturating_add(chunk_size.max(1)).min(total);

        let mut outcome = ChunkOutcome {
            end,
            ..ChunkOutcome::default()
        };
        let mut calls = 0usize;

        for idx in start..end {
            if records[idx].is_classified() {
                outcome.skipped += 1;
                continue;
            }

            if calls > 0 && !self.options.rate_limit.is_zero() {
                tokio::time::sleep(self.options.rate_limit).await;
                outcome.pauses += 1;
            }
            calls += 1;

            match self.classify_one(&records[idx]).await {
                Some(classification) => {
                    attach_classification(&mut records[idx], classification);
                    self.store.save_all(&records)?;
                    outcome.classified += 1;
                }
                None => outcome.failed += 1,
            }
        }

        let meta = self.store.load_metadata()?;
        self.store.patch_metadata(MetadataPatch {
            last_chunk_offset: Some(end),
            classified_count: Some(meta.classified_count + outcome.classified),
            ..MetadataPatch::default()
        })?;

        info!(
            start,
            end,
            classified = outcome.classified,
            failed = outcome.failed,
            skipped = outcome.skipped,
            pauses = outcome.pauses,
            "chunk complete"
        );
        Ok(outcome)
    }

    /// Classify every unclassified record, chunk by chunk.
    ///
    /// Each chunk starts at the first unclassified record at or after the end of
    /// the previous one, so records that fail are left for a later run rather
    /// than retried in a loop. A fully classified store makes no oracle calls.
    #[instrument(skip(self))]
    pub async fn classify_all(&self) -> Result<ClassifySummary, PipelineError> {
        let mut summary = ClassifySummary::default();
        let mut position = 0usize;

        loop {
            let records = self.store.load_all()?;
            summary.total = records.len();

            let Some(start) = first_unclassified(&records, position) else {
                break;
            };

            let outcome = self.classify_chunk(start, self.chunk_size()).await?;
            summary.classified += outcome.classified;
            summary.failed += outcome.failed;
            summary.chunks += 1;
            position = outcome.end;

            info!(
                processed = position,
                total = summary.total,
                classified = summary.classified,
                failed = summary.failed,
                "classification progress"
            );

            if position >= summary.total {
                break;
            }
        }

        summary.remaining = self
            .store
            .load_all()?
            .iter()
            .filter(|r| !r.is_classified())
            .count();
        Ok(summary)
    }

    /// Continue an interrupted run.
    ///
    /// The stored cursor is reported but not trusted: the scan restarts from the
    /// first unclassified record, which is correct even if the cursor and the
    /// records disagree.
    pub async fn resume(&self) -> Result<ClassifySummary, PipelineError> {
        let meta = self.store.load_metadata()?;
        info!(
            cursor = meta.last_chunk_offset,
            total = meta.total_issues,
            "resuming classification"
        );
        self.classify_all().await
    }
}

fn first_unclassified(records: &[IssueRecord], from: usize) -> Option<usize> {
    records
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, r)| !r.is_classified())
        .map(|(idx, _)| idx)
}
