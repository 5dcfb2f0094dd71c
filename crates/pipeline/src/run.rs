//! Batch runner: walks the library, drives each candidate through the
//! orchestrator, and accounts for the outcome.
//!
//! Candidates are processed strictly one at a time. The time budget is
//! checked between candidates only; an in-flight encode always finishes.

use crate::budget::TimeBudget;
use crate::filter::{collect_candidates, Candidate, FilterError};
use crate::ledger::Ledger;
use crate::task::{run_task, TaskError, TaskState};
use hevc_recode_config::Config;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Error type for a batch run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The root path does not exist or is not a directory.
    #[error("Invalid root directory: {0}")]
    InvalidRoot(String),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Counters accumulated over one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Files that passed the candidate filter.
    pub candidates: usize,
    /// Originals replaced (or placed beside, in keep-original mode).
    pub replaced: usize,
    /// Encodes discarded because the output was not smaller.
    pub retained_larger: usize,
    /// Fast-path skips on byte rate.
    pub fast_skipped: usize,
    /// Skips after sampling projected insufficient benefit.
    pub skipped_insufficient: usize,
    /// Estimation, encode, or validation failures (ledgered, never retried).
    pub failures: usize,
    /// Environmental errors (replacement or ledger IO). Not ledgered, so
    /// these candidates are retried on a future run.
    pub retriable: usize,
    /// Candidates left unprocessed when the time budget ran out.
    pub deferred: usize,
    /// Bytes saved across all replacements.
    pub bytes_saved: u64,
}

impl RunSummary {
    fn record(&mut self, candidate: &Candidate, state: &TaskState) {
        match state {
            TaskState::Replaced { output_bytes, .. } => {
                self.replaced += 1;
                self.bytes_saved += candidate.size_bytes.saturating_sub(*output_bytes);
            }
            TaskState::RetainedLarger { .. } => self.retained_larger += 1,
            TaskState::FastSkipped { .. } => self.fast_skipped += 1,
            TaskState::SkippedInsufficientBenefit { .. } => self.skipped_insufficient += 1,
            TaskState::EstimationFailed(_)
            | TaskState::EncodeFailed(_)
            | TaskState::DurationRejected { .. } => self.failures += 1,
            _ => {}
        }
    }
}

/// Folds one candidate's outcome into the summary. Terminal states count
/// under their own buckets; environmental errors are not ledgered and count
/// as retriable.
fn record_outcome(
    summary: &mut RunSummary,
    candidate: &Candidate,
    result: Result<TaskState, TaskError>,
) {
    match result {
        Ok(state) => summary.record(candidate, &state),
        Err(TaskError::Replace(e)) => {
            warn!(path = %candidate.path.display(), error = %e, "replacement failed, will retry next run");
            summary.retriable += 1;
        }
        Err(TaskError::Ledger(e)) => {
            warn!(path = %candidate.path.display(), error = %e, "ledger write failed, will retry next run");
            summary.retriable += 1;
        }
    }
}

fn validate_root(root: &Path) -> Result<(), RunError> {
    if !root.is_dir() {
        return Err(RunError::InvalidRoot(root.display().to_string()));
    }
    Ok(())
}

/// Lists the candidate queue without encoding, sampling, or writing ledgers.
pub async fn dry_run(root: &Path, config: &Config) -> Result<RunSummary, RunError> {
    validate_root(root)?;

    let mut ledger = Ledger::new();
    let candidates = collect_candidates(root, config, &mut ledger).await?;

    for candidate in &candidates {
        info!(
            path = %candidate.path.display(),
            size_bytes = candidate.size_bytes,
            codec = candidate.info.codec.as_deref().unwrap_or("unknown"),
            "would encode"
        );
    }

    Ok(RunSummary {
        candidates: candidates.len(),
        ..Default::default()
    })
}

/// Runs the batch to completion (or budget exhaustion).
pub async fn run_batch(root: &Path, config: &Config) -> Result<RunSummary, RunError> {
    validate_root(root)?;

    let mut ledger = Ledger::new();
    let candidates = collect_candidates(root, config, &mut ledger).await?;
    info!(count = candidates.len(), root = %root.display(), "candidate queue built");

    let budget = TimeBudget::new(config.behavior.time_budget_hours);
    let mut summary = RunSummary {
        candidates: candidates.len(),
        ..Default::default()
    };

    for (index, candidate) in candidates.iter().enumerate() {
        if budget.exhausted() {
            summary.deferred = candidates.len() - index;
            info!(
                deferred = summary.deferred,
                elapsed_secs = budget.elapsed().as_secs(),
                "time budget exhausted, deferring remaining candidates"
            );
            break;
        }

        let result = run_task(candidate, config, &mut ledger).await;
        record_outcome(&mut summary, candidate, result);
    }

    info!(
        replaced = summary.replaced,
        retained_larger = summary.retained_larger,
        fast_skipped = summary.fast_skipped,
        skipped_insufficient = summary.skipped_insufficient,
        failures = summary.failures,
        retriable = summary.retriable,
        deferred = summary.deferred,
        bytes_saved = summary.bytes_saved,
        "batch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MediaInfo;
    use std::fs::File;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_candidate(size_bytes: u64) -> Candidate {
        Candidate {
            path: PathBuf::from("/m/film.mkv"),
            size_bytes,
            info: MediaInfo {
                codec: Some("h264".to_string()),
                duration_secs: Some(5400),
                width: Some(1920),
                height: Some(1080),
            },
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_invalid() {
        let result = run_batch(Path::new("/no/such/dir"), &Config::default()).await;
        assert!(matches!(result, Err(RunError::InvalidRoot(_))));
    }

    #[tokio::test]
    async fn test_file_root_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir.mkv");
        File::create(&file).unwrap();

        let result = run_batch(&file, &Config::default()).await;
        assert!(matches!(result, Err(RunError::InvalidRoot(_))));
    }

    #[tokio::test]
    async fn test_empty_root_completes_with_empty_summary() {
        let temp_dir = TempDir::new().unwrap();
        let summary = run_batch(temp_dir.path(), &Config::default())
            .await
            .unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("film.mkv")).unwrap();

        let summary = dry_run(temp_dir.path(), &Config::default()).await.unwrap();

        // The tiny file is excluded by the size predicate, and no list
        // files appear.
        assert_eq!(summary.candidates, 0);
        assert!(!temp_dir.path().join("encoded.list").exists());
        assert!(!temp_dir.path().join("failed.list").exists());
    }

    #[test]
    fn test_summary_records_savings() {
        let mut summary = RunSummary::default();
        let candidate = make_candidate(1_000_000_000);

        summary.record(
            &candidate,
            &TaskState::Replaced {
                final_path: PathBuf::from("/m/film.mkv"),
                output_bytes: 600_000_000,
            },
        );

        assert_eq!(summary.replaced, 1);
        assert_eq!(summary.bytes_saved, 400_000_000);
    }

    #[test]
    fn test_summary_counts_by_terminal_state() {
        let mut summary = RunSummary::default();
        let candidate = make_candidate(1_000_000_000);

        summary.record(&candidate, &TaskState::FastSkipped { byte_rate: 100 });
        summary.record(
            &candidate,
            &TaskState::SkippedInsufficientBenefit {
                estimated_bytes: 900,
                threshold_bytes: 800,
            },
        );
        summary.record(
            &candidate,
            &TaskState::RetainedLarger {
                output_bytes: 2_000_000_000,
            },
        );
        summary.record(&candidate, &TaskState::EstimationFailed("x".to_string()));
        summary.record(&candidate, &TaskState::EncodeFailed("x".to_string()));
        summary.record(
            &candidate,
            &TaskState::DurationRejected {
                original_secs: 5400,
                encoded_secs: Some(100),
            },
        );

        assert_eq!(summary.fast_skipped, 1);
        assert_eq!(summary.skipped_insufficient, 1);
        assert_eq!(summary.retained_larger, 1);
        assert_eq!(summary.failures, 3);
        assert_eq!(summary.bytes_saved, 0);
    }

    #[test]
    fn test_environmental_errors_counted_separately_from_failures() {
        use crate::ledger::LedgerError;
        use crate::replace::ReplaceError;
        use std::io::{Error, ErrorKind};

        let mut summary = RunSummary::default();
        let candidate = make_candidate(1_000_000_000);

        record_outcome(
            &mut summary,
            &candidate,
            Err(TaskError::Replace(ReplaceError::PlaceFailed(Error::new(
                ErrorKind::Other,
                "disk full",
            )))),
        );
        record_outcome(
            &mut summary,
            &candidate,
            Err(TaskError::Ledger(LedgerError::Io {
                path: PathBuf::from("/m/encoded.list"),
                source: Error::new(ErrorKind::PermissionDenied, "read-only"),
            })),
        );
        record_outcome(
            &mut summary,
            &candidate,
            Ok(TaskState::EncodeFailed("x".to_string())),
        );

        // Retry-next-run errors never land in the permanent failure count.
        assert_eq!(summary.retriable, 2);
        assert_eq!(summary.failures, 1);
    }
}
