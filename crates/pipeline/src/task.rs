//! Encode orchestrator: drives one candidate through the pipeline.
//!
//! Each candidate moves through an explicit state machine:
//!
//! ```text
//! Discovered -> FastSkipped
//!            | Sampling -> EstimationFailed
//!                        | SkippedInsufficientBenefit
//!                        | FullEncoding -> EncodeFailed
//!                                        | EncodeSucceeded
//!                                          -> DurationValidating -> DurationRejected
//!                                                                 | DurationValidated
//!                                                                   -> SizeComparing -> Replaced
//!                                                                                    | RetainedLarger
//! ```
//!
//! Every terminal state resolves into exactly one ledger write: `encoded`
//! for the resolved-no-action and success outcomes, `failed` for the error
//! outcomes. Temp outputs are removed on every non-replacing path.

use crate::encode::{
    classify_encode, output_extension, quality_for_width, run_ffmpeg, EncodeParams, EncodeVerdict,
};
use crate::estimate::{estimate_candidate, Estimate};
use crate::filter::Candidate;
use crate::ledger::{Disposition, Ledger, LedgerError};
use crate::probe::probe_duration;
use crate::replace::{apply_replacement, ReplaceError, ReplaceMode};
use hevc_recode_config::{BehaviorConfig, Config};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Accepted absolute difference between source and output durations, in
/// integer-truncated seconds. Guards against silent truncation in the
/// encoder path.
pub const DURATION_TOLERANCE_SECS: u64 = 2;

/// Error type for orchestration.
///
/// Only environmental failures surface here; every encoder-side failure is
/// folded into a terminal state and resolved locally. A replacement failure
/// deliberately produces no ledger write, so the candidate is retried on a
/// future run instead of being permanently skipped over a filesystem hiccup.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Replace(#[from] ReplaceError),
}

/// State of one candidate as it moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Passed the candidate filter; nothing decided yet.
    Discovered,
    /// Fast path: average byte rate already below the minimum.
    FastSkipped { byte_rate: u64 },
    /// Probe encodes in progress.
    Sampling,
    /// A sample encode failed; no partial estimate is trusted.
    EstimationFailed(String),
    /// Projected size reduction below the configured ratio.
    SkippedInsufficientBenefit {
        estimated_bytes: u64,
        threshold_bytes: u64,
    },
    /// Full encode in progress.
    FullEncoding,
    /// Full encode failed after at most one subtitle-disable retry.
    EncodeFailed(String),
    /// Full encode produced an output file.
    EncodeSucceeded,
    /// Re-probing the output duration.
    DurationValidating,
    /// Output duration missing or out of tolerance; output discarded.
    DurationRejected {
        original_secs: u64,
        encoded_secs: Option<u64>,
    },
    /// Output duration within tolerance.
    DurationValidated,
    /// Comparing output size against the original.
    SizeComparing,
    /// Output was smaller; replacement (or keep-beside) applied.
    Replaced {
        final_path: PathBuf,
        output_bytes: u64,
    },
    /// Output was not smaller; original retained, output discarded.
    RetainedLarger { output_bytes: u64 },
}

impl TaskState {
    /// Ledger disposition for a terminal state; None for transient states.
    ///
    /// Skips count as `encoded`: handled does not imply replaced.
    pub fn disposition(&self) -> Option<Disposition> {
        match self {
            TaskState::FastSkipped { .. }
            | TaskState::SkippedInsufficientBenefit { .. }
            | TaskState::Replaced { .. }
            | TaskState::RetainedLarger { .. } => Some(Disposition::Encoded),
            TaskState::EstimationFailed(_)
            | TaskState::EncodeFailed(_)
            | TaskState::DurationRejected { .. } => Some(Disposition::Failed),
            TaskState::Discovered
            | TaskState::Sampling
            | TaskState::FullEncoding
            | TaskState::EncodeSucceeded
            | TaskState::DurationValidating
            | TaskState::DurationValidated
            | TaskState::SizeComparing => None,
        }
    }
}

/// Duration acceptance: absolute difference within the tolerance.
pub fn durations_match(original_secs: u64, encoded_secs: u64) -> bool {
    original_secs.abs_diff(encoded_secs) <= DURATION_TOLERANCE_SECS
}

/// Replacement mode from configuration. Keep-original wins over backup.
pub fn replace_mode(behavior: &BehaviorConfig) -> ReplaceMode {
    if behavior.keep_original {
        ReplaceMode::KeepOriginal
    } else if let Some(dir) = &behavior.backup_dir {
        ReplaceMode::Backup(dir.clone())
    } else {
        ReplaceMode::InPlace
    }
}

/// Temp output path beside the source, so the final rename stays on one
/// filesystem. The `.tmp` suffix keeps a crash leftover out of discovery;
/// the command builder passes the muxer explicitly since it cannot be
/// inferred from this name.
fn temp_output_path(candidate: &Candidate) -> PathBuf {
    let stem = candidate
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = format!(
        "{}.recode-{}.{}.tmp",
        stem,
        Uuid::new_v4().simple(),
        output_extension(&candidate.path)
    );
    candidate.directory().join(name)
}

/// Drives one candidate to a terminal state and records its disposition.
///
/// All encoder and probe failures resolve locally; the batch loop always
/// proceeds to the next candidate.
pub async fn run_task(
    candidate: &Candidate,
    config: &Config,
    ledger: &mut Ledger,
) -> Result<TaskState, TaskError> {
    let quality = quality_for_width(candidate.info.width, &config.encoder);
    let state = execute(candidate, quality, config).await?;

    if let Some(disposition) = state.disposition() {
        ledger.mark(candidate.directory(), candidate.basename(), disposition)?;
        info!(
            path = %candidate.path.display(),
            state = ?state,
            disposition = %disposition,
            "candidate resolved"
        );
    }

    Ok(state)
}

async fn execute(
    candidate: &Candidate,
    quality: u32,
    config: &Config,
) -> Result<TaskState, TaskError> {
    // The duration feeds both the sampling offsets and the post-encode
    // validation; without one the candidate cannot be processed.
    let original_secs = match candidate.info.usable_duration() {
        Some(secs) => secs,
        None => {
            return Ok(TaskState::EstimationFailed(
                "no usable duration reported".to_string(),
            ))
        }
    };

    // Discovered -> FastSkipped | Sampling
    debug!(path = %candidate.path.display(), quality, "sampling");
    let estimate = match estimate_candidate(candidate, quality, config).await {
        Ok(estimate) => estimate,
        Err(e) => {
            warn!(path = %candidate.path.display(), error = %e, "estimation failed");
            return Ok(TaskState::EstimationFailed(e.to_string()));
        }
    };

    let (estimated_bytes, threshold_bytes) = match estimate {
        Estimate::FastSkip { byte_rate } => {
            return Ok(TaskState::FastSkipped { byte_rate });
        }
        Estimate::Skip {
            estimated_bytes,
            threshold_bytes,
        } => {
            return Ok(TaskState::SkippedInsufficientBenefit {
                estimated_bytes,
                threshold_bytes,
            });
        }
        Estimate::Proceed {
            estimated_bytes,
            threshold_bytes,
        } => (estimated_bytes, threshold_bytes),
    };

    // Sampling -> FullEncoding
    info!(
        path = %candidate.path.display(),
        estimated_bytes,
        threshold_bytes,
        "estimate favorable, encoding"
    );
    let output = temp_output_path(candidate);
    let timeout = Duration::from_secs(config.encoder.encode_timeout_secs);

    let mut params = EncodeParams::full(candidate.path.clone(), output.clone(), quality);
    if let Err(detail) = full_encode(&mut params, timeout).await {
        let _ = std::fs::remove_file(&output);
        return Ok(TaskState::EncodeFailed(detail));
    }

    // EncodeSucceeded -> DurationValidating -> DurationRejected | DurationValidated
    let encoded_secs = match probe_duration(&output).await {
        Ok(secs) => secs,
        Err(e) => {
            warn!(path = %candidate.path.display(), error = %e, "output probe failed");
            let _ = std::fs::remove_file(&output);
            return Ok(TaskState::DurationRejected {
                original_secs,
                encoded_secs: None,
            });
        }
    };

    if !durations_match(original_secs, encoded_secs) {
        let _ = std::fs::remove_file(&output);
        return Ok(TaskState::DurationRejected {
            original_secs,
            encoded_secs: Some(encoded_secs),
        });
    }

    // DurationValidated -> SizeComparing -> Replaced | RetainedLarger
    let output_bytes = match std::fs::metadata(&output) {
        Ok(m) => m.len(),
        Err(e) => {
            let _ = std::fs::remove_file(&output);
            return Ok(TaskState::EncodeFailed(format!(
                "output vanished before size comparison: {}",
                e
            )));
        }
    };

    if output_bytes >= candidate.size_bytes {
        let _ = std::fs::remove_file(&output);
        return Ok(TaskState::RetainedLarger { output_bytes });
    }

    let mode = replace_mode(&config.behavior);
    match apply_replacement(&candidate.path, &output, &mode) {
        Ok(final_path) => Ok(TaskState::Replaced {
            final_path,
            output_bytes,
        }),
        Err(e) => {
            // Leave both files for inspection; no ledger write.
            Err(TaskError::Replace(e))
        }
    }
}

/// Runs the full encode, retrying once without subtitles on a recognized
/// subtitle-muxing failure. Returns the fatal detail on failure.
async fn full_encode(params: &mut EncodeParams, timeout: Duration) -> Result<(), String> {
    for attempt in 0..2 {
        let run = match run_ffmpeg(params, timeout).await {
            Ok(run) => run,
            Err(e) => return Err(e.to_string()),
        };

        match classify_encode(run.success, &run.stderr) {
            EncodeVerdict::Success => return Ok(()),
            EncodeVerdict::RetryWithoutSubtitles if attempt == 0 => {
                warn!(input = %params.input.display(), "subtitle mux failure, retrying without subtitles");
                let _ = std::fs::remove_file(&params.output);
                params.disable_subtitles = true;
            }
            EncodeVerdict::RetryWithoutSubtitles => {
                return Err("subtitle mux failure persisted without subtitles".to_string());
            }
            EncodeVerdict::Fatal(detail) => return Err(detail),
        }
    }
    unreachable!("encode loop returns within two attempts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MediaInfo;
    use std::path::Path;

    fn make_candidate(path: &str, size_bytes: u64, duration: u64) -> Candidate {
        Candidate {
            path: PathBuf::from(path),
            size_bytes,
            info: MediaInfo {
                codec: Some("h264".to_string()),
                duration_secs: Some(duration),
                width: Some(1920),
                height: Some(1080),
            },
        }
    }

    #[test]
    fn test_duration_tolerance() {
        // 1000 vs 1002 accepted, 1003 rejected.
        assert!(durations_match(1000, 1000));
        assert!(durations_match(1000, 1002));
        assert!(durations_match(1002, 1000));
        assert!(!durations_match(1000, 1003));
        assert!(!durations_match(1003, 1000));
    }

    #[test]
    fn test_terminal_dispositions() {
        // Resolved-no-change outcomes are `encoded`.
        assert_eq!(
            TaskState::FastSkipped { byte_rate: 1 }.disposition(),
            Some(Disposition::Encoded)
        );
        assert_eq!(
            TaskState::SkippedInsufficientBenefit {
                estimated_bytes: 900,
                threshold_bytes: 800
            }
            .disposition(),
            Some(Disposition::Encoded)
        );
        assert_eq!(
            TaskState::Replaced {
                final_path: PathBuf::from("/m/film.mkv"),
                output_bytes: 1
            }
            .disposition(),
            Some(Disposition::Encoded)
        );
        assert_eq!(
            TaskState::RetainedLarger { output_bytes: 1 }.disposition(),
            Some(Disposition::Encoded)
        );

        // Error outcomes are `failed`.
        assert_eq!(
            TaskState::EstimationFailed("boom".to_string()).disposition(),
            Some(Disposition::Failed)
        );
        assert_eq!(
            TaskState::EncodeFailed("boom".to_string()).disposition(),
            Some(Disposition::Failed)
        );
        assert_eq!(
            TaskState::DurationRejected {
                original_secs: 1000,
                encoded_secs: Some(900)
            }
            .disposition(),
            Some(Disposition::Failed)
        );
    }

    #[test]
    fn test_transient_states_have_no_disposition() {
        for state in [
            TaskState::Discovered,
            TaskState::Sampling,
            TaskState::FullEncoding,
            TaskState::EncodeSucceeded,
            TaskState::DurationValidating,
            TaskState::DurationValidated,
            TaskState::SizeComparing,
        ] {
            assert_eq!(state.disposition(), None, "{:?}", state);
        }
    }

    #[test]
    fn test_replace_mode_precedence() {
        let behavior = BehaviorConfig {
            keep_original: true,
            backup_dir: Some(PathBuf::from("/backups")),
            ..Default::default()
        };
        assert_eq!(replace_mode(&behavior), ReplaceMode::KeepOriginal);

        let behavior = BehaviorConfig {
            keep_original: false,
            backup_dir: Some(PathBuf::from("/backups")),
            ..Default::default()
        };
        assert_eq!(
            replace_mode(&behavior),
            ReplaceMode::Backup(PathBuf::from("/backups"))
        );

        let behavior = BehaviorConfig::default();
        assert_eq!(replace_mode(&behavior), ReplaceMode::InPlace);
    }

    #[test]
    fn test_temp_output_path_shape() {
        let candidate = make_candidate("/m/film.mkv", 1_000_000_000, 5400);
        let temp = temp_output_path(&candidate);

        assert_eq!(temp.parent(), Some(Path::new("/m")));
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("film.recode-"));
        assert!(name.ends_with(".mkv.tmp"));
    }

    #[test]
    fn test_temp_output_path_has_no_video_extension() {
        // A crash leftover must never re-enter discovery as a source.
        let candidate = make_candidate("/m/film.mkv", 1_000_000_000, 5400);
        let temp = temp_output_path(&candidate);
        assert!(!crate::filter::is_video_file(&temp));
    }

    #[test]
    fn test_temp_output_path_follows_container_rule() {
        // AVI source encodes into a Matroska temp file.
        let candidate = make_candidate("/m/film.avi", 1_000_000_000, 5400);
        let temp = temp_output_path(&candidate);
        assert!(temp.to_str().unwrap().ends_with(".mkv.tmp"));

        // MOV keeps its container.
        let candidate = make_candidate("/m/film.mov", 1_000_000_000, 5400);
        let temp = temp_output_path(&candidate);
        assert!(temp.to_str().unwrap().ends_with(".mov.tmp"));
    }

    #[test]
    fn test_temp_output_paths_are_unique() {
        let candidate = make_candidate("/m/film.mkv", 1_000_000_000, 5400);
        assert_ne!(temp_output_path(&candidate), temp_output_path(&candidate));
    }

    #[tokio::test]
    async fn test_zero_duration_candidate_fails_without_external_tools() {
        // A hand-built candidate with no usable duration resolves to
        // EstimationFailed and is ledgered, without reaching ffmpeg.
        let temp_dir = tempfile::TempDir::new().unwrap();
        let candidate = Candidate {
            path: temp_dir.path().join("film.mkv"),
            size_bytes: 1_000_000_000,
            info: MediaInfo {
                codec: Some("h264".to_string()),
                duration_secs: Some(0),
                width: Some(1920),
                height: Some(1080),
            },
        };

        let mut ledger = Ledger::new();
        let state = run_task(&candidate, &Config::default(), &mut ledger)
            .await
            .unwrap();

        assert!(matches!(state, TaskState::EstimationFailed(_)));
        assert!(ledger
            .contains(temp_dir.path(), "film.mkv", Disposition::Failed)
            .unwrap());
    }
}
