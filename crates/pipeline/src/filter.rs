//! Candidate filter: discovers video files and applies exclusion predicates.
//!
//! Files are enumerated in walk order (depth-first when recursive, top level
//! only otherwise) and evaluated against a fixed predicate order, stopping at
//! the first exclusion. Survivors become the candidate queue for the batch.

use crate::ledger::{Disposition, Ledger, LedgerError};
use crate::probe::{probe_file, MediaInfo};
use hevc_recode_config::Config;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Video file extensions recognized by the filter (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mkv", ".mp4", ".avi", ".mov", ".m4v", ".ts", ".m2ts"];

/// Error type for candidate filtering.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The configured include pattern is not a valid regex.
    #[error("Invalid include pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Ledger lookup failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A file that passed every exclusion predicate.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Full path to the video file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Probe result, read once for this pipeline pass.
    pub info: MediaInfo,
}

impl Candidate {
    /// Basename used as the ledger key.
    pub fn basename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Directory owning this candidate's ledger.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Why a discovered file was not enqueued.
#[derive(Debug)]
pub enum Exclusion {
    /// Path does not match the configured include pattern.
    PatternMismatch,
    /// Byte size below the configured minimum.
    BelowMinSize { size_bytes: u64, min_bytes: u64 },
    /// Basename already resolved in the directory's `encoded` set.
    AlreadyResolved,
    /// Basename present in the directory's `failed` set.
    PreviouslyFailed,
    /// Probe reported no codec: corrupt or unreadable media. Not ledgered,
    /// so a file that is only transiently unreadable is retried next run.
    Unreadable(String),
    /// Codec is in the disallowed set (already dense enough).
    DisallowedCodec(String),
    /// Probe reported no positive integer duration.
    InvalidDuration,
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exclusion::PatternMismatch => write!(f, "does not match include pattern"),
            Exclusion::BelowMinSize {
                size_bytes,
                min_bytes,
            } => write!(
                f,
                "below minimum size ({} bytes < {} bytes)",
                size_bytes, min_bytes
            ),
            Exclusion::AlreadyResolved => write!(f, "already in encoded ledger"),
            Exclusion::PreviouslyFailed => write!(f, "in failed ledger"),
            Exclusion::Unreadable(e) => write!(f, "unreadable media: {}", e),
            Exclusion::DisallowedCodec(codec) => write!(f, "already {}", codec),
            Exclusion::InvalidDuration => write!(f, "no positive duration"),
        }
    }
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Checks if a path is something this pipeline itself wrote: a
/// keep-original sibling (`<stem>-encoded.<ext>`) or a temp encode left by
/// an interrupted run. Never rediscovered as a source.
pub fn is_own_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem.ends_with("-encoded") || stem.contains(".recode-"))
        .unwrap_or(false)
}

/// Checks whether a reported codec is in the disallowed set.
///
/// HEVC and AV1 are each individually toggleable; matching is
/// case-insensitive on the codec name ffprobe reports.
pub fn codec_disallowed(codec: &str, skip_hevc: bool, skip_av1: bool) -> bool {
    let lower = codec.to_lowercase();
    (skip_hevc && lower.contains("hevc")) || (skip_av1 && lower.contains("av1"))
}

/// Enumerates files under the root with recognized video extensions.
///
/// Depth-first via walkdir when recursive (hidden directories skipped),
/// top-level read_dir otherwise. Order is the walk order.
fn enumerate_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if recursive {
        use walkdir::WalkDir;

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    // Allow the root directory even if it starts with '.'
                    if name.starts_with('.') && entry.depth() > 0 {
                        return false;
                    }
                }
            }
            true
        });

        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_file()
                && is_video_file(entry.path())
                && !is_own_output(entry.path())
            {
                files.push(entry.path().to_path_buf());
            }
        }
    } else if let Ok(read_dir) = std::fs::read_dir(root) {
        for entry in read_dir.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() && is_video_file(&path) && !is_own_output(&path) {
                files.push(path);
            }
        }
    }

    files
}

/// Evaluates the exclusion predicates for one file, in fixed order.
///
/// Returns the candidate on success, or the first matching exclusion.
/// The probe runs only after the cheap predicates pass.
async fn evaluate(
    path: &Path,
    size_bytes: u64,
    include: Option<&Regex>,
    config: &Config,
    ledger: &mut Ledger,
) -> Result<Result<Candidate, Exclusion>, LedgerError> {
    // Predicate 1: include pattern.
    if let Some(re) = include {
        if !re.is_match(&path.to_string_lossy()) {
            return Ok(Err(Exclusion::PatternMismatch));
        }
    }

    // Predicate 2: minimum size.
    let min_bytes = config.min_size_bytes();
    if size_bytes < min_bytes {
        return Ok(Err(Exclusion::BelowMinSize {
            size_bytes,
            min_bytes,
        }));
    }

    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Predicates 3 and 4: ledger membership.
    if ledger.contains(dir, basename, Disposition::Encoded)? {
        return Ok(Err(Exclusion::AlreadyResolved));
    }
    if ledger.contains(dir, basename, Disposition::Failed)? {
        return Ok(Err(Exclusion::PreviouslyFailed));
    }

    // Predicate 5: probe must report a codec.
    let info = match probe_file(path).await {
        Ok(info) => info,
        Err(e) => return Ok(Err(Exclusion::Unreadable(e.to_string()))),
    };
    let codec = match &info.codec {
        Some(codec) => codec.clone(),
        None => return Ok(Err(Exclusion::Unreadable("no codec reported".to_string()))),
    };

    // Predicate 6: disallowed codec.
    if codec_disallowed(&codec, config.behavior.skip_hevc, config.behavior.skip_av1) {
        return Ok(Err(Exclusion::DisallowedCodec(codec)));
    }

    // Predicate 7: positive integer duration.
    if info.usable_duration().is_none() {
        return Ok(Err(Exclusion::InvalidDuration));
    }

    Ok(Ok(Candidate {
        path: path.to_path_buf(),
        size_bytes,
        info,
    }))
}

/// Walks the root and produces the ordered candidate queue.
///
/// Every discovered video file runs through the predicates; exclusions are
/// logged at debug level. No candidate appears twice.
pub async fn collect_candidates(
    root: &Path,
    config: &Config,
    ledger: &mut Ledger,
) -> Result<Vec<Candidate>, FilterError> {
    let include = config
        .library
        .include_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()?;

    let mut candidates = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for path in enumerate_files(root, config.library.recursive) {
        if !seen.insert(path.clone()) {
            continue;
        }

        let size_bytes = match std::fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "metadata read failed, skipping");
                continue;
            }
        };

        match evaluate(&path, size_bytes, include.as_ref(), config, ledger).await? {
            Ok(candidate) => candidates.push(candidate),
            Err(exclusion) => {
                debug!(path = %path.display(), reason = %exclusion, "excluded");
            }
        }
    }

    Ok(candidates)
}
