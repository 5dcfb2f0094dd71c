//! Encoder adapter: builds and runs ffmpeg HEVC encodes.
//!
//! Sample encodes and full encodes share the same video parameters so the
//! sampled byte rate is representative of the full output. The external tool
//! reports errors only as diagnostic text, so failure classification scans
//! stderr for known signatures behind a single typed function.

use hevc_recode_config::EncoderConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// stderr substrings indicating a subtitle-muxing failure worth one retry
/// with subtitle streams disabled.
const SUBTITLE_ERROR_SIGNATURES: &[&str] = &[
    "Subtitle encoding currently only possible from text to text or bitmap to bitmap",
    "Subtitle codec",
    "Exactly one WebVTT stream is needed",
];

/// stderr substrings recognized as terminal encoder failures.
const FATAL_ERROR_SIGNATURES: &[&str] = &[
    "Could not write header",
    "Unknown encoder",
    "non monotonically increasing dts",
    "Invalid data found when processing input",
    "Conversion failed",
];

/// Error type for encoding operations.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// ffmpeg did not finish within the wall-clock bound.
    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),

    /// IO error starting or waiting on ffmpeg.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of one ffmpeg run from its exit status and stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeVerdict {
    /// Exit status zero.
    Success,
    /// Known subtitle-muxing failure; retry once with subtitles disabled.
    RetryWithoutSubtitles,
    /// Terminal failure for this candidate.
    Fatal(String),
}

/// Parameters for one ffmpeg invocation.
///
/// A sample encode sets `offset_secs`/`sample_duration_secs` and drops audio
/// and subtitle streams for speed; the video parameters are identical either
/// way.
#[derive(Debug, Clone)]
pub struct EncodeParams {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Constant-quality value chosen from the source resolution.
    pub quality: u32,
    /// Seek offset for sample encodes.
    pub offset_secs: Option<u64>,
    /// Window length for sample encodes.
    pub sample_duration_secs: Option<u64>,
    /// Set on the one retry after a subtitle-muxing failure.
    pub disable_subtitles: bool,
}

impl EncodeParams {
    /// Full-encode parameters for a source file.
    pub fn full(input: PathBuf, output: PathBuf, quality: u32) -> Self {
        Self {
            input,
            output,
            quality,
            offset_secs: None,
            sample_duration_secs: None,
            disable_subtitles: false,
        }
    }

    /// Sample-encode parameters at a given offset.
    pub fn sample(input: PathBuf, output: PathBuf, quality: u32, offset: u64, secs: u64) -> Self {
        Self {
            input,
            output,
            quality,
            offset_secs: Some(offset),
            sample_duration_secs: Some(secs),
            disable_subtitles: false,
        }
    }

    fn is_sample(&self) -> bool {
        self.sample_duration_secs.is_some()
    }
}

/// Result of one ffmpeg run, before classification.
#[derive(Debug)]
pub struct EncodeOutput {
    pub success: bool,
    pub stderr: String,
}

/// Selects the per-file quality value from the reported width.
///
/// Two discrete tiers split at the resolution threshold; unknown width falls
/// back to a single default.
pub fn quality_for_width(width: Option<u32>, cfg: &EncoderConfig) -> u32 {
    match width {
        Some(w) if w >= cfg.resolution_threshold_width => cfg.quality_hd,
        Some(_) => cfg.quality_sd,
        None => cfg.quality_fallback,
    }
}

/// Output extension for a source file.
///
/// AVI and MP4 sources are rewrapped into Matroska for compatibility; other
/// sources keep their container.
pub fn output_extension(input: &Path) -> String {
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mkv")
        .to_lowercase();
    match ext.as_str() {
        "avi" | "mp4" => "mkv".to_string(),
        other => other.to_string(),
    }
}

/// Muxer name for a container extension. Needed because temp encodes are
/// written under a `.tmp` name, so ffmpeg cannot infer the muxer from the
/// output path.
pub fn container_format(extension: &str) -> &'static str {
    match extension {
        "mp4" | "m4v" => "mp4",
        "mov" => "mov",
        "ts" | "m2ts" => "mpegts",
        _ => "matroska",
    }
}

/// MP4-family containers need fast-start and the HEVC-in-MP4 sample entry tag.
fn needs_mp4_tagging(extension: &str) -> bool {
    matches!(extension, "mp4" | "mov")
}

/// Builds the ffmpeg argument list for the given parameters.
pub fn ffmpeg_args(params: &EncodeParams) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];

    // Seek before the input so the demuxer jumps rather than decodes.
    if let Some(offset) = params.offset_secs {
        args.push("-ss".into());
        args.push(offset.to_string());
    }
    if let Some(secs) = params.sample_duration_secs {
        args.push("-t".into());
        args.push(secs.to_string());
    }

    args.push("-i".into());
    args.push(params.input.to_string_lossy().into_owned());

    if params.is_sample() {
        // Only the video byte rate matters for estimation.
        args.push("-an".into());
        args.push("-sn".into());
    } else {
        args.push("-map".into());
        args.push("0".into());
    }

    args.push("-c:v".into());
    args.push("hevc_nvenc".into());
    args.push("-preset".into());
    args.push("p5".into());
    args.push("-cq".into());
    args.push(params.quality.to_string());

    if !params.is_sample() {
        args.push("-c:a".into());
        args.push("copy".into());
        if params.disable_subtitles {
            args.push("-sn".into());
        } else {
            args.push("-c:s".into());
            args.push("copy".into());
        }
    }

    let container = output_extension(&params.input);
    if needs_mp4_tagging(&container) {
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push("-tag:v".into());
        args.push("hvc1".into());
    }

    args.push("-f".into());
    args.push(container_format(&container).into());

    args.push(params.output.to_string_lossy().into_owned());
    args
}

/// Runs ffmpeg with the given parameters, bounded by a wall-clock timeout.
///
/// On timeout the child is killed and any partial output removed; the caller
/// sees it as an `EncodeError::Timeout`, handled like any tool failure.
pub async fn run_ffmpeg(
    params: &EncodeParams,
    timeout: Duration,
) -> Result<EncodeOutput, EncodeError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(ffmpeg_args(params))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let result = tokio::time::timeout(timeout, cmd.output()).await;

    match result {
        Ok(output) => {
            let output = output?;
            Ok(EncodeOutput {
                success: output.status.success(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        Err(_) => {
            let _ = std::fs::remove_file(&params.output);
            Err(EncodeError::Timeout(timeout))
        }
    }
}

/// Classifies one ffmpeg run from exit status and diagnostic text.
///
/// Subtitle signatures are checked before fatal ones: ffmpeg often prints a
/// generic stream-init error alongside the subtitle-specific line.
pub fn classify_encode(success: bool, stderr: &str) -> EncodeVerdict {
    if success {
        return EncodeVerdict::Success;
    }

    if SUBTITLE_ERROR_SIGNATURES
        .iter()
        .any(|sig| stderr.contains(sig))
    {
        return EncodeVerdict::RetryWithoutSubtitles;
    }

    let detail = FATAL_ERROR_SIGNATURES
        .iter()
        .find(|sig| stderr.contains(*sig))
        .map(|sig| sig.to_string())
        .unwrap_or_else(|| {
            stderr
                .lines()
                .last()
                .unwrap_or("ffmpeg exited with nonzero status")
                .to_string()
        });

    EncodeVerdict::Fatal(detail)
}
