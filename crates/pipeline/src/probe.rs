//! Probe adapter for reading media metadata via ffprobe.
//!
//! This module queries ffprobe for the codec, duration, and resolution of a
//! file. Probes are wall-clock bounded; a timeout is treated like any other
//! probe failure (corrupt or unreadable media).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Wall-clock bound for a single ffprobe invocation.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe command failed to execute or exited nonzero.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// ffprobe did not finish within the wall-clock bound.
    #[error("ffprobe timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media metadata for one file, read once per pipeline pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaInfo {
    /// Codec name of the first video stream (e.g. "h264", "hevc", "av1").
    pub codec: Option<String>,
    /// Container duration in whole seconds (integer-truncated).
    pub duration_secs: Option<u64>,
    /// Video width in pixels, if reported.
    pub width: Option<u32>,
    /// Video height in pixels, if reported.
    pub height: Option<u32>,
}

impl MediaInfo {
    /// Duration usable by the pipeline: present and strictly positive.
    pub fn usable_duration(&self) -> Option<u64> {
        self.duration_secs.filter(|d| *d > 0)
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
    }
}

/// Probes a media file with ffprobe and collects codec, duration, and size.
///
/// Runs `ffprobe -v quiet -print_format json -show_streams -show_format <path>`
/// and parses the JSON output.
pub async fn probe_file(path: &Path) -> Result<MediaInfo, ProbeError> {
    let child = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = tokio::time::timeout(PROBE_TIMEOUT, child)
        .await
        .map_err(|_| ProbeError::Timeout(PROBE_TIMEOUT))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// Probes only the duration of a file, for post-encode validation.
pub async fn probe_duration(path: &Path) -> Result<u64, ProbeError> {
    let info = probe_file(path).await?;
    info.usable_duration()
        .ok_or_else(|| ProbeError::ParseError("no usable duration reported".to_string()))
}

/// Parses ffprobe JSON output into a MediaInfo.
pub fn parse_ffprobe_output(json_str: &str) -> Result<MediaInfo, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let streams = ffprobe.streams.unwrap_or_default();
    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::ParseError("Missing format information in ffprobe output".to_string())
    })?;

    // First video stream wins; audio-only files end up with codec None.
    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let codec = video
        .and_then(|s| s.codec_name.clone())
        .filter(|c| !c.is_empty());

    // Integer truncation: "7200.9" reads as 7200 seconds.
    let duration_secs = format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d as u64);

    Ok(MediaInfo {
        codec,
        duration_secs,
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
    })
}
