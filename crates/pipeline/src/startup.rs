//! Startup checks: verify the external tools exist before the batch runs.

use std::process::Command;
use thiserror::Error;

/// Error types for startup checks.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("ffprobe not available: {0}")]
    FfprobeUnavailable(String),
}

fn check_tool(tool: &str) -> Result<(), String> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .map_err(|e| format!("{} -version failed; is it in PATH? Error: {}", tool, e))?;

    if !output.status.success() {
        return Err(format!("{} -version exited with {}", tool, output.status));
    }
    Ok(())
}

/// Check that ffmpeg can be invoked.
pub fn check_ffmpeg_available() -> Result<(), StartupError> {
    check_tool("ffmpeg").map_err(StartupError::FfmpegUnavailable)
}

/// Check that ffprobe can be invoked.
pub fn check_ffprobe_available() -> Result<(), StartupError> {
    check_tool("ffprobe").map_err(StartupError::FfprobeUnavailable)
}

/// Run all startup checks in order.
pub fn run_startup_checks() -> Result<(), StartupError> {
    check_ffmpeg_available()?;
    check_ffprobe_available()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tool_missing_binary_errors() {
        let result = check_tool("definitely-not-a-real-encoder-tool");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("is it in PATH"));
    }
}
