//! Size estimator: decides skip-vs-proceed without a full re-encode.
//!
//! A candidate first takes the fast path: if its average byte rate is already
//! below the configured minimum, it cannot benefit and is resolved without
//! any sampling. Otherwise three short probe encodes run at the quartile,
//! half, and three-quarter offsets so differing content density (titles and
//! credits vs. main content) averages out, and the median sample size is
//! extrapolated to a full-size estimate. The median is used over the mean so
//! one outlier segment, like a black or silent scene, cannot drag the
//! estimate.

use crate::encode::{classify_encode, run_ffmpeg, EncodeParams, EncodeVerdict};
use crate::filter::Candidate;
use hevc_recode_config::Config;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error type for estimation. Any single sample failure aborts estimation
/// for the file; no partial estimate is trusted.
#[derive(Debug, Error)]
pub enum EstimateError {
    /// A sample encode failed or timed out.
    #[error("sample encode at offset {offset_secs}s failed: {detail}")]
    SampleFailed { offset_secs: u64, detail: String },

    /// The candidate carries no positive duration.
    #[error("no usable duration reported")]
    MissingDuration,

    /// IO error creating the sample workspace or reading a sample size.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One probe encode measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleMeasurement {
    /// Seconds into the file where the sample window starts.
    pub offset_secs: u64,
    /// Encoded byte size of the fixed-duration window.
    pub size_bytes: u64,
}

/// Outcome of estimating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Estimate {
    /// Average byte rate already below the minimum; resolved without sampling.
    FastSkip { byte_rate: u64 },
    /// Projected benefit insufficient; skip the full encode.
    Skip { estimated_bytes: u64, threshold_bytes: u64 },
    /// Projected benefit sufficient; proceed to the full encode.
    Proceed { estimated_bytes: u64, threshold_bytes: u64 },
}

/// Sample window offsets: quartile, half, and three-quarter marks.
pub fn sample_offsets(duration_secs: u64) -> [u64; 3] {
    [
        duration_secs / 4,
        duration_secs / 2,
        3 * duration_secs / 4,
    ]
}

/// Middle value of three sample sizes after ascending sort.
pub fn median3(samples: [u64; 3]) -> u64 {
    let mut sorted = samples;
    sorted.sort_unstable();
    sorted[1]
}

/// Extrapolates a full-size estimate from the median sample size, assuming
/// the sampled byte rate holds uniformly across the file.
pub fn extrapolate_size(median_bytes: u64, duration_secs: u64, sample_secs: u64) -> u64 {
    if sample_secs == 0 {
        return 0;
    }
    (median_bytes as u128 * duration_secs as u128 / sample_secs as u128) as u64
}

/// Skip threshold in bytes for a given original size and minimum ratio.
pub fn size_threshold(original_bytes: u64, min_size_ratio: f64) -> u64 {
    (original_bytes as f64 * min_size_ratio) as u64
}

/// Fast-path check: true when the average byte rate is below the minimum.
pub fn below_min_rate(size_bytes: u64, duration_secs: u64, min_byte_rate: u64) -> bool {
    if duration_secs == 0 {
        return false;
    }
    size_bytes / duration_secs < min_byte_rate
}

/// Pure skip-vs-proceed decision from the three measurements.
///
/// An estimate at or above the threshold skips the full encode; only a
/// strictly smaller estimate proceeds.
pub fn decide(
    samples: [u64; 3],
    original_bytes: u64,
    duration_secs: u64,
    sample_secs: u64,
    min_size_ratio: f64,
) -> Estimate {
    let median = median3(samples);
    let estimated_bytes = extrapolate_size(median, duration_secs, sample_secs);
    let threshold_bytes = size_threshold(original_bytes, min_size_ratio);

    if estimated_bytes >= threshold_bytes {
        Estimate::Skip {
            estimated_bytes,
            threshold_bytes,
        }
    } else {
        Estimate::Proceed {
            estimated_bytes,
            threshold_bytes,
        }
    }
}

/// Runs the full estimation for one candidate.
///
/// The sample encodes use the same codec, quality, and container parameters
/// as the eventual full encode, so the measured byte rate is representative.
pub async fn estimate_candidate(
    candidate: &Candidate,
    quality: u32,
    config: &Config,
) -> Result<Estimate, EstimateError> {
    let duration_secs = candidate
        .info
        .usable_duration()
        .ok_or(EstimateError::MissingDuration)?;

    // Fast path: already too sparse to benefit.
    let byte_rate = candidate.size_bytes / duration_secs;
    if below_min_rate(candidate.size_bytes, duration_secs, config.min_byte_rate()) {
        return Ok(Estimate::FastSkip { byte_rate });
    }

    let sample_secs = config.sampling.sample_duration_secs;
    let timeout = Duration::from_secs(config.sampling.sample_timeout_secs);
    let temp_dir = tempfile::Builder::new().prefix("recode_sample_").tempdir()?;

    let mut samples = [0u64; 3];
    for (i, offset_secs) in sample_offsets(duration_secs).into_iter().enumerate() {
        let output = temp_dir
            .path()
            .join(format!("sample_{}.{}", offset_secs, crate::encode::output_extension(&candidate.path)));
        let params = EncodeParams::sample(
            candidate.path.clone(),
            output.clone(),
            quality,
            offset_secs,
            sample_secs,
        );

        let run = run_ffmpeg(&params, timeout)
            .await
            .map_err(|e| EstimateError::SampleFailed {
                offset_secs,
                detail: e.to_string(),
            })?;

        match classify_encode(run.success, &run.stderr) {
            EncodeVerdict::Success => {}
            EncodeVerdict::RetryWithoutSubtitles | EncodeVerdict::Fatal(_) => {
                // Samples carry no subtitle streams; any failure aborts.
                return Err(EstimateError::SampleFailed {
                    offset_secs,
                    detail: run.stderr.lines().last().unwrap_or("encode failed").to_string(),
                });
            }
        }

        let size_bytes = std::fs::metadata(&output)?.len();
        debug!(offset_secs, size_bytes, "sample measured");
        samples[i] = size_bytes;
    }

    Ok(decide(
        samples,
        candidate.size_bytes,
        duration_secs,
        sample_secs,
        config.sampling.min_size_ratio,
    ))
}
