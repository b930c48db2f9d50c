//! Quality scoring.
//!
//! A pure function from probe metrics and configured weights to a
//! score in [0, 1]. Identical inputs always produce the identical
//! score; the worker caches the result on the stream and the reorder
//! step consumes it.
//!
//! Reference scales (each term is normalized into [0, 1] before
//! weighting):
//! - bitrate: linear up to 8000 kbps
//! - resolution: tiers on vertical resolution (1080p and above = 1.0,
//!   720p = 0.7, 576 = 0.5, anything smaller = 0.3)
//! - fps: linear up to 60
//! - codec: HEVC 1.0, H.264 0.8, other known codecs 0.5, unknown 0.0
//! - errors: starts at 1.0, decreased per recorded defect, floored at 0

use crate::config::ScoringWeights;
use crate::model::StreamMetrics;

/// Bitrate at or above which the bitrate term saturates.
pub const REFERENCE_BITRATE_KBPS: f64 = 8000.0;

/// Frame rate at or above which the fps term saturates.
pub const REFERENCE_FPS: f64 = 60.0;

const DECODE_ERROR_PENALTY: f64 = 0.2;
const DISCONTINUITY_PENALTY: f64 = 0.2;
const TIMEOUT_PENALTY: f64 = 0.3;
const INTERLACED_PENALTY: f64 = 0.1;
const DROPPED_FRAME_PENALTY: f64 = 0.01;
const DROPPED_FRAME_PENALTY_CAP: f64 = 0.3;

/// Compute the weighted quality score for a successfully probed
/// stream.
///
/// Weights are applied as-is; a non-unit-sum weight set is not
/// renormalized. A probe failure never reaches this function - the
/// worker assigns 0.0 directly since no metrics exist.
pub fn score_stream(metrics: &StreamMetrics, weights: &ScoringWeights) -> f64 {
    let score = weights.bitrate * bitrate_norm(metrics.bitrate_kbps)
        + weights.resolution * resolution_norm(metrics.width, metrics.height)
        + weights.fps * fps_norm(metrics.fps)
        + weights.codec * codec_score(&metrics.video_codec)
        + weights.errors * error_score(metrics);
    score.clamp(0.0, f64::MAX)
}

fn bitrate_norm(bitrate_kbps: u32) -> f64 {
    (bitrate_kbps as f64 / REFERENCE_BITRATE_KBPS).min(1.0)
}

fn resolution_norm(width: u32, height: u32) -> f64 {
    if width == 0 || height == 0 {
        return 0.0;
    }
    match height {
        h if h >= 1080 => 1.0,
        h if h >= 720 => 0.7,
        h if h >= 576 => 0.5,
        _ => 0.3,
    }
}

fn fps_norm(fps: f64) -> f64 {
    if !fps.is_finite() || fps <= 0.0 {
        return 0.0;
    }
    (fps / REFERENCE_FPS).min(1.0)
}

/// Ordinal codec preference normalized to [0, 1]. Modern codecs rank
/// higher; an unrecognized or missing codec scores 0.5 and 0.0
/// respectively.
fn codec_score(video_codec: &str) -> f64 {
    let codec = video_codec.to_ascii_lowercase();
    if codec.is_empty() || codec == "n/a" {
        0.0
    } else if codec.contains("hevc") || codec.contains("h265") || codec.contains("265") {
        1.0
    } else if codec.contains("h264") || codec.contains("avc") || codec.contains("264") {
        0.8
    } else {
        0.5
    }
}

/// Error term: 1.0 minus a fixed penalty per recorded defect, floored
/// at 0. Monotonically non-increasing in every defect counter.
fn error_score(metrics: &StreamMetrics) -> f64 {
    let mut score = 1.0;
    score -= DECODE_ERROR_PENALTY * metrics.error_count as f64;
    score -= DISCONTINUITY_PENALTY * metrics.discontinuity_count as f64;
    score -= TIMEOUT_PENALTY * metrics.timeout_count as f64;
    if metrics.interlaced {
        score -= INTERLACED_PENALTY;
    }
    score -= (DROPPED_FRAME_PENALTY * metrics.dropped_frames as f64)
        .min(DROPPED_FRAME_PENALTY_CAP);
    score.max(0.0)
}
