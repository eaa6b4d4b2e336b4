//! Structural plausibility check for extracted metadata.
//!
//! The declared per-stream bitrates and play duration predict how large
//! the file should be; a file whose on-disk size strays too far from that
//! prediction is flagged.

use crate::model::MediaFile;
use serde::Serialize;

/// Largest acceptable file when the metadata predicts a zero size.
pub const ZERO_DURATION_MAX_BYTES: u64 = 10 * 1024;

const RATIO_MIN: f64 = 0.8;
const RATIO_MAX: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Ok,
    BadSize,
    ZeroDuration,
    InvalidHeader,
}

/// Classify a file size against the size its metadata predicts.
pub fn verify_size(data_bitrates: &[u32], duration_seconds: f64, actual_bytes: u64) -> Verification {
    let total_bitrate: u64 = data_bitrates.iter().map(|&b| u64::from(b)).sum();
    let expected_bytes = total_bitrate as f64 / 8.0 * duration_seconds;

    if expected_bytes == 0.0 {
        if actual_bytes <= ZERO_DURATION_MAX_BYTES {
            Verification::Ok
        } else {
            Verification::ZeroDuration
        }
    } else {
        let ratio = actual_bytes as f64 / expected_bytes;
        if (RATIO_MIN..=RATIO_MAX).contains(&ratio) {
            Verification::Ok
        } else {
            Verification::BadSize
        }
    }
}

/// Classify a parse result against the file's on-disk size.
///
/// A file whose container could not be parsed at all is `InvalidHeader`.
pub fn verify_media(media: Option<&MediaFile>, actual_bytes: u64) -> Verification {
    let Some(media) = media else {
        return Verification::InvalidHeader;
    };
    let duration = media
        .video_streams()
        .find_map(|v| v.duration)
        .unwrap_or(0.0);
    verify_size(&media.data_bitrates, duration, actual_bytes)
}
