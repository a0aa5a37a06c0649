//! Canonical textual form of one minute record.
//!
//! Format: RFC-3339 UTC timestamp, then comma-separated fields — step
//! count, yaw, pitch, vmc, ambient light (signed), activity mask, heart
//! rate. Invalid samples keep the field count with empty values around
//! the mask. No line terminator.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ActivityMask, MinuteSample};

/// Hard cap on one encoded record, matching the outbound message buffer.
pub const MAX_RECORD_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("no UTC representation for timestamp {0}")]
    Timestamp(i64),
    #[error("encoded record would exceed {MAX_RECORD_LEN} bytes")]
    BufferTooSmall,
}

/// Render one sample into `buf` and return the encoded length.
///
/// `key_secs` must already be minute-aligned; see
/// [`crate::transfer::ExportEngine`] for the truncation warning on the
/// send path. `buf` is cleared first, and left empty on failure so a
/// failed record can never leak onto the channel.
pub fn encode_record(
    buf: &mut String,
    sample: &MinuteSample,
    mask: ActivityMask,
    key_secs: i64,
) -> Result<usize, EncodeError> {
    buf.clear();

    let ts = DateTime::<Utc>::from_timestamp(key_secs, 0)
        .ok_or(EncodeError::Timestamp(key_secs))?;
    let formatted = ts.format("%Y-%m-%dT%H:%M:%SZ");

    let result = if sample.valid {
        write!(
            buf,
            "{},{},{},{},{},{},{},{}",
            formatted,
            sample.steps,
            sample.yaw(),
            sample.pitch(),
            sample.vmc,
            sample.light as i32,
            mask,
            sample.heart_rate_bpm,
        )
    } else {
        write!(buf, "{},,,,,,{},", formatted, mask)
    };

    if result.is_err() || buf.len() > MAX_RECORD_LEN {
        buf.clear();
        return Err(EncodeError::BufferTooSmall);
    }

    Ok(buf.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MinuteSample {
        MinuteSample {
            steps: 5,
            orientation: 0x21,
            vmc: 300,
            light: 2,
            heart_rate_bpm: 72,
            valid: true,
        }
    }

    #[test]
    fn valid_sample_renders_all_fields() {
        let mut buf = String::new();
        // minute key 100 -> 6000 seconds after epoch
        let len = encode_record(&mut buf, &sample(), 0, 6000).unwrap();
        assert_eq!(buf, "1970-01-01T01:40:00Z,5,1,2,300,2,0,72");
        assert_eq!(len, buf.len());
    }

    #[test]
    fn invalid_sample_keeps_field_parity() {
        let mut buf = String::new();
        encode_record(&mut buf, &MinuteSample::invalid(), 7, 6060).unwrap();
        assert_eq!(buf, "1970-01-01T01:41:00Z,,,,,,7,");
        assert_eq!(buf.split(',').count(), 8);
        assert_eq!(
            "1970-01-01T01:40:00Z,5,1,2,300,2,0,72".split(',').count(),
            8
        );
    }

    #[test]
    fn encoding_is_idempotent() {
        let mut first = String::new();
        let mut second = String::new();
        encode_record(&mut first, &sample(), 3, 6000).unwrap();
        encode_record(&mut second, &sample(), 3, 6000).unwrap();
        assert_eq!(first, second);

        // re-using the same buffer replaces, never appends
        encode_record(&mut second, &sample(), 3, 6000).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unrepresentable_timestamp_is_an_error() {
        let mut buf = String::new();
        let err = encode_record(&mut buf, &sample(), 0, i64::MAX).unwrap_err();
        assert_eq!(err, EncodeError::Timestamp(i64::MAX));
        assert!(buf.is_empty());
    }
}
