//! Dual-track transfer progress.
//!
//! One [`TransferTrack`] per transfer leg: the device's own export and
//! the peer's onward upload. Everything shown to the rendering layer is
//! re-derived from the track state on demand, so the numbers can never
//! drift from the transfer state itself.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::models::MINUTE_SECS;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackRole {
    DeviceExport,
    PeerUpload,
}

/// Progress cursors for one transfer leg. Minute keys, 0 = unset.
#[derive(Debug, Clone)]
pub struct TransferTrack {
    pub role: TrackRole,
    pub first_key: u32,
    pub current_key: u32,
    pub started_at: Option<DateTime<Utc>>,
    /// Failure reason reported for this leg; shown in place of the rate.
    pub failure: Option<String>,
}

/// What the rendering layer shows for one track.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackView {
    /// Local time of the last processed minute, `%Y-%m-%d %H:%M`.
    pub label: String,
    /// `"<n> /min"`, `"DONE"`, a failure reason, or empty.
    pub rate: String,
    pub percent: u8,
}

/// Snapshot consumed by the (external) rendering layer on its tick.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    /// Out-of-band notice; when set the tracks are not shown.
    pub modal: Option<String>,
    pub device: Option<TrackView>,
    pub upload: Option<TrackView>,
}

impl DisplaySnapshot {
    pub fn modal(text: impl Into<String>) -> Self {
        Self {
            modal: Some(text.into()),
            device: None,
            upload: None,
        }
    }
}

/// Display horizon: the confirmed end of the pass once known, otherwise
/// "now" rounded up to a whole minute.
pub fn horizon_key(checkpoint: u32, now: DateTime<Utc>) -> u32 {
    if checkpoint != 0 {
        checkpoint
    } else {
        ((now.timestamp() + MINUTE_SECS - 1) / MINUTE_SECS) as u32
    }
}

impl TransferTrack {
    pub fn new(role: TrackRole) -> Self {
        Self {
            role,
            first_key: 0,
            current_key: 0,
            started_at: None,
            failure: None,
        }
    }

    /// Record a processed key, setting `first_key` on the first one.
    pub fn advance_to(&mut self, key: u32) {
        if self.first_key == 0 {
            self.first_key = key;
        }
        self.current_key = key;
    }

    /// Back to the unstarted state (a fresh resume).
    pub fn reset(&mut self, started_at: Option<DateTime<Utc>>) {
        self.first_key = 0;
        self.current_key = 0;
        self.started_at = started_at;
        self.failure = None;
    }

    /// Derive the display view. `None` until the track has processed a
    /// key (nothing meaningful to show yet).
    pub fn view(&self, checkpoint: u32, now: DateTime<Utc>) -> Option<TrackView> {
        if self.current_key == 0 {
            return None;
        }

        let horizon = horizon_key(checkpoint, now);
        let span = (horizon as i64 - self.first_key as i64).max(1);
        let done = self.current_key as i64 - self.first_key as i64 + 1;
        let percent = ((done * 100 + span / 2) / span).clamp(0, 100) as u8;

        let label = DateTime::<Utc>::from_timestamp(self.current_key as i64 * MINUTE_SECS, 0)
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        let rate = if checkpoint != 0 && self.current_key == checkpoint {
            "DONE".to_string()
        } else if let Some(reason) = &self.failure {
            reason.clone()
        } else {
            match self.started_at {
                Some(start) => {
                    let elapsed = (now - start).num_seconds();
                    if elapsed > 0 {
                        let keys = self.current_key as i64 - self.first_key as i64;
                        format!("{} /min", (keys * MINUTE_SECS + elapsed / 2) / elapsed)
                    } else {
                        String::new()
                    }
                }
                None => String::new(),
            }
        };

        Some(TrackView {
            label,
            rate,
            percent,
        })
    }
}
