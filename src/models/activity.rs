use serde::{Deserialize, Serialize};

/// Bitmask of activity flags attached to one minute slot.
///
/// Built by OR-merging every interval that overlaps the minute; a minute
/// covered by no interval keeps `ACTIVITY_NONE`.
pub type ActivityMask = u32;

pub const ACTIVITY_NONE: ActivityMask = 0;
pub const ACTIVITY_SLEEP: ActivityMask = 1 << 0;
pub const ACTIVITY_RESTFUL_SLEEP: ActivityMask = 1 << 1;
pub const ACTIVITY_WALK: ActivityMask = 1 << 2;
pub const ACTIVITY_RUN: ActivityMask = 1 << 3;
pub const ACTIVITY_OPEN_WORKOUT: ActivityMask = 1 << 4;
pub const ACTIVITY_ALL: ActivityMask = ACTIVITY_SLEEP
    | ACTIVITY_RESTFUL_SLEEP
    | ACTIVITY_WALK
    | ACTIVITY_RUN
    | ACTIVITY_OPEN_WORKOUT;

/// A time-ranged activity annotation from the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInterval {
    pub flags: ActivityMask,
    /// Unix seconds, inclusive.
    pub start: i64,
    /// Unix seconds, exclusive.
    pub end: i64,
}
