mod activity;
mod minute;

pub use activity::{
    ActivityInterval, ActivityMask, ACTIVITY_ALL, ACTIVITY_NONE, ACTIVITY_OPEN_WORKOUT,
    ACTIVITY_RESTFUL_SLEEP, ACTIVITY_RUN, ACTIVITY_SLEEP, ACTIVITY_WALK,
};
pub use minute::MinuteSample;

/// Seconds per minute key step.
pub const MINUTE_SECS: i64 = 60;
