//! Export engine for a bounded device's per-minute health history.
//!
//! Pages the history into fixed-size windows, merges activity-interval
//! annotations onto the minute slots, encodes each minute as one
//! canonical CSV line, and drives a resumable, one-record-in-flight
//! transfer over an asynchronous message channel. A second transfer leg
//! (the peer's onward upload) is tracked from control messages, and the
//! session auto-closes once both legs are done.
//!
//! The host supplies the platform seams: [`history::HistorySource`] for
//! raw minute data and activity intervals, and [`transfer::Outbox`] for
//! the outbound channel. Rendering is outside this crate; it consumes
//! [`progress::DisplaySnapshot`] values.

pub mod encoder;
pub mod history;
pub mod models;
pub mod progress;
pub mod protocol;
pub mod settings;
pub mod transfer;
mod utils;
pub mod wakeup;

pub use encoder::{encode_record, EncodeError, MAX_RECORD_LEN};
pub use history::{HistoryExhausted, HistorySource, Window, WINDOW_CAPACITY};
pub use models::{ActivityInterval, ActivityMask, MinuteSample};
pub use progress::{DisplaySnapshot, TrackRole, TrackView, TransferTrack};
pub use protocol::{ControlMessage, Tuple, TupleValue};
pub use settings::{ExportSettings, SettingsStore};
pub use transfer::{ExportEngine, ExportService, Outbox, Phase, SendError};
