mod engine;
mod service;
mod state;

pub use engine::{ExportEngine, Outbox, SendError};
pub use service::{EngineEvent, ExportService};
pub use state::{auto_close_ready, Phase};
