mod source;
mod window;

pub use source::HistorySource;
pub use window::{HistoryExhausted, Window, WINDOW_CAPACITY};
