use crate::models::{ActivityInterval, ActivityMask, MinuteSample};

/// Platform boundary for raw history retrieval and activity iteration.
///
/// Implemented by the host over whatever health service it runs on; the
/// engine only ever talks to history through this trait.
pub trait HistorySource {
    /// Fill `slots` with per-minute samples covering as much of
    /// `[*from, *to)` as fits, starting at `*from`. Narrows `from`/`to`
    /// to the range actually covered and returns the number of slots
    /// written. The resulting `*to` is the start of the next page.
    fn fetch_minute_samples(
        &mut self,
        slots: &mut [MinuteSample],
        from: &mut i64,
        to: &mut i64,
    ) -> usize;

    /// Whether activity interval data can be read for the given span.
    fn activity_accessible(&self, mask: ActivityMask, from: i64, to: i64) -> bool;

    /// Iterate intervals matching `mask` that overlap `[from, to)`, in
    /// increasing start order. The callback returns `false` to stop early.
    fn each_activity_interval(
        &self,
        mask: ActivityMask,
        from: i64,
        to: i64,
        visit: &mut dyn FnMut(&ActivityInterval) -> bool,
    );
}
