use log::error;
use thiserror::Error;

use crate::models::{ActivityMask, MinuteSample, ACTIVITY_ALL, ACTIVITY_NONE, MINUTE_SECS};

use super::HistorySource;

/// Maximum samples held by one page (one day of minutes).
pub const WINDOW_CAPACITY: usize = 1440;

/// The source returned zero samples: the pagination pass is finished.
/// Terminal for the pass, not an error to retry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("history source returned no samples")]
pub struct HistoryExhausted;

/// One fetched page of minute samples with merged activity masks.
///
/// A bounded arena: the sample and mask slices are allocated once at
/// capacity and reused for every page, preserving the memory ceiling of
/// the device the history comes from.
pub struct Window {
    samples: Box<[MinuteSample]>,
    masks: Box<[ActivityMask]>,
    len: usize,
    index: usize,
    /// Unix seconds of slot 0.
    first: i64,
    /// Exclusive upper bound; also the next page's start.
    last: i64,
}

impl Window {
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![MinuteSample::invalid(); capacity].into_boxed_slice(),
            masks: vec![ACTIVITY_NONE; capacity].into_boxed_slice(),
            len: 0,
            index: 0,
            first: 0,
            last: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when every slot has been consumed and the next page must be
    /// loaded from `next_page_start`.
    pub fn is_exhausted(&self) -> bool {
        self.index >= self.len
    }

    pub fn first(&self) -> i64 {
        self.first
    }

    /// Start key (unix seconds) for the next `load_page` call.
    pub fn next_page_start(&self) -> i64 {
        self.last
    }

    /// Drop any loaded page and make the next load start at `next_start`.
    pub fn reset(&mut self, next_start: i64) {
        self.len = 0;
        self.index = 0;
        self.first = 0;
        self.last = next_start;
    }

    /// The slot under the cursor: sample, merged mask, and its minute
    /// timestamp in unix seconds. `None` once exhausted.
    pub fn current(&self) -> Option<(MinuteSample, ActivityMask, i64)> {
        if self.index >= self.len {
            return None;
        }
        Some((
            self.samples[self.index],
            self.masks[self.index],
            self.first + MINUTE_SECS * self.index as i64,
        ))
    }

    pub fn advance(&mut self) {
        if self.index < self.len {
            self.index += 1;
        }
    }

    /// Fetch the page starting at `start` (unix seconds) covering up to
    /// `now`, then merge all overlapping activity intervals.
    pub fn load_page<S: HistorySource>(
        &mut self,
        source: &mut S,
        start: i64,
        now: i64,
    ) -> Result<(), HistoryExhausted> {
        self.first = start;
        self.last = now;
        self.len = source.fetch_minute_samples(&mut self.samples, &mut self.first, &mut self.last);
        self.index = 0;

        for mask in self.masks.iter_mut() {
            *mask = ACTIVITY_NONE;
        }

        if self.len == 0 {
            error!("history source returned 0 samples starting at {start}");
            self.first = 0;
            self.last = 0;
            return Err(HistoryExhausted);
        }

        // Both activity calls must describe the loaded slots, not the
        // possibly wider range the source reported back in `last`.
        let first = self.first;
        let loaded_until = last_of(first, self.len);
        if source.activity_accessible(ACTIVITY_ALL, first, loaded_until) {
            let len = self.len;
            let masks = &mut self.masks;
            source.each_activity_interval(ACTIVITY_ALL, first, loaded_until, &mut |iv| {
                merge_interval(masks, first, len, iv.flags, iv.start, iv.end);
                true
            });
        }

        Ok(())
    }
}

fn last_of(first: i64, len: usize) -> i64 {
    first + MINUTE_SECS * len as i64
}

/// OR `flags` into every minute slot overlapped by `[start, end)`.
///
/// Half-open minute-boundary rule: the interval start maps to its
/// containing slot (clamped to 0), the end rounds up to the first slot
/// past the interval (clamped to the page length).
fn merge_interval(
    masks: &mut [ActivityMask],
    first: i64,
    len: usize,
    flags: ActivityMask,
    start: i64,
    end: i64,
) {
    let first_index = if start <= first {
        0
    } else {
        ((start - first) / MINUTE_SECS) as usize
    };
    if first_index >= len {
        return;
    }

    if end <= first {
        return;
    }
    let mut last_index = ((end - first + MINUTE_SECS - 1) / MINUTE_SECS) as usize;
    if last_index > len {
        last_index = len;
    }

    for mask in &mut masks[first_index..last_index] {
        *mask |= flags;
    }
}
