use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    encoder::encode_record,
    history::{HistorySource, Window},
    models::MINUTE_SECS,
    progress::{DisplaySnapshot, TrackRole, TransferTrack},
    protocol::{decode_tuple, ControlMessage, Tuple},
    settings::SettingsStore,
};

use super::{auto_close_ready, Phase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_error, log_info, log_warn};

/// Starting a send on the channel failed before anything left the
/// device. Commit failures arrive later through [`ExportEngine::on_outbox_failed`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("channel send failed: {0}")]
pub struct SendError(pub String);

/// Outbound leg of the channel: one record at a time, completion
/// signaled asynchronously via the sent/failed events.
pub trait Outbox {
    fn begin_send(&mut self, key: u32, line: &str) -> Result<(), SendError>;
}

/// The export state machine.
///
/// Strictly event-driven and reentrancy-free: each public method is one
/// event, handled to completion before the next. All transfer state —
/// the window, both tracks, the session flags — is owned here and never
/// mutated from anywhere else.
pub struct ExportEngine<S, O> {
    source: S,
    outbox: O,
    window: Window,
    record_buf: String,
    phase: Phase,
    device: TransferTrack,
    upload: TransferTrack,
    /// Last minute key confirmed as fully exported; 0 = none yet.
    checkpoint: u32,
    settings: Arc<SettingsStore>,
    /// Persisted auto-close preference.
    cfg_auto_close: bool,
    /// Effective auto-close; differs from the preference while a
    /// configuration sub-session is open or after a scheduled launch.
    auto_close: bool,
    configuring: bool,
    close_requested: bool,
    modal: Option<String>,
    dirty: bool,
    close_token: CancellationToken,
}

impl<S: HistorySource, O: Outbox> ExportEngine<S, O> {
    pub fn new(
        source: S,
        outbox: O,
        settings: Arc<SettingsStore>,
        launched_by_scheduler: bool,
        close_token: CancellationToken,
    ) -> Self {
        let cfg = settings.get();
        Self {
            source,
            outbox,
            window: Window::new(),
            record_buf: String::new(),
            phase: Phase::Idle,
            device: TransferTrack::new(TrackRole::DeviceExport),
            upload: TransferTrack::new(TrackRole::PeerUpload),
            checkpoint: 0,
            settings,
            cfg_auto_close: cfg.auto_close,
            auto_close: cfg.auto_close || launched_by_scheduler,
            configuring: false,
            close_requested: false,
            modal: Some("Waiting for peer".to_string()),
            dirty: true,
            close_token,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn checkpoint(&self) -> u32 {
        self.checkpoint
    }

    pub fn device(&self) -> &TransferTrack {
        &self.device
    }

    pub fn upload(&self) -> &TransferTrack {
        &self.upload
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// True while the peer has a configuration UI open.
    pub fn is_configuring(&self) -> bool {
        self.configuring
    }

    /// Apply every decodable field of an inbound dictionary, in order.
    pub fn handle_tuples(&mut self, tuples: &[Tuple], now: DateTime<Utc>) {
        for tuple in tuples {
            if let Some(message) = decode_tuple(tuple) {
                self.handle_message(message, now);
            }
        }
    }

    pub fn handle_message(&mut self, message: ControlMessage, now: DateTime<Utc>) {
        match message {
            ControlMessage::Resume(key) => self.resume(key, now),
            ControlMessage::Modal(text) => {
                self.modal = Some(text);
                self.dirty = true;
            }
            ControlMessage::UploadDone(key) => {
                self.upload.advance_to(key);
                self.dirty = true;
                self.evaluate_close();
            }
            ControlMessage::UploadStart(key) => {
                if self.upload.first_key == 0 {
                    self.upload.first_key = key;
                    self.upload.started_at = Some(now);
                }
            }
            ControlMessage::UploadFailed(reason) => {
                log_warn!("peer upload failed: {reason}");
                self.upload.started_at = None;
                self.upload.failure = Some(reason);
                self.dirty = true;
            }
            ControlMessage::CfgAutoClose(enabled) => {
                self.cfg_auto_close = enabled;
                self.auto_close = enabled;
                if let Err(err) = self.settings.set_auto_close(enabled) {
                    log_error!("failed to persist auto-close: {err:#}");
                }
                self.evaluate_close();
            }
            ControlMessage::CfgWakeupTime(minutes) => {
                let wakeup = u16::try_from(minutes).ok();
                if let Err(err) = self.settings.set_wakeup_time(wakeup) {
                    log_error!("failed to persist wakeup time: {err:#}");
                }
                log_info!("wrote wakeup time {minutes}");
            }
            ControlMessage::CfgStart => {
                log_info!("starting configuration");
                self.auto_close = false;
                self.configuring = true;
            }
            ControlMessage::CfgEnd => {
                log_info!("end of configuration");
                self.auto_close = self.cfg_auto_close;
                self.configuring = false;
                self.evaluate_close();
            }
        }
    }

    /// Restart the pass from the minute after `key` (0 = full resend).
    ///
    /// The only cancellation mechanism: discards the loaded window and
    /// both tracks. If a record is in flight its ack simply continues
    /// from the new window.
    pub fn resume(&mut self, key: u32, now: DateTime<Utc>) {
        log_info!("received resume key {key}");

        self.device.reset(Some(now));
        self.upload.reset(None);
        self.window.reset(if key > 0 {
            (key as i64 + 1) * MINUTE_SECS
        } else {
            0
        });
        self.modal = None;
        self.dirty = true;

        if !self.phase.is_sending() {
            self.phase = Phase::Sending;
            self.checkpoint = 0;
            self.send_next(now);
        }
    }

    /// The in-flight record was delivered; produce the next one.
    pub fn on_outbox_sent(&mut self, now: DateTime<Utc>) {
        if self.phase != Phase::AwaitingAck {
            log_warn!("ack in phase {:?} ignored", self.phase);
            return;
        }
        self.phase = Phase::Sending;
        self.send_next(now);
    }

    /// The in-flight record failed at the channel level. No retry: the
    /// machine stalls until the peer drives a fresh resume.
    pub fn on_outbox_failed(&mut self, reason: &str) {
        log_error!("outbox failed: {reason}");
    }

    fn send_next(&mut self, now: DateTime<Utc>) {
        loop {
            if self.window.is_exhausted() {
                let start = self.window.next_page_start();
                if self
                    .window
                    .load_page(&mut self.source, start, now.timestamp())
                    .is_err()
                {
                    self.phase = Phase::Done;
                    self.checkpoint = self.device.current_key;
                    self.dirty = true;
                    self.evaluate_close();
                    return;
                }
            }

            let Some((sample, mask, key_secs)) = self.window.current() else {
                continue;
            };
            self.window.advance();

            let int_key = (key_secs / MINUTE_SECS) as u32;
            if key_secs % MINUTE_SECS != 0 {
                log_warn!(
                    "discarding {} second remainder from time key {int_key}",
                    key_secs % MINUTE_SECS
                );
            }

            if let Err(err) = encode_record(&mut self.record_buf, &sample, mask, key_secs) {
                // One bad sample must not stall the pass: skip it and
                // move on, never retrying the same slot.
                log_error!("skipping record {int_key}: {err}");
                continue;
            }

            match self.outbox.begin_send(int_key, &self.record_buf) {
                Ok(()) => {
                    self.device.advance_to(int_key);
                    self.dirty = true;
                }
                Err(err) => {
                    // Stalled: no record in flight, nothing more sent
                    // until the next resume.
                    log_error!("send of record {int_key} failed: {err}");
                }
            }
            self.phase = Phase::AwaitingAck;
            return;
        }
    }

    fn evaluate_close(&mut self) {
        if self.close_requested {
            return;
        }
        if auto_close_ready(
            self.auto_close,
            self.phase.is_sending(),
            self.device.current_key,
            self.upload.current_key,
        ) {
            log_info!("both tracks complete, closing session");
            self.close_requested = true;
            self.close_token.cancel();
        }
    }

    /// Re-derive the display snapshot if anything changed since the
    /// last call. Called from the periodic tick.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Option<DisplaySnapshot> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.snapshot(now))
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> DisplaySnapshot {
        if let Some(text) = &self.modal {
            return DisplaySnapshot::modal(text.clone());
        }
        DisplaySnapshot {
            modal: None,
            device: self.device.view(self.checkpoint, now),
            upload: self.upload.view(self.checkpoint, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityInterval, ActivityMask, MinuteSample};
    use crate::protocol::{TupleValue, MSG_KEY_CFG_AUTO_CLOSE, MSG_KEY_LAST_SENT};
    use chrono::TimeZone;

    /// Contiguous run of valid minutes starting at `base` (unix secs).
    struct FakeHistory {
        base: i64,
        total: usize,
    }

    impl HistorySource for FakeHistory {
        fn fetch_minute_samples(
            &mut self,
            slots: &mut [MinuteSample],
            from: &mut i64,
            to: &mut i64,
        ) -> usize {
            let end = self.base + MINUTE_SECS * self.total as i64;
            let start = (*from).max(self.base);
            if start >= end || start >= *to {
                return 0;
            }
            let avail = ((end.min(*to) - start) / MINUTE_SECS) as usize;
            let count = avail.min(slots.len());
            for slot in slots.iter_mut().take(count) {
                *slot = MinuteSample {
                    steps: 1,
                    valid: true,
                    ..MinuteSample::invalid()
                };
            }
            *from = start;
            *to = start + MINUTE_SECS * count as i64;
            count
        }

        fn activity_accessible(&self, _mask: ActivityMask, _from: i64, _to: i64) -> bool {
            false
        }

        fn each_activity_interval(
            &self,
            _mask: ActivityMask,
            _from: i64,
            _to: i64,
            _visit: &mut dyn FnMut(&ActivityInterval) -> bool,
        ) {
        }
    }

    #[derive(Default)]
    struct FakeOutbox {
        sent: Vec<(u32, String)>,
        fail_begin: bool,
    }

    impl Outbox for FakeOutbox {
        fn begin_send(&mut self, key: u32, line: &str) -> Result<(), SendError> {
            if self.fail_begin {
                return Err(SendError("radio off".into()));
            }
            self.sent.push((key, line.to_string()));
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        // well past the fake history so the horizon never truncates it
        Utc.timestamp_opt(MINUTE_SECS * 1_000_000, 0).unwrap()
    }

    fn settings() -> (Arc<SettingsStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        (store, dir)
    }

    fn engine(
        total: usize,
        auto_close: bool,
    ) -> (ExportEngine<FakeHistory, FakeOutbox>, tempfile::TempDir) {
        let (store, dir) = settings();
        store.set_auto_close(auto_close).unwrap();
        let engine = ExportEngine::new(
            FakeHistory { base: 0, total },
            FakeOutbox::default(),
            store,
            false,
            CancellationToken::new(),
        );
        (engine, dir)
    }

    #[test]
    fn empty_history_goes_straight_to_done() {
        let (mut engine, _dir) = engine(0, false);
        engine.resume(0, now());
        assert_eq!(engine.phase(), Phase::Done);
        assert_eq!(engine.checkpoint(), 0);
        assert!(engine.outbox.sent.is_empty());
    }

    #[test]
    fn only_one_record_in_flight() {
        let (mut engine, _dir) = engine(5, false);
        engine.resume(0, now());
        assert_eq!(engine.outbox.sent.len(), 1);
        assert_eq!(engine.phase(), Phase::AwaitingAck);

        // nothing else goes out until the ack arrives
        engine.handle_tuples(&[], now());
        assert_eq!(engine.outbox.sent.len(), 1);

        engine.on_outbox_sent(now());
        assert_eq!(engine.outbox.sent.len(), 2);
    }

    #[test]
    fn full_pass_visits_every_minute_then_completes() {
        let (mut engine, _dir) = engine(5, false);
        engine.resume(0, now());
        while engine.phase() == Phase::AwaitingAck {
            engine.on_outbox_sent(now());
        }
        assert_eq!(engine.phase(), Phase::Done);
        let keys: Vec<u32> = engine.outbox.sent.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
        assert_eq!(engine.checkpoint(), 4);
        assert_eq!(engine.device().current_key, 4);
    }

    #[test]
    fn resume_restarts_after_the_given_key() {
        let (mut engine, _dir) = engine(10, false);
        engine.resume(6, now());
        assert_eq!(engine.outbox.sent[0].0, 7);
    }

    #[test]
    fn resume_mid_transfer_resets_both_tracks_before_next_send() {
        let (mut engine, _dir) = engine(10, false);
        engine.resume(0, now());
        engine.on_outbox_sent(now());
        engine.on_outbox_sent(now());
        assert_eq!(engine.device().current_key, 2);
        engine.upload.advance_to(1);

        let sent_before = engine.outbox.sent.len();
        engine.resume(0, now());
        // still awaiting the in-flight ack: no new send yet, tracks clear
        assert_eq!(engine.outbox.sent.len(), sent_before);
        assert_eq!(engine.device().first_key, 0);
        assert_eq!(engine.device().current_key, 0);
        assert_eq!(engine.upload().first_key, 0);
        assert_eq!(engine.upload().current_key, 0);

        engine.on_outbox_sent(now());
        assert_eq!(engine.outbox.sent.len(), sent_before + 1);
        // restarted from the beginning
        assert_eq!(engine.outbox.sent.last().unwrap().0, 0);
    }

    #[test]
    fn done_is_reenterable() {
        let (mut engine, _dir) = engine(3, false);
        engine.resume(0, now());
        while engine.phase() == Phase::AwaitingAck {
            engine.on_outbox_sent(now());
        }
        assert_eq!(engine.phase(), Phase::Done);

        engine.resume(0, now());
        assert_eq!(engine.phase(), Phase::AwaitingAck);
    }

    /// Serves one page whose reported range is unrepresentable as a
    /// calendar time, so every record in it fails to encode.
    struct BadClockHistory {
        served: bool,
    }

    impl HistorySource for BadClockHistory {
        fn fetch_minute_samples(
            &mut self,
            slots: &mut [MinuteSample],
            from: &mut i64,
            to: &mut i64,
        ) -> usize {
            if self.served {
                return 0;
            }
            self.served = true;
            for slot in slots.iter_mut().take(3) {
                *slot = MinuteSample {
                    steps: 1,
                    valid: true,
                    ..MinuteSample::invalid()
                };
            }
            // far past chrono's maximum representable timestamp
            *from = 9_000_000_000_000;
            *to = *from + 3 * MINUTE_SECS;
            3
        }

        fn activity_accessible(&self, _mask: ActivityMask, _from: i64, _to: i64) -> bool {
            false
        }

        fn each_activity_interval(
            &self,
            _mask: ActivityMask,
            _from: i64,
            _to: i64,
            _visit: &mut dyn FnMut(&ActivityInterval) -> bool,
        ) {
        }
    }

    #[test]
    fn unencodable_samples_are_skipped_without_stalling() {
        let (store, _dir) = settings();
        let mut engine = ExportEngine::new(
            BadClockHistory { served: false },
            FakeOutbox::default(),
            store,
            false,
            CancellationToken::new(),
        );
        engine.resume(0, now());
        // every slot was skipped and the pass still ran to completion
        assert_eq!(engine.phase(), Phase::Done);
        assert!(engine.outbox.sent.is_empty());
    }

    #[test]
    fn begin_send_failure_stalls_until_resume() {
        let (mut engine, _dir) = engine(5, false);
        engine.outbox.fail_begin = true;
        engine.resume(0, now());
        assert_eq!(engine.phase(), Phase::AwaitingAck);
        assert!(engine.outbox.sent.is_empty());
        // the failed record was not counted as exported
        assert_eq!(engine.device().current_key, 0);

        engine.outbox.fail_begin = false;
        // a commit failure alone changes nothing either
        engine.on_outbox_failed("timeout");
        assert!(engine.outbox.sent.is_empty());
    }

    #[test]
    fn upload_done_with_auto_close_fires_close_exactly_once() {
        let (mut engine, _dir) = engine(3, true);
        engine.resume(0, now());
        while engine.phase() == Phase::AwaitingAck {
            engine.on_outbox_sent(now());
        }
        assert_eq!(engine.phase(), Phase::Done);
        assert!(!engine.close_requested());

        engine.handle_message(ControlMessage::UploadDone(2), now());
        assert!(engine.close_requested());
        assert!(engine.close_token.is_cancelled());

        // the latch keeps later events from re-firing the signal
        engine.handle_message(ControlMessage::UploadDone(3), now());
        assert!(engine.close_requested());
    }

    #[test]
    fn upload_behind_device_does_not_close() {
        let (mut engine, _dir) = engine(3, true);
        engine.resume(0, now());
        while engine.phase() == Phase::AwaitingAck {
            engine.on_outbox_sent(now());
        }
        engine.handle_message(ControlMessage::UploadDone(1), now());
        assert!(!engine.close_requested());
    }

    #[test]
    fn configuration_session_suppresses_auto_close() {
        let (mut engine, _dir) = engine(3, true);
        engine.resume(0, now());
        while engine.phase() == Phase::AwaitingAck {
            engine.on_outbox_sent(now());
        }

        engine.handle_message(ControlMessage::CfgStart, now());
        assert!(engine.is_configuring());
        engine.handle_message(ControlMessage::UploadDone(2), now());
        assert!(!engine.close_requested());

        // Ending the configuration restores auto-close, and the session
        // must close right away without waiting for another upload ack.
        engine.handle_message(ControlMessage::CfgEnd, now());
        assert!(!engine.is_configuring());
        assert!(engine.close_requested());
    }

    #[test]
    fn malformed_resume_field_leaves_state_untouched() {
        let (mut engine, _dir) = engine(5, false);
        engine.resume(0, now());
        let sent_before = engine.outbox.sent.len();

        engine.handle_tuples(
            &[Tuple::new(MSG_KEY_LAST_SENT, TupleValue::Text("junk".into()))],
            now(),
        );
        assert_eq!(engine.outbox.sent.len(), sent_before);
        assert_eq!(engine.phase(), Phase::AwaitingAck);
    }

    #[test]
    fn auto_close_toggle_is_persisted_immediately() {
        let (mut engine, _dir) = engine(3, false);
        engine.handle_tuples(
            &[Tuple::new(MSG_KEY_CFG_AUTO_CLOSE, TupleValue::UInt(1))],
            now(),
        );
        assert!(engine.settings.get().auto_close);
    }

    #[test]
    fn modal_message_takes_over_the_display() {
        let (mut engine, _dir) = engine(3, false);
        engine.resume(0, now());
        engine.handle_message(ControlMessage::Modal("Not configured".into()), now());
        let snap = engine.refresh(now()).expect("dirty after modal");
        assert_eq!(snap.modal.as_deref(), Some("Not configured"));
        assert!(engine.refresh(now()).is_none());
    }
}
