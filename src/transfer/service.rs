use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::info;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    history::HistorySource, progress::DisplaySnapshot, protocol::Tuple, settings::SettingsStore,
};

use super::{ExportEngine, Outbox};

const DISPLAY_TICK_SECS: u64 = 1;
const EVENT_QUEUE_DEPTH: usize = 32;

/// Everything that can happen to the engine, funneled through one queue
/// so all state transitions run on a single task.
#[derive(Debug)]
pub enum EngineEvent {
    /// An inbound control dictionary from the peer.
    Control(Vec<Tuple>),
    /// The in-flight record was acknowledged.
    OutboxSent,
    /// The in-flight record failed at the channel level.
    OutboxFailed(String),
}

/// Async front of the export engine.
///
/// Owns the engine on a spawned task: events arrive over an mpsc queue,
/// a one-second ticker re-derives the display snapshot when dirty, and
/// the cancellation token ends the session (either from the engine's
/// auto-close or from the host).
pub struct ExportService {
    events: mpsc::Sender<EngineEvent>,
    snapshot_rx: watch::Receiver<DisplaySnapshot>,
    close_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExportService {
    pub fn spawn<S, O>(
        source: S,
        outbox: O,
        settings: Arc<SettingsStore>,
        launched_by_scheduler: bool,
    ) -> Self
    where
        S: HistorySource + Send + 'static,
        O: Outbox + Send + 'static,
    {
        let close_token = CancellationToken::new();
        let mut engine = ExportEngine::new(
            source,
            outbox,
            settings,
            launched_by_scheduler,
            close_token.clone(),
        );

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot(Utc::now()));
        let session_id = Uuid::new_v4();
        let token = close_token.clone();

        let worker = tokio::spawn(async move {
            info!("export session {session_id} started");
            let mut ticker = time::interval(Duration::from_secs(DISPLAY_TICK_SECS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = event_rx.recv() => {
                        let Some(event) = event else { break };
                        let now = Utc::now();
                        match event {
                            EngineEvent::Control(tuples) => engine.handle_tuples(&tuples, now),
                            EngineEvent::OutboxSent => engine.on_outbox_sent(now),
                            EngineEvent::OutboxFailed(reason) => engine.on_outbox_failed(&reason),
                        }
                    }
                    _ = ticker.tick() => {
                        if let Some(snapshot) = engine.refresh(Utc::now()) {
                            let _ = snapshot_tx.send(snapshot);
                        }
                    }
                }
            }
            info!("export session {session_id} finished");
        });

        Self {
            events: event_tx,
            snapshot_rx,
            close_token,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Feed an inbound control dictionary to the engine.
    pub async fn control(&self, tuples: Vec<Tuple>) -> Result<()> {
        self.send(EngineEvent::Control(tuples)).await
    }

    /// Report that the channel delivered the in-flight record.
    pub async fn outbox_sent(&self) -> Result<()> {
        self.send(EngineEvent::OutboxSent).await
    }

    /// Report that the channel failed to deliver the in-flight record.
    pub async fn outbox_failed(&self, reason: impl Into<String>) -> Result<()> {
        self.send(EngineEvent::OutboxFailed(reason.into())).await
    }

    async fn send(&self, event: EngineEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("export engine task is gone"))
    }

    /// Latest display snapshot; refreshed at most once per tick.
    pub fn snapshot(&self) -> DisplaySnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Token cancelled when the session ends, by auto-close or by the
    /// host calling [`ExportService::close`].
    pub fn close_token(&self) -> CancellationToken {
        self.close_token.clone()
    }

    pub fn close(&self) {
        self.close_token.cancel();
    }

    /// Wait for the engine task to finish after a close.
    pub async fn join(&self) -> Result<()> {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            handle.await.map_err(|err| anyhow!("engine task: {err}"))?;
        }
        Ok(())
    }
}
