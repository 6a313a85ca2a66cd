#![forbid(unsafe_code)]

use crate::backoff::{Backoff, BackoffPolicy};
use crate::fanout::FanoutHub;
use crate::session::{SessionContext, SessionEnd, run_session};
use rg_storage::SqliteStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;

/// Store handle shared between the command loop and the channel. Locks are
/// held for one transaction at a time, never across network I/O.
pub type SharedStore = Arc<Mutex<SqliteStore>>;

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub url: String,
    pub backoff: BackoffPolicy,
    pub outbox_poll: Duration,
    pub outbox_batch: usize,
    /// Delivered outbox rows older than this are deleted while draining.
    pub outbox_retention: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffPolicy::default(),
            outbox_poll: Duration::from_secs(2),
            outbox_batch: 64,
            outbox_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Connecting,
    Connected,
    Backoff,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub url: String,
    /// Successful connects since start.
    pub connects: u64,
    /// Outbox rows written to the socket.
    pub delivered: u64,
    /// Start frames that moved a trial to running.
    pub started: u64,
}

pub(crate) struct Shared {
    pub(crate) wake: Notify,
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) status: watch::Sender<ChannelStatus>,
}

impl Shared {
    pub(crate) fn set_state(&self, state: ChannelState) {
        self.status.send_modify(|status| status.state = state);
    }
}

/// Cloneable handle to the supervised control-channel task.
#[derive(Clone)]
pub struct ControlChannel {
    shared: Arc<Shared>,
    join: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("status", &*self.shared.status.borrow())
            .finish()
    }
}

impl ControlChannel {
    /// Start the supervisor on the current tokio runtime.
    pub fn spawn(config: ChannelConfig, store: SharedStore, fanout: FanoutHub) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (status, _) = watch::channel(ChannelStatus {
            state: ChannelState::Connecting,
            url: config.url.clone(),
            connects: 0,
            delivered: 0,
            started: 0,
        });
        let shared = Arc::new(Shared {
            wake: Notify::new(),
            shutdown,
            status,
        });
        let join = tokio::spawn(supervise(config, store, fanout, Arc::clone(&shared)));
        Self {
            shared,
            join: Arc::new(std::sync::Mutex::new(Some(join))),
        }
    }

    /// Wake the sender after committing writes that queued notifications.
    pub fn outbox_ready(&self) {
        self.shared.wake.notify_one();
    }

    pub fn status(&self) -> ChannelStatus {
        self.shared.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }

    /// Close the connection and wait for the supervisor to exit. Later calls
    /// (from any clone) return immediately.
    pub async fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
        let join = match self.join.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(join) = join {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "control channel task failed");
            }
        }
    }
}

async fn supervise(config: ChannelConfig, store: SharedStore, fanout: FanoutHub, shared: Arc<Shared>) {
    let mut backoff = Backoff::new(config.backoff);
    let mut shutdown = shared.shutdown.subscribe();
    let context = SessionContext {
        config: &config,
        store: &store,
        fanout: &fanout,
        shared: &shared,
    };

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        shared.set_state(ChannelState::Connecting);
        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
        };

        match connected {
            Ok((stream, _)) => {
                let opened = Instant::now();
                let frames_before = frames_moved(&shared);
                shared.status.send_modify(|status| {
                    status.state = ChannelState::Connected;
                    status.connects += 1;
                });
                tracing::info!(url = %config.url, "connected to task manager");
                match run_session(stream, &context, &mut shutdown).await {
                    Ok(SessionEnd::Shutdown) => break,
                    Ok(SessionEnd::Closed) => {
                        tracing::info!(url = %config.url, "task manager closed the connection");
                    }
                    Err(err) => {
                        tracing::warn!(url = %config.url, error = %err, "control channel session failed");
                    }
                }
                backoff.session_ended(opened.elapsed(), frames_moved(&shared) > frames_before);
            }
            Err(err) => {
                tracing::warn!(url = %config.url, error = %err, "cannot reach task manager");
            }
        }

        let delay = backoff.next_delay();
        shared.set_state(ChannelState::Backoff);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ChannelState::Stopped);
    tracing::info!("control channel stopped");
}

fn frames_moved(shared: &Shared) -> u64 {
    let status = shared.status.borrow();
    status.delivered + status.started
}
