//! Listener side: one playback session per joined channel.
//!
//! Each joined channel runs as its own tokio task that owns the transport and
//! the [`PlaybackScheduler`]; nothing else touches them, so the scheduler
//! needs no lock.  The task multiplexes three inputs:
//!
//! ```text
//! select! {
//!     stop signal           ─▶ leave
//!     PlaybackEvent         ─▶ scheduler.on_event
//!     transport.recv()      ─▶ scheduler.on_block_arrived
//! }
//! ```
//!
//! [`ListenerCoordinator`] starts and stops those tasks.  `leave` and
//! `switch_to` await the task, so by the time they return the output device
//! is disconnected and no queued block can still play.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::auth::CredentialAcquirer;
use crate::config::AppConfig;
use crate::playback::{OutputFactory, PlaybackEvent, PlaybackScheduler};
use crate::transport::{ChannelKey, Connector, Role, Transport};

use super::status::{update_status, SessionStatus, SharedStatus};
use super::{record_failure, SessionError};

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Everything a listening session needs, passed explicitly.
pub struct SessionContext {
    pub config: AppConfig,
    pub connector: Arc<dyn Connector>,
    pub outputs: Arc<dyn OutputFactory>,
    pub status: SharedStatus,
    /// When set, a fresh credential is acquired for every receiver
    /// connection and dropped once the handshake is done.
    pub credentials: Option<Arc<CredentialAcquirer>>,
}

/// Upper bound on the closing handshake once the output is already gone.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// ListenerCoordinator
// ---------------------------------------------------------------------------

struct ActiveSession {
    channel: ChannelKey,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns at most one listening session at a time.
pub struct ListenerCoordinator {
    ctx: Arc<SessionContext>,
    active: Option<ActiveSession>,
}

impl ListenerCoordinator {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            active: None,
        }
    }

    pub fn status(&self) -> &SharedStatus {
        &self.ctx.status
    }

    /// Channel of the session that is still running, if any.
    pub fn active_channel(&self) -> Option<&ChannelKey> {
        self.active
            .as_ref()
            .filter(|a| !a.task.is_finished())
            .map(|a| &a.channel)
    }

    /// Start listening to `channel`.
    ///
    /// Joining the channel that is already joined does nothing.
    ///
    /// # Errors
    ///
    /// * [`SessionError::AlreadyJoined`] while another channel is active.
    /// * Transport or output failures; the board is set to `Error` and no
    ///   session is left behind.
    pub async fn join(&mut self, channel: ChannelKey) -> Result<(), SessionError> {
        self.reap();
        if let Some(active) = &self.active {
            if active.channel == channel {
                log::debug!("session: already listening to {channel}");
                return Ok(());
            }
            return Err(SessionError::AlreadyJoined(active.channel.clone()));
        }

        let ctx = Arc::clone(&self.ctx);
        let credential = match &ctx.credentials {
            Some(acquirer) => {
                update_status(&ctx.status, |b| b.set(SessionStatus::Acquiring));
                Some(acquirer.acquire().map_err(|e| record_failure(&ctx.status, e))?)
            }
            None => None,
        };
        update_status(&ctx.status, |b| {
            b.set(SessionStatus::Connecting);
            b.channel = Some(channel.clone());
        });

        let role = Role::Receiver(channel.clone());
        let mut transport = ctx
            .connector
            .connect(credential, &role)
            .await
            .map_err(|e| record_failure(&ctx.status, e))?;

        let rate = ctx.config.audio.sample_rate;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let output = match ctx.outputs.open(rate, event_tx) {
            Ok(output) => output,
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    log::debug!("session: close after output failure: {close_err}");
                }
                return Err(record_failure(&ctx.status, e));
            }
        };
        let scheduler = PlaybackScheduler::new(output, rate, &ctx.config.playback);

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_session(
            Arc::clone(&ctx),
            channel.clone(),
            transport,
            scheduler,
            event_rx,
            stop_rx,
        ));

        update_status(&ctx.status, |b| b.set(SessionStatus::Listening));
        log::info!("session: listening to {channel}");
        self.active = Some(ActiveSession {
            channel,
            stop: stop_tx,
            task,
        });
        Ok(())
    }

    /// Stop listening to `channel`.  A channel that is not joined is ignored.
    pub async fn leave(&mut self, channel: &ChannelKey) -> Result<(), SessionError> {
        let joined = self.active.as_ref().is_some_and(|a| &a.channel == channel);
        if !joined {
            log::debug!("session: not listening to {channel}, nothing to leave");
            return Ok(());
        }
        self.stop().await
    }

    /// Leave whatever is joined, fully, then join `channel`.
    pub async fn switch_to(&mut self, channel: ChannelKey) -> Result<(), SessionError> {
        if self.active_channel() == Some(&channel) {
            return Ok(());
        }
        self.stop().await?;
        self.join(channel).await
    }

    /// Tear down the active session, if any, and wait for it to finish.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        // the task may already have ended on its own
        let _ = active.stop.send(());
        active
            .task
            .await
            .map_err(|e| record_failure(&self.ctx.status, SessionError::Task(e.to_string())))?;
        log::info!("session: left {}", active.channel);
        Ok(())
    }

    /// Forget a session whose task has already ended.
    fn reap(&mut self) {
        if self.active.as_ref().is_some_and(|a| a.task.is_finished()) {
            if let Some(done) = self.active.take() {
                log::debug!("session: {} had already ended", done.channel);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

async fn run_session(
    ctx: Arc<SessionContext>,
    channel: ChannelKey,
    mut transport: Box<dyn Transport>,
    mut scheduler: PlaybackScheduler,
    mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let result: Result<(), SessionError> = loop {
        tokio::select! {
            _ = &mut stop => break Ok(()),
            Some(event) = events.recv() => {
                if let Err(e) = scheduler.on_event(event) {
                    break Err(e.into());
                }
            }
            incoming = transport.recv() => match incoming {
                Some(Ok(bytes)) => {
                    update_status(&ctx.status, |b| b.blocks_received += 1);
                    if let Err(e) = scheduler.on_block_arrived(&bytes) {
                        break Err(e.into());
                    }
                    let dropped = scheduler.dropped_blocks();
                    update_status(&ctx.status, |b| b.blocks_dropped = dropped);
                }
                Some(Err(e)) => break Err(e.into()),
                None => {
                    log::info!("session: relay closed channel {channel}");
                    break Ok(());
                }
            },
        }
    };

    // silence first: a stalled close must not keep queued audio playing
    scheduler.shutdown();
    match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("session: close on {channel} failed: {e}"),
        Err(_) => log::warn!("session: close on {channel} timed out, dropping the connection"),
    }

    match result {
        Ok(()) => update_status(&ctx.status, |b| {
            b.set(SessionStatus::Stopped);
            b.channel = None;
        }),
        Err(e) => {
            record_failure(&ctx.status, e);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
