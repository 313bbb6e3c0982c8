//! Sender side: microphone → blocks → relay.
//!
//! The microphone is opened before the connection so a missing or denied
//! device fails the attempt without any network traffic.  Anything captured
//! while the handshake runs is discarded when streaming begins.

use std::future::Future;

use crate::audio::{
    build_strategy, AudioCapture, CaptureError, CaptureNode, CaptureStrategy, CaptureStrategyKind,
};
use crate::auth::CredentialAcquirer;
use crate::config::{AppConfig, AudioConfig};
use crate::transport::{Connector, Role, Transport, TransportError};

use super::status::{update_status, SessionStatus, SharedStatus};
use super::{record_failure, SessionError};

// ---------------------------------------------------------------------------
// CaptureState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Microphone acquired, nothing sent yet.
    Idle,
    Capturing,
    /// Microphone released.  Terminal.
    Stopped,
}

// ---------------------------------------------------------------------------
// CapturePipeline
// ---------------------------------------------------------------------------

/// Owns an open microphone and forwards its blocks to a transport.
///
/// Dropping the pipeline stops it.
pub struct CapturePipeline {
    state: CaptureState,
    node: Option<Box<dyn CaptureNode>>,
    strategy: Box<dyn CaptureStrategy>,
    status: SharedStatus,
}

impl CapturePipeline {
    /// Wrap a started capture node and the strategy fed by it.
    pub fn acquire(
        node: Box<dyn CaptureNode>,
        strategy: Box<dyn CaptureStrategy>,
        status: SharedStatus,
    ) -> Self {
        Self {
            state: CaptureState::Idle,
            node: Some(node),
            strategy,
            status,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn strategy_kind(&self) -> CaptureStrategyKind {
        self.strategy.kind()
    }

    /// Stream blocks into `transport` until `shutdown` resolves, the relay
    /// closes the connection, the transport fails or the source ends.
    ///
    /// The pipeline is stopped and the transport closed on every exit path.
    /// Returns the number of blocks sent.
    pub async fn run<T>(
        &mut self,
        transport: &mut T,
        shutdown: impl Future<Output = ()>,
    ) -> Result<u64, TransportError>
    where
        T: Transport + ?Sized,
    {
        if self.state != CaptureState::Idle {
            log::warn!("capture: pipeline already {:?}, not starting", self.state);
            return Ok(0);
        }

        self.strategy.discard_pending();
        self.state = CaptureState::Capturing;
        update_status(&self.status, |b| b.set(SessionStatus::Streaming));
        log::info!("capture: streaming ({} strategy)", self.strategy.kind().label());

        tokio::pin!(shutdown);
        let mut sent = 0u64;

        let result = loop {
            let block = tokio::select! {
                _ = &mut shutdown => {
                    log::info!("capture: stop requested");
                    break Ok(sent);
                }
                incoming = transport.recv() => match incoming {
                    None => {
                        log::info!("capture: relay closed the connection");
                        break Ok(sent);
                    }
                    Some(Err(e)) => break Err(e),
                    Some(Ok(_)) => {
                        log::debug!("capture: ignoring message on sender connection");
                        continue;
                    }
                },
                block = self.strategy.next_block() => match block {
                    Some(block) => block,
                    None => {
                        log::warn!("capture: audio source ended");
                        break Ok(sent);
                    }
                },
            };

            if block.is_empty() {
                continue;
            }
            if let Err(e) = transport.send(block.into_wire()).await {
                break Err(e);
            }
            sent += 1;
            update_status(&self.status, |b| b.blocks_sent += 1);
        };

        self.stop();
        if let Err(e) = transport.close().await {
            log::debug!("capture: close after stop failed: {e}");
        }

        match &result {
            Ok(n) => {
                log::info!("capture: stopped after {n} blocks");
                update_status(&self.status, |b| b.set(SessionStatus::Stopped));
            }
            Err(e) => {
                update_status(&self.status, |b| b.fail(format!("stream lost: {e}")));
            }
        }
        result
    }

    /// Release the microphone.  Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(node) = self.node.take() {
            node.release();
            log::info!("capture: microphone released");
        }
        if self.state != CaptureState::Stopped {
            self.strategy.discard_pending();
            self.state = CaptureState::Stopped;
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Open the configured microphone and start its capture stream.
///
/// # Errors
///
/// [`CaptureError::CaptureUnavailable`] when there is no usable input device
/// or access is denied.
pub fn open_microphone(
    audio: &AudioConfig,
    status: SharedStatus,
) -> Result<CapturePipeline, CaptureError> {
    let capture = AudioCapture::open(audio.input_device.as_deref(), audio.sample_rate)?;
    let kind = CaptureStrategyKind::probe(capture.sample_format(), audio.strategy);
    let (strategy, sink) = build_strategy(
        kind,
        audio.block_size,
        capture.sample_rate(),
        audio.sample_rate,
    );
    let node = capture.start(sink)?;

    log::info!(
        "capture: {} Hz, {} ch, {:?} → {} Hz mono ({} strategy)",
        capture.sample_rate(),
        capture.channels(),
        capture.sample_format(),
        audio.sample_rate,
        kind.label()
    );
    Ok(CapturePipeline::acquire(Box::new(node), strategy, status))
}

/// Full sender session: credential, microphone, connection, streaming.
///
/// The future is `!Send` (the cpal stream lives inside it); drive it with
/// `block_on` on the thread that should own the device.
pub async fn run_sender(
    config: &AppConfig,
    acquirer: &CredentialAcquirer,
    connector: &dyn Connector,
    status: &SharedStatus,
    shutdown: impl Future<Output = ()>,
) -> Result<(), SessionError> {
    update_status(status, |b| {
        b.set(SessionStatus::Acquiring);
        b.channel = None;
    });
    let credential = acquirer.acquire().map_err(|e| record_failure(status, e))?;

    let mut pipeline =
        open_microphone(&config.audio, status.clone()).map_err(|e| record_failure(status, e))?;

    update_status(status, |b| b.set(SessionStatus::Connecting));
    tokio::pin!(shutdown);
    let connected = tokio::select! {
        _ = &mut shutdown => {
            log::info!("session: stop requested while connecting");
            pipeline.stop();
            update_status(status, |b| b.set(SessionStatus::Stopped));
            return Ok(());
        }
        result = connector.connect(Some(credential), &Role::Sender) => result,
    };
    let mut transport = connected.map_err(|e| record_failure(status, e))?;

    pipeline.run(&mut transport, shutdown).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
