//! The controller event loop.
//!
//! One task owns the session and the dispatcher. A reader task decodes
//! inbound frames into a channel and a writer task drains encoded frames
//! onto the port, so neither direction blocks the other.

use std::time::Instant;

use bytes::Bytes;
use futures_util::StreamExt;
use groundlink_dispatch::{DispatchStats, Dispatcher};
use groundlink_frame::{Frame, FrameError, FrameType, LinkCodec};
use groundlink_session::{LinkError, LinkState, Session, SessionEvent, SessionStats};
use groundlink_transport::PortListener;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, TransportMode};
use crate::error::{ControllerError, Result};

const CHANNEL_CAPACITY: usize = 64;

/// Summary of a controller run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub sessions_established: u64,
    pub link_losses: u64,
    pub commands_received: u64,
    pub commands_rejected: u64,
    /// TELEMETRY frames acknowledged by the peer.
    pub telemetry_sent: u64,
    /// Corrupted frames discarded by the deframer.
    pub frame_errors: u64,
    /// Outbound frames dropped because the writer fell behind.
    pub frames_dropped: u64,
    pub dispatch: DispatchStats,
    /// Counters of the last session, if one was started.
    pub last_session: Option<SessionStats>,
}

/// Ground-side controller: one link, one peer.
#[derive(Debug, Clone)]
pub struct Controller {
    config: ControllerConfig,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Open the configured transport and serve it until shutdown or EOF.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunReport> {
        let addr = self.config.link_addr()?;
        match self.config.transport.mode {
            TransportMode::Listen => {
                // Held until the run ends so a Unix socket path stays in place.
                let listener = PortListener::bind(&addr).await?;
                let port = tokio::select! {
                    _ = shutdown.cancelled() => return Ok(RunReport::default()),
                    accepted = listener.accept() => accepted?,
                };
                info!(addr = %listener.local_addr(), "peer connected");
                self.serve(port, shutdown).await
            }
            TransportMode::Connect => {
                info!(%addr, "connecting to peer");
                let port = tokio::select! {
                    _ = shutdown.cancelled() => return Ok(RunReport::default()),
                    connected = groundlink_transport::connect(&addr) => connected?,
                };
                self.serve(port, shutdown).await
            }
        }
    }

    /// Run the link over an already open port.
    ///
    /// Returns the run report on shutdown and
    /// [`ControllerError::TransportClosed`] when the port ends first.
    pub async fn serve<P>(&self, port: P, shutdown: CancellationToken) -> Result<RunReport>
    where
        P: AsyncRead + AsyncWrite + Send + 'static,
    {
        let dispatcher = self.config.build_dispatcher()?;
        let session = Session::new(self.config.session_config())?;

        let (read_half, write_half) = tokio::io::split(port);
        let codec = LinkCodec::new(self.config.link.max_payload_size);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_frames(FramedRead::new(read_half, codec), inbound_tx));
        let writer = tokio::spawn(write_frames(write_half, outbound_rx));

        let mut owner = LinkOwner {
            config: &self.config,
            session,
            dispatcher,
            inbound: inbound_rx,
            outbound: outbound_tx,
            resync_at: None,
            draining: false,
            report: RunReport::default(),
        };

        let outcome = owner.run(&shutdown).await;
        match &outcome {
            Ok(()) => {
                info!("shutting down");
                owner.drain().await;
            }
            Err(err) => {
                warn!(error = %err, "controller stopped");
                owner.dispatcher.shutdown();
            }
        }
        let report = owner.into_report();

        let writer_abort = writer.abort_handle();
        let flush_timeout = self.config.session_config().retry_timeout;
        match tokio::time::timeout(flush_timeout, writer).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => debug!(error = %err, "link writer ended with error"),
            Ok(Err(err)) => warn!(error = %err, "link writer task failed"),
            Err(_) => {
                warn!(timeout = ?flush_timeout, "link writer stalled, dropping unsent frames");
                writer_abort.abort();
            }
        }
        reader.abort();

        info!(
            sessions = report.sessions_established,
            link_losses = report.link_losses,
            commands = report.commands_received,
            frame_errors = report.frame_errors,
            "controller run finished"
        );
        outcome.map(|()| report)
    }
}

/// State owned by the event loop. All session mutation happens here.
struct LinkOwner<'a> {
    config: &'a ControllerConfig,
    session: Session,
    dispatcher: Dispatcher,
    inbound: mpsc::Receiver<std::result::Result<Frame, FrameError>>,
    outbound: mpsc::Sender<Bytes>,
    resync_at: Option<Instant>,
    draining: bool,
    report: RunReport,
}

impl LinkOwner<'_> {
    async fn run(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let mut telemetry = tokio::time::interval(self.config.telemetry_interval());
        telemetry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.session.start_sync(now());
        loop {
            self.drive()?;
            let wake = self.next_wake();

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return Ok(()),
                item = self.inbound.recv() => match item {
                    Some(Ok(frame)) => self.session.handle_frame(frame, now()),
                    Some(Err(err)) => self.on_frame_error(err),
                    None => return Err(ControllerError::TransportClosed),
                },
                Some(completion) = self.dispatcher.next_completion(), if self.dispatcher.has_pending() => {
                    self.dispatcher.on_completion(completion);
                }
                _ = sleep_until(wake), if wake.is_some() => self.on_deadline()?,
                _ = telemetry.tick() => {
                    if self.session.state() == LinkState::Up {
                        self.dispatcher.collect_telemetry();
                    }
                }
            }
        }
    }

    /// Process session events, hand telemetry to the session and pass its
    /// transmit queue to the writer.
    ///
    /// Never waits on the writer. When the writer falls behind, frames are
    /// dropped and the session's retransmission recovers them.
    fn drive(&mut self) -> Result<()> {
        while let Some(event) = self.session.poll_event() {
            self.on_event(event);
        }
        if !self.draining {
            self.pump_telemetry();
        }
        while let Some(bytes) = self.session.poll_transmit() {
            match self.outbound.try_send(bytes) {
                Ok(()) => {}
                Err(TrySendError::Full(bytes)) => {
                    self.report.frames_dropped += 1;
                    warn!(len = bytes.len(), "link writer backed up, dropping frame");
                }
                Err(TrySendError::Closed(_)) => return Err(ControllerError::TransportClosed),
            }
        }
        Ok(())
    }

    fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StateChanged { to, .. } => {
                if to == LinkState::Up {
                    self.report.sessions_established += 1;
                }
            }
            SessionEvent::Delivered(frame) => match frame.kind {
                FrameType::Command if self.draining => {
                    warn!(seq = frame.seq, "shutting down, command not executed");
                }
                FrameType::Command => {
                    self.report.commands_received += 1;
                    if self.dispatcher.on_command_frame(&frame).is_err() {
                        self.report.commands_rejected += 1;
                    }
                }
                other => debug!(kind = %other, seq = frame.seq, "ignoring delivered frame"),
            },
            SessionEvent::Acknowledged { seq } => {
                debug!(seq, "telemetry delivered");
                self.report.telemetry_sent += 1;
                self.dispatcher.confirm_outbound();
            }
            SessionEvent::LinkDown(err) => {
                self.report.link_losses += 1;
                self.dispatcher.requeue_outbound();
                let delay = self.config.resync_delay();
                warn!(error = %err, resync_in = ?delay, "link lost");
                self.resync_at = Some(now() + delay);
            }
        }
    }

    fn pump_telemetry(&mut self) {
        while self.session.can_send() {
            let Some(payload) = self.dispatcher.next_outbound() else {
                break;
            };
            match self.session.send(FrameType::Telemetry, payload, now()) {
                Ok(_) => {}
                Err(err @ (LinkError::NotConnected | LinkError::WindowFull(_))) => {
                    debug!(error = %err, "telemetry record deferred");
                    self.dispatcher.requeue_outbound();
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "telemetry record dropped");
                    self.dispatcher.confirm_outbound();
                }
            }
        }
    }

    fn on_frame_error(&mut self, err: FrameError) {
        self.report.frame_errors += 1;
        debug!(error = %err, "discarding corrupted frame");
    }

    fn on_deadline(&mut self) -> Result<()> {
        let now = now();
        match self.resync_at {
            Some(at) if now >= at => {
                self.resync_at = None;
                self.session = Session::new(self.config.session_config())?;
                info!("starting new handshake");
                self.session.start_sync(now);
            }
            _ => self.session.handle_timeout(now),
        }
        Ok(())
    }

    fn next_wake(&self) -> Option<Instant> {
        [self.session.poll_deadline(), self.resync_at]
            .into_iter()
            .flatten()
            .min()
    }

    /// Wait at most one retry timeout for the outstanding frame, then close.
    async fn drain(&mut self) {
        self.draining = true;
        if self.session.has_outstanding() {
            let deadline = now() + self.config.session_config().retry_timeout;
            debug!("waiting for outstanding acknowledgement");
            while self.session.has_outstanding() {
                tokio::select! {
                    item = self.inbound.recv() => match item {
                        Some(Ok(frame)) => self.session.handle_frame(frame, now()),
                        Some(Err(err)) => self.on_frame_error(err),
                        None => break,
                    },
                    _ = sleep_until(Some(deadline)) => break,
                }
                if self.drive().is_err() {
                    break;
                }
            }
        }

        self.session.close(now());
        self.dispatcher.shutdown();
        if let Err(err) = self.drive() {
            debug!(error = %err, "writer gone during shutdown");
        }
    }

    fn into_report(self) -> RunReport {
        let mut report = self.report;
        report.dispatch = self.dispatcher.stats();
        report.last_session = Some(self.session.stats());
        report
    }
}

async fn read_frames<R>(
    mut frames: FramedRead<R, LinkCodec>,
    inbound: mpsc::Sender<std::result::Result<Frame, FrameError>>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(item) = frames.next().await {
        let decoded = match item {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "link read failed");
                break;
            }
        };
        if inbound.send(decoded).await.is_err() {
            break;
        }
    }
    debug!("link reader finished");
}

async fn write_frames<W>(mut port: W, mut outbound: mpsc::Receiver<Bytes>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = outbound.recv().await {
        port.write_all(&bytes).await?;
        port.flush().await?;
    }
    port.shutdown().await
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

/// Session clock, taken from tokio so paused test time applies.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
