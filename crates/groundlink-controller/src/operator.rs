//! Blocking operator side of the link.
//!
//! Runs the same [`Session`] state machine as the controller over a plain
//! `Read + Write` stream. The CLI `send` and `monitor` commands use it.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use groundlink_dispatch::{Command, CommandResult, TelemetryMessage};
use groundlink_frame::{FrameConfig, FrameError, FrameReader, FrameType, FrameWriter};
use groundlink_session::{LinkError, LinkState, Session, SessionConfig, SessionEvent, SessionStats};
use groundlink_transport::{LinkAddr, LinkStream};
use tracing::debug;

use crate::error::{ControllerError, Result};

/// Read timeout used to keep session timers running while idle.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct OperatorConsole<T> {
    reader: FrameReader<T>,
    writer: FrameWriter<T>,
    session: Session,
    inbox: VecDeque<TelemetryMessage>,
    frame_errors: u64,
}

impl OperatorConsole<LinkStream> {
    /// Connect to a controller (or anything speaking the link protocol).
    pub fn connect(addr: &LinkAddr, config: SessionConfig) -> Result<Self> {
        let stream = LinkStream::connect(addr)?;
        let write_half = stream.try_clone()?;
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
            read_timeout: Some(POLL_INTERVAL),
            write_timeout: Some(config.retry_timeout),
        };
        let reader = FrameReader::with_config_link(stream, frame_config.clone())?;
        let writer = FrameWriter::with_config_link(write_half, frame_config)?;
        Self::new(reader, writer, config)
    }
}

impl<T: Read + Write> OperatorConsole<T> {
    /// The reader's stream must have a read timeout; a read that blocks
    /// forever also stops the session timers.
    pub fn new(reader: FrameReader<T>, writer: FrameWriter<T>, config: SessionConfig) -> Result<Self> {
        Ok(Self {
            reader,
            writer,
            session: Session::new(config)?,
            inbox: VecDeque::new(),
            frame_errors: 0,
        })
    }

    pub fn state(&self) -> LinkState {
        self.session.state()
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn frame_errors(&self) -> u64 {
        self.frame_errors
    }

    /// Sync with the peer.
    pub fn handshake(&mut self) -> Result<()> {
        let timeout = self.session.config().handshake_timeout;
        let deadline = Instant::now() + timeout + POLL_INTERVAL;
        self.session.start_sync(Instant::now());
        loop {
            match self.next_event(deadline)? {
                Some(SessionEvent::StateChanged {
                    to: LinkState::Up, ..
                }) => return Ok(()),
                Some(SessionEvent::LinkDown(err)) => return Err(err.into()),
                Some(other) => self.stash(other),
                None => return Err(ControllerError::Timeout(timeout)),
            }
        }
    }

    /// Send a command and wait for its RESULT telemetry.
    ///
    /// Readings that arrive meanwhile are kept for [`Self::next_telemetry`].
    pub fn send_command(&mut self, command: &Command, timeout: Duration) -> Result<CommandResult> {
        let deadline = Instant::now() + timeout;
        while !self.session.can_send() {
            if self.session.state() != LinkState::Up {
                return Err(LinkError::NotConnected.into());
            }
            match self.next_event(deadline)? {
                Some(SessionEvent::LinkDown(err)) => return Err(err.into()),
                Some(other) => self.stash(other),
                None => return Err(ControllerError::Timeout(timeout)),
            }
        }

        let seq = self
            .session
            .send(FrameType::Command, command.encode(), Instant::now())?;
        self.flush()?;
        debug!(seq, target = %command.target, opcode = command.opcode, "command sent");

        loop {
            match self.next_event(deadline)? {
                Some(SessionEvent::Delivered(frame)) if frame.kind == FrameType::Telemetry => {
                    match TelemetryMessage::decode(&frame.payload) {
                        Ok(TelemetryMessage::Result(result)) if result.command_seq == seq => {
                            self.flush()?;
                            return Ok(result);
                        }
                        Ok(other) => self.inbox.push_back(other),
                        Err(err) => debug!(error = %err, "undecodable telemetry"),
                    }
                }
                Some(SessionEvent::Acknowledged { seq: acked }) => debug!(seq = acked, "command acknowledged"),
                Some(SessionEvent::LinkDown(err)) => return Err(err.into()),
                Some(other) => self.stash(other),
                None => return Err(ControllerError::Timeout(timeout)),
            }
        }
    }

    /// Next telemetry message, or `None` if nothing arrived within `timeout`.
    pub fn next_telemetry(&mut self, timeout: Duration) -> Result<Option<TelemetryMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.inbox.pop_front() {
                return Ok(Some(message));
            }
            match self.next_event(deadline)? {
                Some(SessionEvent::LinkDown(err)) => return Err(err.into()),
                Some(other) => self.stash(other),
                None => return Ok(None),
            }
        }
    }

    /// Go down without reporting a link error.
    pub fn close(&mut self) {
        self.session.close(Instant::now());
    }

    fn stash(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Delivered(frame) if frame.kind == FrameType::Telemetry => {
                match TelemetryMessage::decode(&frame.payload) {
                    Ok(message) => self.inbox.push_back(message),
                    Err(err) => debug!(seq = frame.seq, error = %err, "undecodable telemetry"),
                }
            }
            other => debug!(event = ?other, "session event"),
        }
    }

    fn next_event(&mut self, deadline: Instant) -> Result<Option<SessionEvent>> {
        loop {
            if let Some(event) = self.session.poll_event() {
                return Ok(Some(event));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.pump()?;
        }
    }

    /// One read attempt plus timer processing.
    fn pump(&mut self) -> Result<()> {
        self.flush()?;
        match self.reader.read_frame() {
            Ok(frame) => self.session.handle_frame(frame, Instant::now()),
            Err(err) if err.is_recoverable() => {
                self.frame_errors += 1;
                debug!(error = %err, "discarding corrupted frame");
            }
            Err(FrameError::Io(err)) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(FrameError::ConnectionClosed) => return Err(ControllerError::TransportClosed),
            Err(err) => return Err(err.into()),
        }

        let now = Instant::now();
        if self.session.poll_deadline().is_some_and(|at| at <= now) {
            self.session.handle_timeout(now);
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        while let Some(bytes) = self.session.poll_transmit() {
            self.writer.write_encoded(&bytes)?;
        }
        Ok(())
    }
}
