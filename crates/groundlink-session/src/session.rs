//! The link session state machine.
//!
//! The session performs no I/O and reads no clock. Callers feed it decoded
//! frames and the current instant, then drain encoded frames with
//! [`Session::poll_transmit`] and notifications with [`Session::poll_event`].
//! [`Session::poll_deadline`] says when [`Session::handle_timeout`] must run
//! next.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use groundlink_frame::{Frame, FrameError, FrameType};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{LinkError, Result};
use crate::sequence::{RxSequence, RxVerdict};

/// Unacknowledged data frames allowed per direction (stop-and-wait).
pub const SEND_WINDOW: usize = 1;

/// Link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No communication established.
    Down,
    /// Handshake in progress.
    Syncing,
    /// Normal operation.
    Up,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Down => "down",
            LinkState::Syncing => "syncing",
            LinkState::Up => "up",
        })
    }
}

/// Notifications produced by the session.
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged { from: LinkState, to: LinkState },
    /// A data frame accepted in order; delivered exactly once.
    Delivered(Frame),
    /// The outstanding frame with this sequence number was acknowledged.
    Acknowledged { seq: u8 },
    /// The link was lost. Raised once per loss.
    LinkDown(LinkError),
}

/// Session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub acks_received: u64,
    pub acks_sent: u64,
    pub heartbeats_sent: u64,
    pub retransmissions: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
}

#[derive(Debug)]
struct Outstanding {
    seq: u8,
    encoded: Bytes,
    sent_at: Instant,
    retries: u32,
}

/// One link session with one peer.
///
/// Build a fresh session for every connection attempt.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: LinkState,
    next_tx_seq: u8,
    rx: RxSequence,
    outstanding: VecDeque<Outstanding>,
    sync_started: Option<Instant>,
    last_rx: Option<Instant>,
    last_tx: Option<Instant>,
    transmit: VecDeque<Bytes>,
    events: VecDeque<SessionEvent>,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: LinkState::Down,
            next_tx_seq: 0,
            rx: RxSequence::default(),
            outstanding: VecDeque::with_capacity(SEND_WINDOW),
            sync_started: None,
            last_rx: None,
            last_tx: None,
            transmit: VecDeque::new(),
            events: VecDeque::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Whether `send` would accept a data frame right now.
    pub fn can_send(&self) -> bool {
        self.state == LinkState::Up && self.outstanding.len() < SEND_WINDOW
    }

    /// Whether a data frame is awaiting its acknowledgement.
    pub fn has_outstanding(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Begin the handshake: DOWN -> SYNCING and send the first heartbeat.
    ///
    /// Does nothing unless the session is down.
    pub fn start_sync(&mut self, now: Instant) {
        if self.state != LinkState::Down {
            return;
        }
        self.rx = RxSequence::default();
        self.outstanding.clear();
        self.sync_started = Some(now);
        self.last_rx = None;
        self.transition(LinkState::Syncing);
        self.queue_heartbeat(now);
    }

    /// Process a frame that passed checksum validation.
    pub fn handle_frame(&mut self, frame: Frame, now: Instant) {
        if self.state == LinkState::Down {
            debug!(kind = %frame.kind, seq = frame.seq, "ignoring frame while link is down");
            return;
        }

        if self.state == LinkState::Syncing {
            // Only a heartbeat tells us the peer's next sequence. A data frame
            // here may be a retransmission a previous session already delivered.
            if frame.kind != FrameType::Heartbeat {
                debug!(kind = %frame.kind, seq = frame.seq, "dropping frame received before handshake");
                return;
            }
            info!("peer answered, link up");
            self.transition(LinkState::Up);
            self.queue_heartbeat(now);
        }

        self.stats.frames_received += 1;
        self.last_rx = Some(now);

        match frame.kind {
            FrameType::Ack => self.on_ack(frame.seq),
            FrameType::Heartbeat => {
                debug!(next_seq = frame.seq, "heartbeat received");
                self.rx.expect_next(frame.seq);
            }
            FrameType::Command | FrameType::Telemetry => self.on_data(frame, now),
        }
    }

    fn on_ack(&mut self, seq: u8) {
        self.stats.acks_received += 1;
        match self.outstanding.front() {
            Some(pending) if pending.seq == seq => {
                self.outstanding.pop_front();
                debug!(seq, "frame acknowledged");
                self.events.push_back(SessionEvent::Acknowledged { seq });
            }
            _ => debug!(seq, "ignoring stale acknowledgement"),
        }
    }

    fn on_data(&mut self, frame: Frame, now: Instant) {
        match self.rx.classify(frame.seq) {
            RxVerdict::Accept => {
                self.rx.accept(frame.seq);
                debug!(kind = %frame.kind, seq = frame.seq, len = frame.payload.len(), "frame accepted");
                self.queue_ack(frame.seq, now);
                self.events.push_back(SessionEvent::Delivered(frame));
            }
            RxVerdict::Duplicate => {
                self.stats.duplicates += 1;
                debug!(seq = frame.seq, "duplicate frame, acknowledging again");
                self.queue_ack(frame.seq, now);
            }
            RxVerdict::OutOfOrder => {
                self.stats.out_of_order += 1;
                debug!(
                    seq = frame.seq,
                    last = ?self.rx.last(),
                    "out-of-order frame dropped"
                );
            }
        }
    }

    /// Queue a COMMAND or TELEMETRY frame and return its sequence number.
    pub fn send(&mut self, kind: FrameType, payload: impl Into<Bytes>, now: Instant) -> Result<u8> {
        if !kind.requires_ack() {
            return Err(LinkError::NotSequenced(kind));
        }
        if self.state != LinkState::Up {
            return Err(LinkError::NotConnected);
        }
        if self.outstanding.len() >= SEND_WINDOW {
            return Err(LinkError::WindowFull(self.outstanding.len()));
        }

        let payload = payload.into();
        if payload.len() > self.config.max_payload_size {
            return Err(LinkError::Frame(FrameError::Oversized {
                size: payload.len(),
                max: self.config.max_payload_size,
            }));
        }

        let seq = self.next_tx_seq;
        let encoded = Frame::new(kind, seq, payload).to_bytes()?;
        self.next_tx_seq = seq.wrapping_add(1);
        self.outstanding.push_back(Outstanding {
            seq,
            encoded: encoded.clone(),
            sent_at: now,
            retries: 0,
        });
        self.stats.frames_sent += 1;
        self.push_transmit(encoded, now);
        debug!(%kind, seq, "frame sent");
        Ok(seq)
    }

    /// Drive timers. Call at or after [`Session::poll_deadline`].
    pub fn handle_timeout(&mut self, now: Instant) {
        match self.state {
            LinkState::Down => {}
            LinkState::Syncing => {
                let started = self.sync_started.unwrap_or(now);
                if now >= started + self.config.handshake_timeout {
                    warn!(timeout = ?self.config.handshake_timeout, "handshake timed out");
                    self.link_lost(LinkError::HandshakeTimeout);
                } else if self.heartbeat_due(now) {
                    self.queue_heartbeat(now);
                }
            }
            LinkState::Up => {
                if let Some(last_rx) = self.last_rx {
                    if now >= last_rx + self.config.liveness_timeout() {
                        warn!(
                            silence = ?now.saturating_duration_since(last_rx),
                            "no valid frame from peer, link down"
                        );
                        self.link_lost(LinkError::PeerUnresponsive);
                        return;
                    }
                }

                if let Some(pending) = self.outstanding.front_mut() {
                    if now >= pending.sent_at + self.config.retry_timeout {
                        if pending.retries >= self.config.max_retries {
                            warn!(
                                seq = pending.seq,
                                retries = pending.retries,
                                "retransmissions exhausted, link down"
                            );
                            self.link_lost(LinkError::PeerUnresponsive);
                            return;
                        }
                        pending.retries += 1;
                        pending.sent_at = now;
                        let seq = pending.seq;
                        let retry = pending.retries;
                        let encoded = pending.encoded.clone();
                        self.stats.retransmissions += 1;
                        debug!(seq, retry, "retransmitting");
                        self.push_transmit(encoded, now);
                    }
                } else if self.heartbeat_due(now) {
                    self.queue_heartbeat(now);
                }
            }
        }
    }

    /// Next instant at which [`Session::handle_timeout`] has work to do.
    pub fn poll_deadline(&self) -> Option<Instant> {
        let heartbeat = self.last_tx.map(|t| t + self.config.heartbeat_interval);
        match self.state {
            LinkState::Down => None,
            LinkState::Syncing => {
                let handshake = self.sync_started.map(|t| t + self.config.handshake_timeout);
                earliest(handshake, heartbeat)
            }
            LinkState::Up => {
                let liveness = self.last_rx.map(|t| t + self.config.liveness_timeout());
                let timer = match self.outstanding.front() {
                    Some(pending) => Some(pending.sent_at + self.config.retry_timeout),
                    None => heartbeat,
                };
                earliest(liveness, timer)
            }
        }
    }

    /// Graceful shutdown: go down without reporting a link error.
    pub fn close(&mut self, now: Instant) {
        if self.state == LinkState::Down {
            return;
        }
        if let Some(pending) = self.outstanding.front() {
            debug!(seq = pending.seq, "closing with unacknowledged frame");
        }
        self.outstanding.clear();
        self.transmit.clear();
        self.last_tx = Some(now);
        self.transition(LinkState::Down);
    }

    /// Next encoded frame to write to the transport.
    pub fn poll_transmit(&mut self) -> Option<Bytes> {
        self.transmit.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    fn heartbeat_due(&self, now: Instant) -> bool {
        match self.last_tx {
            Some(last) => now >= last + self.config.heartbeat_interval,
            None => true,
        }
    }

    fn queue_heartbeat(&mut self, now: Instant) {
        // Carries our next data sequence so the peer can align.
        match Frame::heartbeat(self.next_tx_seq).to_bytes() {
            Ok(encoded) => {
                self.stats.heartbeats_sent += 1;
                self.push_transmit(encoded, now);
            }
            Err(err) => warn!(error = %err, "failed to encode heartbeat"),
        }
    }

    fn queue_ack(&mut self, seq: u8, now: Instant) {
        match Frame::ack(seq).to_bytes() {
            Ok(encoded) => {
                self.stats.acks_sent += 1;
                self.push_transmit(encoded, now);
            }
            Err(err) => warn!(error = %err, "failed to encode ack"),
        }
    }

    fn push_transmit(&mut self, encoded: Bytes, now: Instant) {
        self.transmit.push_back(encoded);
        self.last_tx = Some(now);
    }

    fn link_lost(&mut self, err: LinkError) {
        self.outstanding.clear();
        self.transmit.clear();
        self.transition(LinkState::Down);
        self.events.push_back(SessionEvent::LinkDown(err));
    }

    fn transition(&mut self, to: LinkState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(%from, %to, "link state changed");
        self.events.push_back(SessionEvent::StateChanged { from, to });
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use groundlink_frame::Deframer;

    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sent(session: &mut Session) -> Vec<Frame> {
        let mut deframer = Deframer::default();
        let mut frames = Vec::new();
        while let Some(bytes) = session.poll_transmit() {
            frames.extend(deframer.feed(&bytes).map(|r| r.unwrap()));
        }
        frames
    }

    fn events(session: &mut Session) -> Vec<SessionEvent> {
        std::iter::from_fn(|| session.poll_event()).collect()
    }

    fn shuttle(from: &mut Session, to: &mut Session, now: Instant) -> usize {
        let frames = sent(from);
        let count = frames.len();
        for frame in frames {
            to.handle_frame(frame, now);
        }
        count
    }

    fn up_session(t0: Instant) -> Session {
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.start_sync(t0);
        session.handle_frame(Frame::heartbeat(0), t0);
        assert_eq!(session.state(), LinkState::Up);
        sent(&mut session);
        events(&mut session);
        session
    }

    #[test]
    fn two_sessions_complete_handshake() {
        let t0 = Instant::now();
        let mut a = Session::new(SessionConfig::default()).unwrap();
        let mut b = Session::new(SessionConfig::default()).unwrap();

        a.start_sync(t0);
        b.start_sync(t0);
        assert_eq!(a.state(), LinkState::Syncing);

        shuttle(&mut a, &mut b, t0);
        shuttle(&mut b, &mut a, t0);
        shuttle(&mut a, &mut b, t0);

        assert_eq!(a.state(), LinkState::Up);
        assert_eq!(b.state(), LinkState::Up);
        let changes: Vec<_> = events(&mut a)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                (LinkState::Down, LinkState::Syncing),
                (LinkState::Syncing, LinkState::Up)
            ]
        );
    }

    #[test]
    fn syncing_resends_heartbeat_each_interval() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.start_sync(t0);
        assert_eq!(sent(&mut session).len(), 1);

        session.handle_timeout(t0 + ms(500));
        assert!(sent(&mut session).is_empty());

        assert_eq!(session.poll_deadline(), Some(t0 + ms(1000)));
        session.handle_timeout(t0 + ms(1000));
        let frames = sent(&mut session);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameType::Heartbeat);
    }

    #[test]
    fn handshake_timeout_goes_down_once() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.start_sync(t0);
        events(&mut session);

        session.handle_timeout(t0 + Duration::from_secs(5));
        session.handle_timeout(t0 + Duration::from_secs(6));

        assert_eq!(session.state(), LinkState::Down);
        let downs = events(&mut session)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::LinkDown(LinkError::HandshakeTimeout)))
            .count();
        assert_eq!(downs, 1);
        assert_eq!(session.poll_deadline(), None);
    }

    #[test]
    fn silent_peer_is_declared_unresponsive_exactly_once() {
        let t0 = Instant::now();
        let mut session = up_session(t0);

        let mut at = t0;
        while session.state() == LinkState::Up {
            at = session.poll_deadline().unwrap();
            session.handle_timeout(at);
        }
        assert_eq!(at, t0 + Duration::from_secs(3));

        session.handle_timeout(at + Duration::from_secs(10));
        let lost: Vec<_> = events(&mut session)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::LinkDown(_)))
            .collect();
        assert_eq!(lost.len(), 1);
        assert!(matches!(lost[0], SessionEvent::LinkDown(LinkError::PeerUnresponsive)));
    }

    #[test]
    fn idle_link_sends_heartbeats_and_traffic_keeps_it_up() {
        let t0 = Instant::now();
        let mut session = up_session(t0);

        for second in 1..=10u64 {
            let now = t0 + Duration::from_secs(second);
            session.handle_timeout(now);
            let frames = sent(&mut session);
            assert_eq!(frames.len(), 1, "second {second}");
            assert_eq!(frames[0].kind, FrameType::Heartbeat);
            session.handle_frame(Frame::heartbeat(0), now);
        }
        assert_eq!(session.state(), LinkState::Up);
    }

    #[test]
    fn data_is_delivered_and_acknowledged() {
        let t0 = Instant::now();
        let mut session = up_session(t0);

        session.handle_frame(Frame::new(FrameType::Command, 0, &b"go"[..]), t0);

        let frames = sent(&mut session);
        assert_eq!(frames, vec![Frame::ack(0)]);
        let delivered: Vec<_> = events(&mut session)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Delivered(frame) => Some(frame),
                _ => None,
            })
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload.as_ref(), b"go");
    }

    #[test]
    fn duplicate_is_reacknowledged_but_not_redelivered() {
        let t0 = Instant::now();
        let mut session = up_session(t0);
        let frame = Frame::new(FrameType::Command, 0, &b"open"[..]);

        session.handle_frame(frame.clone(), t0);
        session.handle_frame(frame.clone(), t0 + ms(100));
        session.handle_frame(frame, t0 + ms(200));

        let acks = sent(&mut session);
        assert_eq!(acks, vec![Frame::ack(0), Frame::ack(0), Frame::ack(0)]);
        let delivered = events(&mut session)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Delivered(_)))
            .count();
        assert_eq!(delivered, 1);
        assert_eq!(session.stats().duplicates, 2);
    }

    #[test]
    fn out_of_order_frame_is_dropped_without_ack() {
        let t0 = Instant::now();
        let mut session = up_session(t0);

        session.handle_frame(Frame::new(FrameType::Command, 5, &b"skip"[..]), t0);

        assert!(sent(&mut session).is_empty());
        assert!(events(&mut session).is_empty());
        assert_eq!(session.stats().out_of_order, 1);
    }

    #[test]
    fn send_requires_up_and_a_free_window() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default()).unwrap();
        assert!(matches!(
            session.send(FrameType::Telemetry, Bytes::new(), t0),
            Err(LinkError::NotConnected)
        ));

        let mut session = up_session(t0);
        assert!(matches!(
            session.send(FrameType::Ack, Bytes::new(), t0),
            Err(LinkError::NotSequenced(FrameType::Ack))
        ));
        assert_eq!(session.send(FrameType::Telemetry, &b"a"[..], t0).unwrap(), 0);
        assert!(!session.can_send());
        assert!(matches!(
            session.send(FrameType::Telemetry, &b"b"[..], t0),
            Err(LinkError::WindowFull(1))
        ));

        session.handle_frame(Frame::ack(0), t0 + ms(10));
        assert!(session.can_send());
        assert!(events(&mut session)
            .iter()
            .any(|e| matches!(e, SessionEvent::Acknowledged { seq: 0 })));
        assert_eq!(session.send(FrameType::Telemetry, &b"b"[..], t0).unwrap(), 1);
    }

    #[test]
    fn oversized_send_is_rejected() {
        let t0 = Instant::now();
        let mut session = up_session(t0);
        let err = session
            .send(FrameType::Telemetry, vec![0u8; 2048], t0)
            .unwrap_err();
        assert!(matches!(err, LinkError::Frame(FrameError::Oversized { .. })));
        assert!(session.can_send());
    }

    #[test]
    fn stale_ack_is_ignored() {
        let t0 = Instant::now();
        let mut session = up_session(t0);
        session.send(FrameType::Telemetry, &b"x"[..], t0).unwrap();

        session.handle_frame(Frame::ack(9), t0);
        assert!(session.has_outstanding());
    }

    #[test]
    fn retransmits_until_retries_exhausted_then_goes_down() {
        let t0 = Instant::now();
        let mut session = up_session(t0);
        session.send(FrameType::Telemetry, &b"reading"[..], t0).unwrap();
        let original = sent(&mut session);
        assert_eq!(original.len(), 1);

        // Peer keeps the link alive with heartbeats but never ACKs.
        let mut resends = 0;
        let mut now = t0;
        while session.state() == LinkState::Up {
            now = session.poll_deadline().unwrap();
            session.handle_frame(Frame::heartbeat(0), now);
            session.handle_timeout(now);
            for frame in sent(&mut session) {
                assert_eq!(frame, original[0]);
                resends += 1;
            }
        }

        assert_eq!(resends, 3);
        assert_eq!(session.stats().retransmissions, 3);
        assert_eq!(now, t0 + ms(2000));
        assert!(events(&mut session)
            .iter()
            .any(|e| matches!(e, SessionEvent::LinkDown(LinkError::PeerUnresponsive))));

        session.handle_timeout(now + Duration::from_secs(5));
        assert!(sent(&mut session).is_empty());
        assert!(matches!(
            session.send(FrameType::Telemetry, &b"more"[..], now),
            Err(LinkError::NotConnected)
        ));
    }

    #[test]
    fn no_heartbeat_while_frame_outstanding() {
        let t0 = Instant::now();
        let mut session = up_session(t0);
        session.send(FrameType::Telemetry, &b"x"[..], t0).unwrap();
        sent(&mut session);

        session.handle_frame(Frame::heartbeat(0), t0 + ms(400));
        assert_eq!(session.poll_deadline(), Some(t0 + ms(500)));
        session.handle_timeout(t0 + ms(500));
        let frames = sent(&mut session);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameType::Telemetry);
    }

    #[test]
    fn sequence_numbers_wrap() {
        let t0 = Instant::now();
        let mut session = up_session(t0);
        let mut last = 0;
        for _ in 0..=256 {
            last = session.send(FrameType::Telemetry, Bytes::new(), t0).unwrap();
            session.handle_frame(Frame::ack(last), t0);
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn heartbeat_aligns_receive_sequence() {
        let t0 = Instant::now();
        let mut session = up_session(t0);

        session.handle_frame(Frame::heartbeat(40), t0);
        session.handle_frame(Frame::new(FrameType::Command, 40, &b"x"[..]), t0);

        assert_eq!(sent(&mut session), vec![Frame::ack(40)]);
    }

    #[test]
    fn close_goes_down_without_link_error() {
        let t0 = Instant::now();
        let mut session = up_session(t0);
        session.send(FrameType::Telemetry, &b"x"[..], t0).unwrap();

        session.close(t0 + ms(5));

        assert_eq!(session.state(), LinkState::Down);
        assert!(!session.has_outstanding());
        assert!(session.poll_transmit().is_none());
        assert!(!events(&mut session)
            .iter()
            .any(|e| matches!(e, SessionEvent::LinkDown(_))));
    }

    #[test]
    fn data_before_handshake_is_neither_acked_nor_delivered() {
        let t0 = Instant::now();
        let retransmitted = Frame::new(FrameType::Command, 0, &b"open"[..]);

        let mut first = up_session(t0);
        first.handle_frame(retransmitted.clone(), t0);
        let delivered_first = events(&mut first)
            .iter()
            .filter(|e| matches!(e, SessionEvent::Delivered(_)))
            .count();
        assert_eq!(delivered_first, 1);

        // The ACK was lost; the peer retransmits into a resynced session.
        let mut second = Session::new(SessionConfig::default()).unwrap();
        second.start_sync(t0 + ms(10));
        sent(&mut second);
        second.handle_frame(retransmitted.clone(), t0 + ms(20));
        assert_eq!(second.state(), LinkState::Syncing);
        assert!(sent(&mut second).is_empty());

        // The peer's heartbeat announces seq 1 as next, so the retransmission is a duplicate.
        second.handle_frame(Frame::heartbeat(1), t0 + ms(30));
        assert_eq!(second.state(), LinkState::Up);
        second.handle_frame(retransmitted, t0 + ms(40));
        let frames = sent(&mut second);
        assert_eq!(frames.last(), Some(&Frame::ack(0)));

        let delivered_second = events(&mut second)
            .iter()
            .filter(|e| matches!(e, SessionEvent::Delivered(_)))
            .count();
        assert_eq!(delivered_first + delivered_second, 1);
        assert_eq!(second.stats().duplicates, 1);
    }

    #[test]
    fn frames_ignored_while_down() {
        let t0 = Instant::now();
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.handle_frame(Frame::new(FrameType::Command, 0, &b"x"[..]), t0);
        assert!(session.poll_transmit().is_none());
        assert!(session.poll_event().is_none());
        assert_eq!(session.stats().frames_received, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SessionConfig {
            max_retries: 3,
            retry_timeout: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(Session::new(cfg), Err(LinkError::InvalidConfig(_))));
    }
}
