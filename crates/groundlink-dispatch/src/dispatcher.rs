//! Command admission, bounded driver execution and the outbound telemetry queue.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use groundlink_frame::{Frame, FrameType};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::command::{Command, DriverId, Operation};
use crate::driver::DriverSet;
use crate::error::{DispatchError, DriverError, Result};
use crate::routing::RoutingTable;
use crate::telemetry::{CommandResult, ResultStatus, TelemetryRecord};

/// Dispatcher limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on a single driver execution.
    pub driver_timeout: Duration,
    /// Outbound records kept before the oldest is dropped.
    pub max_queued_telemetry: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            driver_timeout: Duration::from_secs(2),
            max_queued_telemetry: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub commands_admitted: u64,
    pub commands_rejected: u64,
    pub commands_completed: u64,
    pub driver_timeouts: u64,
    pub driver_faults: u64,
    pub telemetry_dropped: u64,
}

/// A finished driver execution.
#[derive(Debug)]
pub struct Completion {
    pub command_seq: u8,
    pub command: Command,
    pub outcome: std::result::Result<Bytes, DriverError>,
}

/// Routes delivered commands to drivers and turns outcomes into telemetry.
///
/// Owned by the controller loop; it never touches the link session.
/// Commands are spawned onto the current tokio runtime.
pub struct Dispatcher {
    drivers: Arc<DriverSet>,
    routes: RoutingTable,
    config: DispatchConfig,
    busy: HashSet<DriverId>,
    tasks: JoinSet<Completion>,
    outbound: VecDeque<TelemetryRecord>,
    /// Record handed to the link and not yet acknowledged.
    in_flight: Option<TelemetryRecord>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(drivers: DriverSet, routes: RoutingTable, config: DispatchConfig) -> Result<Self> {
        routes.validate(&drivers)?;
        if config.max_queued_telemetry == 0 {
            return Err(DispatchError::InvalidRoute(
                "max_queued_telemetry must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            drivers: Arc::new(drivers),
            routes,
            config,
            busy: HashSet::new(),
            tasks: JoinSet::new(),
            outbound: VecDeque::new(),
            in_flight: None,
            stats: DispatchStats::default(),
        })
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn drivers(&self) -> &DriverSet {
        &self.drivers
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn is_busy(&self, driver: DriverId) -> bool {
        self.busy.contains(&driver)
    }

    /// Whether driver executions are still running.
    pub fn has_pending(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Number of outbound telemetry records waiting, including one in flight.
    pub fn queued(&self) -> usize {
        self.outbound.len() + usize::from(self.in_flight.is_some())
    }

    /// Admit a COMMAND frame delivered by the session.
    ///
    /// On success the driver call is running in the background; collect it
    /// with [`Dispatcher::next_completion`]. On rejection a negative RESULT
    /// is queued and the error returned.
    pub fn on_command_frame(&mut self, frame: &Frame) -> Result<()> {
        let (target, opcode) = match frame.payload.as_ref() {
            [target, opcode, ..] => (DriverId(*target), *opcode),
            [target] => (DriverId(*target), 0),
            [] => (DriverId(0), 0),
        };

        match self.admit(frame) {
            Ok((command, operation)) => {
                self.spawn(frame.seq, command, operation);
                Ok(())
            }
            Err(err) => {
                warn!(seq = frame.seq, %target, opcode, error = %err, "command rejected");
                self.stats.commands_rejected += 1;
                self.enqueue(TelemetryRecord::result(CommandResult {
                    command_seq: frame.seq,
                    target,
                    opcode,
                    status: err.status(),
                    body: Bytes::from(err.to_string()),
                }));
                Err(err)
            }
        }
    }

    fn admit(&self, frame: &Frame) -> Result<(Command, Operation)> {
        if frame.kind != FrameType::Command {
            return Err(DispatchError::MalformedCommand(format!(
                "{} frame is not a command",
                frame.kind
            )));
        }
        let command = Command::decode(&frame.payload)?;
        if !self.drivers.contains(command.target) {
            return Err(DispatchError::UnknownTarget(command.target));
        }
        let route = self
            .routes
            .lookup(command.opcode)
            .ok_or(DispatchError::UnsupportedOperation {
                opcode: command.opcode,
            })?;
        if route.driver != command.target {
            return Err(DispatchError::UnknownTarget(command.target));
        }
        let operation = Operation::decode(route.capability, &command.args)?;
        if self.busy.contains(&command.target) {
            return Err(DispatchError::DriverBusy(command.target));
        }
        Ok((command, operation))
    }

    fn spawn(&mut self, command_seq: u8, command: Command, operation: Operation) {
        let target = command.target;
        self.busy.insert(target);
        self.stats.commands_admitted += 1;
        debug!(seq = command_seq, %target, ?operation, "dispatching command");

        let drivers = Arc::clone(&self.drivers);
        let timeout = self.config.driver_timeout;
        self.tasks.spawn(async move {
            // The inner task turns a panicking driver into a JoinError.
            let execution = tokio::spawn(async move { drivers.execute(target, operation).await });
            let abort = execution.abort_handle();
            let outcome = match tokio::time::timeout(timeout, execution).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(DriverError::Fault(format!("driver task failed: {join_err}"))),
                Err(_elapsed) => {
                    abort.abort();
                    Err(DriverError::Timeout(timeout))
                }
            };
            Completion {
                command_seq,
                command,
                outcome,
            }
        });
    }

    /// Wait for the next driver execution to finish.
    ///
    /// Returns `None` when nothing is running. Cancel safe.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        loop {
            match self.tasks.join_next().await? {
                Ok(completion) => return Some(completion),
                Err(err) => warn!(error = %err, "dispatch task ended without a result"),
            }
        }
    }

    /// Release the driver and queue the RESULT telemetry for a completion.
    pub fn on_completion(&mut self, completion: Completion) {
        let Completion {
            command_seq,
            command,
            outcome,
        } = completion;
        self.busy.remove(&command.target);
        self.stats.commands_completed += 1;

        let (status, body) = match outcome {
            Ok(body) => {
                debug!(seq = command_seq, target = %command.target, "command completed");
                (ResultStatus::Ok, body)
            }
            Err(err) => {
                match err {
                    DriverError::Timeout(_) => self.stats.driver_timeouts += 1,
                    DriverError::Fault(_) => self.stats.driver_faults += 1,
                }
                warn!(seq = command_seq, target = %command.target, error = %err, "command failed");
                (err.status(), Bytes::from(err.to_string()))
            }
        };

        self.enqueue(TelemetryRecord::result(CommandResult {
            command_seq,
            target: command.target,
            opcode: command.opcode,
            status,
            body,
        }));
    }

    /// Queue a reading produced by a driver.
    pub fn on_telemetry_ready(&mut self, driver: DriverId, payload: Bytes) {
        self.enqueue(TelemetryRecord::reading(driver, payload));
    }

    /// Poll every driver once for a reading.
    pub fn collect_telemetry(&mut self) {
        let readings: Vec<(DriverId, Bytes)> = self
            .drivers
            .ids()
            .filter_map(|id| self.drivers.poll_telemetry(id).map(|data| (id, data)))
            .collect();
        for (id, data) in readings {
            self.on_telemetry_ready(id, data);
        }
    }

    /// Encode the oldest outbound record as a TELEMETRY payload.
    ///
    /// The record stays in flight until [`Dispatcher::confirm_outbound`] or
    /// [`Dispatcher::requeue_outbound`]; until then this returns `None`.
    pub fn next_outbound(&mut self) -> Option<Bytes> {
        if self.in_flight.is_some() {
            return None;
        }
        let record = self.outbound.pop_front()?;
        let payload = record.encode();
        self.in_flight = Some(record);
        Some(payload)
    }

    /// The peer acknowledged the record in flight.
    pub fn confirm_outbound(&mut self) {
        self.in_flight = None;
    }

    /// The record in flight was not acknowledged; send it first next time.
    pub fn requeue_outbound(&mut self) {
        let Some(record) = self.in_flight.take() else {
            return;
        };
        debug!(source = %record.source, "telemetry record requeued");
        self.outbound.push_front(record);
        if self.outbound.len() > self.config.max_queued_telemetry {
            if let Some(dropped) = self.outbound.remove(1) {
                self.stats.telemetry_dropped += 1;
                warn!(source = %dropped.source, "telemetry queue full, dropping oldest waiting record");
            }
        }
    }

    /// Abort all running driver executions.
    pub fn shutdown(&mut self) {
        if !self.tasks.is_empty() {
            debug!(running = self.tasks.len(), "aborting driver executions");
        }
        self.tasks.abort_all();
        self.busy.clear();
    }

    fn enqueue(&mut self, record: TelemetryRecord) {
        if self.outbound.len() >= self.config.max_queued_telemetry {
            if let Some(dropped) = self.outbound.pop_front() {
                self.stats.telemetry_dropped += 1;
                warn!(
                    source = %dropped.source,
                    queued = self.outbound.len(),
                    "telemetry queue full, dropping oldest record"
                );
            }
        }
        self.outbound.push_back(record);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::driver::Driver;
    use crate::mock::{SimulatedValve, ValveDefault};
    use crate::routing::{Capability, Route};
    use crate::telemetry::TelemetryMessage;

    const OVERRIDE: u8 = 0x10;
    const QUERY: u8 = 0x11;

    /// Counts executions and optionally sleeps or panics.
    struct ScriptedDriver {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        panics: bool,
    }

    #[async_trait]
    impl Driver for ScriptedDriver {
        fn name(&self) -> &str {
            "scripted"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::ValveOverride, Capability::StateQuery]
        }

        async fn execute(&self, _operation: Operation) -> std::result::Result<Bytes, DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.panics {
                panic!("scripted driver exploded");
            }
            Ok(Bytes::from_static(b"done"))
        }
    }

    fn dispatcher_with(driver: impl Driver + 'static) -> Dispatcher {
        let mut drivers = DriverSet::new();
        drivers.register(DriverId(1), driver).unwrap();
        let mut routes = RoutingTable::new();
        routes
            .insert(OVERRIDE, Route { driver: DriverId(1), capability: Capability::ValveOverride })
            .unwrap();
        routes
            .insert(QUERY, Route { driver: DriverId(1), capability: Capability::StateQuery })
            .unwrap();
        Dispatcher::new(drivers, routes, DispatchConfig::default()).unwrap()
    }

    fn scripted(delay: Duration, panics: bool) -> (ScriptedDriver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            ScriptedDriver {
                calls: Arc::clone(&calls),
                delay,
                panics,
            },
            calls,
        )
    }

    fn command(seq: u8, target: u8, opcode: u8, args: &[u8]) -> Frame {
        let cmd = Command::new(DriverId(target), opcode, Bytes::copy_from_slice(args));
        Frame::new(FrameType::Command, seq, cmd.encode())
    }

    fn next_result(dispatcher: &mut Dispatcher) -> CommandResult {
        let payload = dispatcher.next_outbound().expect("queued telemetry");
        dispatcher.confirm_outbound();
        match TelemetryMessage::decode(&payload).unwrap() {
            TelemetryMessage::Result(result) => result,
            other => panic!("expected a result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_target_yields_result_telemetry() {
        let mut dispatcher = dispatcher_with(SimulatedValve::new("vent", ValveDefault::Closed));

        let err = dispatcher.on_command_frame(&command(4, 9, OVERRIDE, &[1])).unwrap_err();
        assert_eq!(err, DispatchError::UnknownTarget(DriverId(9)));

        let result = next_result(&mut dispatcher);
        assert_eq!(result.status, ResultStatus::UnknownTarget);
        assert_eq!(result.command_seq, 4);
        assert_eq!(result.target, DriverId(9));
        assert!(!dispatcher.has_pending());
    }

    #[tokio::test]
    async fn admitted_command_runs_and_reports_ok() {
        let mut dispatcher = dispatcher_with(SimulatedValve::new("vent", ValveDefault::Closed));

        dispatcher.on_command_frame(&command(1, 1, OVERRIDE, &[1])).unwrap();
        assert!(dispatcher.is_busy(DriverId(1)));

        let completion = dispatcher.next_completion().await.unwrap();
        dispatcher.on_completion(completion);
        assert!(!dispatcher.is_busy(DriverId(1)));

        let result = next_result(&mut dispatcher);
        assert_eq!(result.status, ResultStatus::Ok);
        assert_eq!(result.opcode, OVERRIDE);
        assert_eq!(result.body.as_ref(), &[1]);
    }

    #[tokio::test]
    async fn rejections_map_to_status_codes() {
        let mut dispatcher = dispatcher_with(SimulatedValve::new("vent", ValveDefault::Closed));

        let cases = [
            (command(1, 1, 0x7F, &[]), ResultStatus::UnsupportedOperation),
            (command(2, 1, OVERRIDE, &[7]), ResultStatus::MalformedCommand),
            (Frame::new(FrameType::Command, 3, Bytes::from_static(&[1])), ResultStatus::MalformedCommand),
        ];
        for (frame, expected) in cases {
            assert!(dispatcher.on_command_frame(&frame).is_err());
            assert_eq!(next_result(&mut dispatcher).status, expected);
        }
        assert_eq!(dispatcher.stats().commands_rejected, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_driver_rejects_second_command() {
        let (driver, calls) = scripted(Duration::from_millis(100), false);
        let mut dispatcher = dispatcher_with(driver);

        dispatcher.on_command_frame(&command(1, 1, OVERRIDE, &[1])).unwrap();
        let err = dispatcher.on_command_frame(&command(2, 1, QUERY, &[])).unwrap_err();
        assert_eq!(err, DispatchError::DriverBusy(DriverId(1)));
        assert_eq!(next_result(&mut dispatcher).status, ResultStatus::DriverBusy);

        let completion = dispatcher.next_completion().await.unwrap();
        dispatcher.on_completion(completion);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_driver_times_out() {
        let (driver, _calls) = scripted(Duration::from_secs(30), false);
        let mut dispatcher = dispatcher_with(driver);

        dispatcher.on_command_frame(&command(5, 1, QUERY, &[])).unwrap();
        let completion = dispatcher.next_completion().await.unwrap();
        assert!(matches!(completion.outcome, Err(DriverError::Timeout(_))));
        dispatcher.on_completion(completion);

        let result = next_result(&mut dispatcher);
        assert_eq!(result.status, ResultStatus::DriverTimeout);
        assert_eq!(dispatcher.stats().driver_timeouts, 1);
        assert!(!dispatcher.is_busy(DriverId(1)));
    }

    #[tokio::test]
    async fn panicking_driver_is_a_fault() {
        let (driver, _calls) = scripted(Duration::ZERO, true);
        let mut dispatcher = dispatcher_with(driver);

        dispatcher.on_command_frame(&command(6, 1, QUERY, &[])).unwrap();
        let completion = dispatcher.next_completion().await.unwrap();
        assert!(matches!(completion.outcome, Err(DriverError::Fault(_))));
        dispatcher.on_completion(completion);
        assert_eq!(next_result(&mut dispatcher).status, ResultStatus::DriverFault);
    }

    #[tokio::test]
    async fn telemetry_queue_drops_oldest_when_full() {
        let mut drivers = DriverSet::new();
        drivers
            .register(DriverId(1), SimulatedValve::new("vent", ValveDefault::Closed))
            .unwrap();
        let config = DispatchConfig {
            max_queued_telemetry: 2,
            ..DispatchConfig::default()
        };
        let mut dispatcher = Dispatcher::new(drivers, RoutingTable::new(), config).unwrap();

        dispatcher.on_telemetry_ready(DriverId(1), Bytes::from_static(b"a"));
        dispatcher.on_telemetry_ready(DriverId(1), Bytes::from_static(b"b"));
        dispatcher.on_telemetry_ready(DriverId(1), Bytes::from_static(b"c"));

        assert_eq!(dispatcher.queued(), 2);
        assert_eq!(dispatcher.stats().telemetry_dropped, 1);
        let first = TelemetryMessage::decode(&dispatcher.next_outbound().unwrap()).unwrap();
        assert!(matches!(first, TelemetryMessage::Reading { ref data, .. } if data.as_ref() == b"b"));
    }

    #[tokio::test]
    async fn collect_telemetry_polls_every_driver() {
        let mut dispatcher = dispatcher_with(SimulatedValve::new("vent", ValveDefault::Open));
        dispatcher.collect_telemetry();

        assert_eq!(dispatcher.queued(), 1);
        let reading = TelemetryMessage::decode(&dispatcher.next_outbound().unwrap()).unwrap();
        match reading {
            TelemetryMessage::Reading { source, data, .. } => {
                assert_eq!(source, DriverId(1));
                assert_eq!(data.as_ref(), &[2, 0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unacknowledged_record_is_requeued_first() {
        let mut dispatcher = dispatcher_with(SimulatedValve::new("vent", ValveDefault::Closed));
        dispatcher.on_command_frame(&command(7, 9, OVERRIDE, &[1])).unwrap_err();
        dispatcher.on_telemetry_ready(DriverId(1), Bytes::from_static(b"later"));

        let sent = dispatcher.next_outbound().unwrap();
        assert!(dispatcher.next_outbound().is_none(), "one record in flight at a time");
        assert_eq!(dispatcher.queued(), 2);

        dispatcher.requeue_outbound();
        assert_eq!(dispatcher.next_outbound().unwrap(), sent);
        dispatcher.confirm_outbound();

        let reading = TelemetryMessage::decode(&dispatcher.next_outbound().unwrap()).unwrap();
        assert!(matches!(reading, TelemetryMessage::Reading { ref data, .. } if data.as_ref() == b"later"));
        dispatcher.confirm_outbound();
        assert_eq!(dispatcher.queued(), 0);
    }

    #[test]
    fn construction_validates_routes() {
        let mut routes = RoutingTable::new();
        routes
            .insert(OVERRIDE, Route { driver: DriverId(3), capability: Capability::ValveOverride })
            .unwrap();
        let err = Dispatcher::new(DriverSet::new(), routes, DispatchConfig::default()).err();
        assert!(matches!(err, Some(DispatchError::InvalidRoute(_))));
    }
}
