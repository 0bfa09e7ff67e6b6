//! Simulated drivers for running without hardware attached.
//!
//! They keep state in memory and answer like the real passthrough valves,
//! the QDC actuator and the passthrough pressure sensors would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::command::{ActuatorState, Operation};
use crate::driver::Driver;
use crate::error::DriverError;
use crate::routing::Capability;

/// Unpowered position of a passthrough valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveDefault {
    Open,
    Closed,
}

/// Reported valve position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValveState {
    Closed = 0,
    Open = 1,
    /// Not overridden: the flight computer owns the valve.
    Unknown = 2,
}

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

fn unsupported(driver: &str, operation: Operation) -> DriverError {
    DriverError::Fault(format!("{driver} cannot perform {operation:?}"))
}

/// Passthrough valve. The controller can only override it to the powered
/// position, which is the opposite of its default.
#[derive(Debug)]
pub struct SimulatedValve {
    name: String,
    default: ValveDefault,
    overridden: AtomicBool,
    latency: Duration,
}

impl SimulatedValve {
    const CAPABILITIES: &'static [Capability] = &[Capability::ValveOverride, Capability::StateQuery];

    pub fn new(name: impl Into<String>, default: ValveDefault) -> Self {
        Self {
            name: name.into(),
            default,
            overridden: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ValveState {
        match (self.is_overridden(), self.default) {
            (false, _) => ValveState::Unknown,
            (true, ValveDefault::Closed) => ValveState::Open,
            (true, ValveDefault::Open) => ValveState::Closed,
        }
    }

    fn default_code(&self) -> u8 {
        match self.default {
            ValveDefault::Closed => ValveState::Closed as u8,
            ValveDefault::Open => ValveState::Open as u8,
        }
    }
}

#[async_trait]
impl Driver for SimulatedValve {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        Self::CAPABILITIES
    }

    async fn execute(&self, operation: Operation) -> Result<Bytes, DriverError> {
        simulate_latency(self.latency).await;
        match operation {
            Operation::SetOverride(on) => {
                self.overridden.store(on, Ordering::SeqCst);
                Ok(Bytes::copy_from_slice(&[self.state() as u8]))
            }
            Operation::QueryState => Ok(Bytes::copy_from_slice(&[
                self.state() as u8,
                self.is_overridden() as u8,
                self.default_code(),
            ])),
            other => Err(unsupported(&self.name, other)),
        }
    }

    fn poll_telemetry(&self) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(&[
            self.state() as u8,
            self.is_overridden() as u8,
        ]))
    }
}

/// Quick-disconnect actuator. Starts locked.
#[derive(Debug)]
pub struct SimulatedActuator {
    name: String,
    released: AtomicBool,
    latency: Duration,
}

impl SimulatedActuator {
    const CAPABILITIES: &'static [Capability] = &[Capability::ActuatorControl, Capability::StateQuery];

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            released: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn state(&self) -> ActuatorState {
        if self.released.load(Ordering::SeqCst) {
            ActuatorState::Released
        } else {
            ActuatorState::Locked
        }
    }
}

#[async_trait]
impl Driver for SimulatedActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        Self::CAPABILITIES
    }

    async fn execute(&self, operation: Operation) -> Result<Bytes, DriverError> {
        simulate_latency(self.latency).await;
        match operation {
            Operation::SetActuator(state) => {
                self.released
                    .store(state == ActuatorState::Released, Ordering::SeqCst);
                Ok(Bytes::copy_from_slice(&[self.state().as_u8()]))
            }
            Operation::QueryState => Ok(Bytes::copy_from_slice(&[self.state().as_u8()])),
            other => Err(unsupported(&self.name, other)),
        }
    }

    fn poll_telemetry(&self) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(&[self.state().as_u8()]))
    }
}

/// Passthrough pressure sensor producing a slow sine around mid-range.
#[derive(Debug)]
pub struct SimulatedPressureSensor {
    name: String,
    min_psi: f32,
    max_psi: f32,
    started: Instant,
    latency: Duration,
}

impl SimulatedPressureSensor {
    const CAPABILITIES: &'static [Capability] = &[Capability::PressureRead, Capability::StateQuery];

    /// Largest pressure any supported sensor can measure.
    pub const MAX_RANGE_PSI: f32 = 10_000.0;

    pub fn new(name: impl Into<String>, min_psi: f32, max_psi: f32) -> Self {
        Self {
            name: name.into(),
            min_psi,
            max_psi,
            started: Instant::now(),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Pressure at `elapsed` seconds after start, in psi.
    pub fn pressure_at(&self, elapsed: f32) -> f32 {
        let span = self.max_psi - self.min_psi;
        let midpoint = (self.min_psi + self.max_psi) / 2.0;
        let variation = (elapsed * 0.5).sin() * span * 0.1;
        (midpoint + variation).clamp(self.min_psi, self.max_psi)
    }

    pub fn pressure(&self) -> f32 {
        self.pressure_at(self.started.elapsed().as_secs_f32())
    }

    fn reading(&self) -> Bytes {
        Bytes::copy_from_slice(&self.pressure().to_le_bytes())
    }
}

#[async_trait]
impl Driver for SimulatedPressureSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        Self::CAPABILITIES
    }

    async fn execute(&self, operation: Operation) -> Result<Bytes, DriverError> {
        simulate_latency(self.latency).await;
        match operation {
            Operation::ReadPressure | Operation::QueryState => Ok(self.reading()),
            other => Err(unsupported(&self.name, other)),
        }
    }

    fn poll_telemetry(&self) -> Option<Bytes> {
        Some(self.reading())
    }
}
