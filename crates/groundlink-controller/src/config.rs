//! TOML controller configuration.
//!
//! Every section has defaults, so an empty file is a valid (if driverless)
//! configuration. `load` parses and validates in one step.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use groundlink_dispatch::{
    Capability, DispatchConfig, Dispatcher, DriverId, DriverSet, Route, RoutingTable,
    SimulatedActuator, SimulatedPressureSensor, SimulatedValve, ValveDefault,
};
use groundlink_frame::DEFAULT_MAX_PAYLOAD;
use groundlink_session::SessionConfig;
use groundlink_transport::LinkAddr;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_ADDRESS: &str = "unix:/tmp/groundlink.sock";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub transport: TransportSection,
    pub link: LinkSection,
    pub dispatch: DispatchSection,
    pub drivers: Vec<DriverSpec>,
    pub routes: Vec<RouteSpec>,
}

/// Whether the controller waits for the peer or dials it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Listen,
    Connect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    pub address: String,
    pub mode: TransportMode,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            mode: TransportMode::Listen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkSection {
    pub heartbeat_interval_ms: u64,
    pub missed_heartbeats: u32,
    pub handshake_timeout_ms: u64,
    pub retry_timeout_ms: u64,
    pub max_retries: u32,
    pub max_payload_size: usize,
    /// Pause between losing the link and the next handshake.
    pub resync_delay_ms: u64,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            missed_heartbeats: 3,
            handshake_timeout_ms: 5000,
            retry_timeout_ms: 500,
            max_retries: 3,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            resync_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    pub driver_timeout_ms: u64,
    pub telemetry_interval_ms: u64,
    pub max_queued_telemetry: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            driver_timeout_ms: 2000,
            telemetry_interval_ms: 1000,
            max_queued_telemetry: 256,
        }
    }
}

/// One `[[drivers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSpec {
    pub id: DriverId,
    pub name: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(flatten)]
    pub kind: DriverKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverKind {
    Valve {
        default_state: ValveDefault,
    },
    Actuator,
    PressureSensor {
        #[serde(default)]
        min_psi: f32,
        #[serde(default = "default_max_psi")]
        max_psi: f32,
    },
}

fn default_max_psi() -> f32 {
    1000.0
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    pub opcode: u8,
    pub driver: DriverId,
    pub capability: Capability,
}

impl ControllerConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link_addr()?;
        self.session_config().validate()?;

        if self.dispatch.driver_timeout_ms == 0 {
            return Err(ConfigError::Invalid("dispatch.driver_timeout_ms must be greater than zero".into()));
        }
        if self.dispatch.telemetry_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.telemetry_interval_ms must be greater than zero".into(),
            ));
        }
        if self.dispatch.max_queued_telemetry == 0 {
            return Err(ConfigError::Invalid("dispatch.max_queued_telemetry must be at least 1".into()));
        }

        let mut seen = BTreeSet::new();
        for driver in &self.drivers {
            if !seen.insert(driver.id) {
                return Err(ConfigError::Invalid(format!("driver id {} declared twice", driver.id)));
            }
            if let DriverKind::PressureSensor { min_psi, max_psi } = driver.kind {
                let in_range = |psi: f32| (0.0..=SimulatedPressureSensor::MAX_RANGE_PSI).contains(&psi);
                if !in_range(min_psi) || !in_range(max_psi) || min_psi >= max_psi {
                    return Err(ConfigError::Invalid(format!(
                        "driver {}: pressure range {min_psi}..{max_psi} psi is not valid",
                        driver.id
                    )));
                }
            }
        }

        let drivers = self.build_drivers()?;
        self.build_routes()?.validate(&drivers)?;
        Ok(())
    }

    pub fn link_addr(&self) -> Result<LinkAddr, ConfigError> {
        Ok(self.transport.address.parse()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        let link = &self.link;
        SessionConfig {
            heartbeat_interval: Duration::from_millis(link.heartbeat_interval_ms),
            missed_heartbeats: link.missed_heartbeats,
            handshake_timeout: Duration::from_millis(link.handshake_timeout_ms),
            retry_timeout: Duration::from_millis(link.retry_timeout_ms),
            max_retries: link.max_retries,
            max_payload_size: link.max_payload_size,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            driver_timeout: Duration::from_millis(self.dispatch.driver_timeout_ms),
            max_queued_telemetry: self.dispatch.max_queued_telemetry,
        }
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.link.resync_delay_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch.telemetry_interval_ms)
    }

    /// Instantiate the simulated drivers.
    pub fn build_drivers(&self) -> Result<DriverSet, ConfigError> {
        let mut drivers = DriverSet::new();
        for driver in &self.drivers {
            let latency = Duration::from_millis(driver.latency_ms);
            let name = driver.name.clone();
            match driver.kind {
                DriverKind::Valve { default_state } => {
                    drivers.register(driver.id, SimulatedValve::new(name, default_state).with_latency(latency))?
                }
                DriverKind::Actuator => {
                    drivers.register(driver.id, SimulatedActuator::new(name).with_latency(latency))?
                }
                DriverKind::PressureSensor { min_psi, max_psi } => drivers.register(
                    driver.id,
                    SimulatedPressureSensor::new(name, min_psi, max_psi).with_latency(latency),
                )?,
            }
        }
        Ok(drivers)
    }

    pub fn build_routes(&self) -> Result<RoutingTable, ConfigError> {
        let mut routes = RoutingTable::new();
        for route in &self.routes {
            routes.insert(
                route.opcode,
                Route {
                    driver: route.driver,
                    capability: route.capability,
                },
            )?;
        }
        Ok(routes)
    }

    /// Fresh dispatcher with newly built drivers.
    pub fn build_dispatcher(&self) -> Result<Dispatcher, ConfigError> {
        Ok(Dispatcher::new(
            self.build_drivers()?,
            self.build_routes()?,
            self.dispatch_config(),
        )?)
    }
}
