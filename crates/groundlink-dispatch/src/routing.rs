//! Static opcode routing, built once at startup.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::DriverId;
use crate::driver::DriverSet;
use crate::error::{DispatchError, Result};

/// What a driver can do. Routes bind an opcode to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ValveOverride,
    ActuatorControl,
    PressureRead,
    StateQuery,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::ValveOverride => "valve_override",
            Capability::ActuatorControl => "actuator_control",
            Capability::PressureRead => "pressure_read",
            Capability::StateQuery => "state_query",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub driver: DriverId,
    pub capability: Capability,
}

/// Opcode -> route mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: BTreeMap<u8, Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Each opcode can be routed once.
    pub fn insert(&mut self, opcode: u8, route: Route) -> Result<()> {
        if self.routes.contains_key(&opcode) {
            return Err(DispatchError::InvalidRoute(format!(
                "opcode {opcode:#04x} routed more than once"
            )));
        }
        self.routes.insert(opcode, route);
        Ok(())
    }

    pub fn lookup(&self, opcode: u8) -> Option<&Route> {
        self.routes.get(&opcode)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Route)> {
        self.routes.iter().map(|(opcode, route)| (*opcode, route))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Check every route against the registered drivers.
    pub fn validate(&self, drivers: &DriverSet) -> Result<()> {
        for (opcode, route) in &self.routes {
            let driver = drivers.get(route.driver).ok_or_else(|| {
                DispatchError::InvalidRoute(format!(
                    "opcode {opcode:#04x} routes to unregistered driver {}",
                    route.driver
                ))
            })?;
            if !driver.capabilities().contains(&route.capability) {
                return Err(DispatchError::InvalidRoute(format!(
                    "opcode {opcode:#04x}: driver {} ({}) lacks capability {}",
                    route.driver,
                    driver.name(),
                    route.capability
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{SimulatedValve, ValveDefault};

    fn valve_set() -> DriverSet {
        let mut drivers = DriverSet::new();
        drivers
            .register(DriverId(1), SimulatedValve::new("vent", ValveDefault::Closed))
            .unwrap();
        drivers
    }

    #[test]
    fn duplicate_opcode_is_rejected() {
        let mut table = RoutingTable::new();
        let route = Route {
            driver: DriverId(1),
            capability: Capability::ValveOverride,
        };
        table.insert(0x10, route).unwrap();
        assert!(matches!(table.insert(0x10, route), Err(DispatchError::InvalidRoute(_))));
    }

    #[test]
    fn validate_checks_driver_and_capability() {
        let drivers = valve_set();

        let mut table = RoutingTable::new();
        table
            .insert(0x10, Route { driver: DriverId(1), capability: Capability::ValveOverride })
            .unwrap();
        table.validate(&drivers).unwrap();

        let mut unknown = RoutingTable::new();
        unknown
            .insert(0x10, Route { driver: DriverId(9), capability: Capability::ValveOverride })
            .unwrap();
        assert!(unknown.validate(&drivers).is_err());

        let mut lacking = RoutingTable::new();
        lacking
            .insert(0x20, Route { driver: DriverId(1), capability: Capability::PressureRead })
            .unwrap();
        let err = lacking.validate(&drivers).unwrap_err();
        assert!(err.to_string().contains("pressure_read"));
    }

    #[test]
    fn iterates_in_opcode_order() {
        let mut table = RoutingTable::new();
        for opcode in [0x30, 0x10, 0x20] {
            table
                .insert(opcode, Route { driver: DriverId(1), capability: Capability::StateQuery })
                .unwrap();
        }
        let opcodes: Vec<u8> = table.iter().map(|(op, _)| op).collect();
        assert_eq!(opcodes, vec![0x10, 0x20, 0x30]);
    }
}
