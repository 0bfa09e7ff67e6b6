//! The driver seam: hardware sits behind [`Driver`], registered in a [`DriverSet`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::command::{DriverId, Operation};
use crate::error::{DispatchError, DriverError};
use crate::routing::Capability;

/// A hardware driver.
///
/// `execute` may take arbitrarily long; the dispatcher bounds it with a
/// timeout and never calls it twice concurrently for the same driver.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Human-readable name, for logs and the CLI.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    /// Perform an operation and return its output bytes.
    async fn execute(&self, operation: Operation) -> Result<Bytes, DriverError>;

    /// Current reading, if the driver has one to report.
    fn poll_telemetry(&self) -> Option<Bytes> {
        None
    }
}

/// Registered drivers keyed by id.
#[derive(Default, Clone)]
pub struct DriverSet {
    drivers: BTreeMap<DriverId, Arc<dyn Driver>>,
}

impl DriverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: DriverId, driver: impl Driver + 'static) -> Result<(), DispatchError> {
        self.register_arc(id, Arc::new(driver))
    }

    pub fn register_arc(&mut self, id: DriverId, driver: Arc<dyn Driver>) -> Result<(), DispatchError> {
        if self.drivers.contains_key(&id) {
            return Err(DispatchError::InvalidRoute(format!("driver id {id} registered twice")));
        }
        self.drivers.insert(id, driver);
        Ok(())
    }

    pub fn get(&self, id: DriverId) -> Option<Arc<dyn Driver>> {
        self.drivers.get(&id).cloned()
    }

    pub fn contains(&self, id: DriverId) -> bool {
        self.drivers.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = DriverId> + '_ {
        self.drivers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Run an operation on a driver.
    pub async fn execute(&self, id: DriverId, operation: Operation) -> Result<Bytes, DriverError> {
        match self.drivers.get(&id) {
            Some(driver) => driver.execute(operation).await,
            None => Err(DriverError::Fault(format!("driver {id} is not registered"))),
        }
    }

    pub fn poll_telemetry(&self, id: DriverId) -> Option<Bytes> {
        self.drivers.get(&id).and_then(|driver| driver.poll_telemetry())
    }
}

impl std::fmt::Debug for DriverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.drivers.iter().map(|(id, driver)| (id, driver.name())))
            .finish()
    }
}
