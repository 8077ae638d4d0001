//! Shared fixtures wired into each [`DisplayController`].
//!
//! [`DisplayController`]: cellcore_radio::display::DisplayController

use std::sync::{Arc, Mutex};

use cellcore_common::{CarrierConfig, OverrideNetworkType, PhoneId, ServiceState};
use cellcore_radio::display::{CarrierConfigSource, DisplayInfoSink, ServiceStateProvider};
use quanta::{Clock, Instant};
use serde::Serialize;

/// Service state the scenario mutates between events.
#[derive(Clone, Default)]
pub struct SimServiceState(Arc<Mutex<ServiceState>>);

impl SimServiceState {
    pub fn new(initial: ServiceState) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn update(&self, f: impl FnOnce(&mut ServiceState)) {
        f(&mut self.0.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

impl ServiceStateProvider for SimServiceState {
    fn service_state(&self) -> ServiceState {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Carrier configuration shared by every phone. `None` models a carrier
/// service that has not published a bundle yet.
#[derive(Clone, Default)]
pub struct SimCarrier(Arc<Mutex<Option<CarrierConfig>>>);

impl SimCarrier {
    pub fn new(config: Option<CarrierConfig>) -> Self {
        Self(Arc::new(Mutex::new(config)))
    }

    pub fn set(&self, config: CarrierConfig) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(config);
    }
}

impl CarrierConfigSource for SimCarrier {
    fn carrier_config(&self, _phone_id: PhoneId) -> Option<CarrierConfig> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// One published display update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayUpdate {
    pub at_ms: u64,
    pub phone_id: PhoneId,
    pub override_network_type: OverrideNetworkType,
}

/// Records every published override, stamped with simulated time.
#[derive(Clone)]
pub struct DisplayRecorder {
    clock: Clock,
    start: Instant,
    updates: Arc<Mutex<Vec<DisplayUpdate>>>,
}

impl DisplayRecorder {
    pub fn new(clock: Clock) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            updates: Arc::default(),
        }
    }

    pub fn updates(&self) -> Vec<DisplayUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Updates with consecutive repeats per phone collapsed.
    pub fn timeline(&self) -> Vec<DisplayUpdate> {
        let mut last: Vec<(PhoneId, OverrideNetworkType)> = Vec::new();
        let mut out = Vec::new();
        for update in self.updates() {
            match last.iter_mut().find(|(id, _)| *id == update.phone_id) {
                Some((_, prev)) if *prev == update.override_network_type => continue,
                Some((_, prev)) => *prev = update.override_network_type,
                None => last.push((update.phone_id, update.override_network_type)),
            }
            out.push(update);
        }
        out
    }
}

impl DisplayInfoSink for DisplayRecorder {
    fn update_display_info(&mut self, phone_id: PhoneId, override_type: OverrideNetworkType) {
        let at_ms = self.clock.now().duration_since(self.start).as_millis() as u64;
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(DisplayUpdate {
                at_ms,
                phone_id,
                override_network_type: override_type,
            });
    }
}
