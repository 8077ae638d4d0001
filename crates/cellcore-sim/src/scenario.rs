//! Scenario format and runner.
//!
//! A scenario describes the phones, the initial service state of each one,
//! the carrier bundle, a [`FaultPlan`] for the simulated radio and a list of
//! [`Step`]s. The runner drives one [`Coordinator`] and one
//! [`DisplayController`] per phone on a shared mock clock, so a run is fully
//! deterministic for a given seed.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use cellcore_common::{
    CarrierConfig, FrequencyRange, NetworkType, NrState, PhoneId, PhoneRaf, PhysicalLinkState,
    RadioAccessFamily, RadioCapability, ServiceState,
};
use cellcore_radio::capability::coordinator::PhoneCapability;
use cellcore_radio::capability::{CapabilityBroadcast, Coordinator, TransactionSnapshot};
use cellcore_radio::config::{CoordinatorConfigInput, PhoneConfigInput, RuntimeConfigInput};
use cellcore_radio::display::{DisplayController, DisplayEvent, DisplaySnapshot};
use crossbeam_channel::Receiver;
use quanta::Clock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::modem::{FaultPlan, SimRadio};
use crate::service::{DisplayRecorder, DisplayUpdate, SimCarrier, SimServiceState};

// ─── Scenario format ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub coordinator: CoordinatorConfigInput,
    pub phones: Vec<PhoneConfigInput>,
    /// Carrier bundle. Absent means the carrier service never published one.
    pub carrier: Option<CarrierConfig>,
    /// Initial service state per phone; missing entries use the default.
    pub services: Vec<ServiceState>,
    pub faults: FaultPlan,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        toml::from_str(input).map_err(|e| anyhow::anyhow!("Failed to parse scenario: {}", e))
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Request a family per phone, in phone order.
    SetCapability { rafs: Vec<RadioAccessFamily> },
    /// Patch a phone's service state, then deliver `event` to its display.
    ServiceState {
        phone: PhoneId,
        #[serde(default)]
        set: ServiceStatePatch,
        #[serde(default)]
        event: StepEvent,
    },
    /// Deliver a raw event code, as the modem layer would.
    Code {
        phone: PhoneId,
        code: u8,
        #[serde(default)]
        arg: i32,
    },
    /// Publish a new carrier bundle and notify every display.
    Carrier { config: CarrierConfig },
    /// Let simulated time pass, firing every timer that falls due.
    AdvanceMs { ms: u64 },
}

/// Fields of [`ServiceState`] a step may overwrite.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceStatePatch {
    pub data_network_type: Option<NetworkType>,
    pub nr_state: Option<NrState>,
    pub nr_frequency_range: Option<FrequencyRange>,
    pub operator_alpha_long: Option<String>,
    pub operator_alpha_short: Option<String>,
    pub using_carrier_aggregation: Option<bool>,
    pub cell_bandwidths_khz: Option<Vec<u32>>,
    pub preferred_network_types: Option<RadioAccessFamily>,
}

impl ServiceStatePatch {
    fn apply(&self, ss: &mut ServiceState) {
        if let Some(v) = self.data_network_type {
            ss.data_network_type = v;
        }
        if let Some(v) = self.nr_state {
            ss.nr_state = v;
        }
        if let Some(v) = self.nr_frequency_range {
            ss.nr_frequency_range = v;
        }
        if let Some(v) = &self.operator_alpha_long {
            ss.operator_alpha_long = Some(v.clone());
        }
        if let Some(v) = &self.operator_alpha_short {
            ss.operator_alpha_short = Some(v.clone());
        }
        if let Some(v) = self.using_carrier_aggregation {
            ss.using_carrier_aggregation = v;
        }
        if let Some(v) = &self.cell_bandwidths_khz {
            ss.cell_bandwidths_khz = v.clone();
        }
        if let Some(v) = self.preferred_network_types {
            ss.preferred_network_types = v;
        }
    }
}

/// Display event named in a scenario step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEvent {
    #[default]
    Update,
    DataRatChanged,
    NrStateChanged,
    NrFrequencyChanged,
    PhysicalLinkStateChanged(PhysicalLinkState),
    PhysicalChannelConfig(bool),
    CarrierConfigChanged,
    RadioOff,
    PreferredNetworkModeChanged,
    Quit,
}

impl From<StepEvent> for DisplayEvent {
    fn from(event: StepEvent) -> Self {
        match event {
            StepEvent::Update => DisplayEvent::Update,
            StepEvent::DataRatChanged => DisplayEvent::DataRatChanged,
            StepEvent::NrStateChanged => DisplayEvent::NrStateChanged,
            StepEvent::NrFrequencyChanged => DisplayEvent::NrFrequencyChanged,
            StepEvent::PhysicalLinkStateChanged(link) => {
                DisplayEvent::PhysicalLinkStateChanged(link)
            }
            StepEvent::PhysicalChannelConfig(on) => {
                DisplayEvent::PhysicalChannelConfigNotifChanged(on)
            }
            StepEvent::CarrierConfigChanged => DisplayEvent::CarrierConfigChanged,
            StepEvent::RadioOff => DisplayEvent::RadioOffOrUnavailable,
            StepEvent::PreferredNetworkModeChanged => DisplayEvent::PreferredNetworkModeChanged,
            StepEvent::Quit => DisplayEvent::Quit,
        }
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TimedBroadcast {
    pub at_ms: u64,
    #[serde(flatten)]
    pub result: CapabilityBroadcast,
}

/// Everything observable at the end of a run.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub seed: u64,
    pub duration_ms: u64,
    pub broadcasts: Vec<TimedBroadcast>,
    /// Published overrides, consecutive repeats collapsed per phone.
    pub display_timeline: Vec<DisplayUpdate>,
    /// Every capability request the radio received.
    pub requests: Vec<RadioCapability>,
    /// `set_capability` steps refused because a transaction was in flight.
    pub rejected_requests: usize,
    /// Raw event codes the displays did not recognise.
    pub unknown_codes: usize,
    pub phones: Vec<PhoneCapability>,
    pub transaction: TransactionSnapshot,
    pub displays: Vec<DisplaySnapshot>,
}

// ─── Runner ─────────────────────────────────────────────────────────────────

struct World {
    mock: std::sync::Arc<quanta::Mock>,
    elapsed: Duration,
    coordinator: Coordinator,
    radio: SimRadio,
    broadcasts_rx: Receiver<CapabilityBroadcast>,
    broadcasts: Vec<TimedBroadcast>,
    displays: Vec<DisplayController>,
    services: Vec<SimServiceState>,
    carrier: SimCarrier,
}

impl World {
    fn now_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// Run every component until nothing is ready at the current instant.
    fn settle(&mut self) {
        loop {
            self.coordinator.run_until_idle();
            if self.radio.pump(&mut self.coordinator) == 0 {
                break;
            }
        }
        for display in &mut self.displays {
            display.run_until_idle();
        }
        let at_ms = self.now_ms();
        while let Ok(result) = self.broadcasts_rx.try_recv() {
            info!(at_ms, ?result, "capability broadcast");
            self.broadcasts.push(TimedBroadcast { at_ms, result });
        }
    }

    fn next_wait(&self) -> Option<Duration> {
        self.displays
            .iter()
            .filter_map(|d| d.time_until_next())
            .chain(self.coordinator.time_until_next())
            .min()
    }

    fn advance(&mut self, by: Duration) {
        let target = self.elapsed + by;
        while let Some(wait) = self.next_wait() {
            if self.elapsed + wait > target {
                break;
            }
            self.step_clock(wait);
            self.settle();
        }
        let rest = target.saturating_sub(self.elapsed);
        self.step_clock(rest);
        self.settle();
    }

    fn step_clock(&mut self, by: Duration) {
        self.mock.increment(by);
        self.elapsed += by;
    }

    fn display(&mut self, phone: PhoneId) -> anyhow::Result<&mut DisplayController> {
        self.displays
            .get_mut(phone)
            .ok_or_else(|| anyhow::anyhow!("Unknown phone {}", phone))
    }
}

/// Run `scenario` to completion. `seed_override` replaces the scenario's
/// own seed for the fault injector.
pub fn run_scenario(scenario: &Scenario, seed_override: Option<u64>) -> anyhow::Result<ScenarioReport> {
    let seed = seed_override.unwrap_or(scenario.seed);
    let config = RuntimeConfigInput {
        version: 0,
        coordinator: scenario.coordinator.clone(),
        phones: scenario.phones.clone(),
        carrier: scenario.carrier.clone().unwrap_or_default(),
    }
    .resolve()?;

    let (clock, mock) = Clock::mock();
    let radio = SimRadio::new(scenario.faults.clone(), seed);
    let mut coordinator = config.build_coordinator(clock.clone(), Box::new(radio.modem()));
    let broadcasts_rx = coordinator.subscribe();

    let carrier = SimCarrier::new(scenario.carrier.clone());
    let recorder = DisplayRecorder::new(clock.clone());
    let mut services = Vec::with_capacity(config.phones.len());
    let mut displays = Vec::with_capacity(config.phones.len());
    for phone_id in 0..config.phones.len() {
        let state = SimServiceState::new(scenario.services.get(phone_id).cloned().unwrap_or_default());
        displays.push(DisplayController::new(
            phone_id,
            clock.clone(),
            Box::new(state.clone()),
            Box::new(carrier.clone()),
            Box::new(recorder.clone()),
        ));
        services.push(state);
    }

    let mut world = World {
        mock,
        elapsed: Duration::ZERO,
        coordinator,
        radio,
        broadcasts_rx,
        broadcasts: Vec::new(),
        displays,
        services,
        carrier,
    };
    world.settle();

    info!(name = %scenario.name, seed, phones = config.phones.len(), "scenario started");

    let mut rejected_requests = 0;
    let mut unknown_codes = 0;
    for (idx, step) in scenario.steps.iter().enumerate() {
        debug!(step = idx, at_ms = world.now_ms(), ?step, "scenario step");
        match step {
            Step::SetCapability { rafs } => {
                let requests: Vec<PhoneRaf> = rafs
                    .iter()
                    .enumerate()
                    .map(|(id, raf)| PhoneRaf::new(id, *raf))
                    .collect();
                let accepted = world
                    .coordinator
                    .set_radio_capability(&requests)
                    .with_context(|| format!("step {idx}: set_capability"))?;
                if !accepted {
                    warn!(step = idx, "set_capability rejected: transaction in flight");
                    rejected_requests += 1;
                }
            }
            Step::ServiceState { phone, set, event } => {
                let state = world
                    .services
                    .get(*phone)
                    .ok_or_else(|| anyhow::anyhow!("step {}: unknown phone {}", idx, phone))?;
                state.update(|ss| set.apply(ss));
                world.display(*phone)?.post((*event).into());
            }
            Step::Code { phone, code, arg } => {
                if let Err(e) = world.display(*phone)?.post_code(*code, *arg) {
                    warn!(step = idx, error = %e, "event code rejected");
                    unknown_codes += 1;
                }
            }
            Step::Carrier { config } => {
                world.carrier.set(config.clone());
                for display in &mut world.displays {
                    display.post(DisplayEvent::CarrierConfigChanged);
                }
            }
            Step::AdvanceMs { ms } => world.advance(Duration::from_millis(*ms)),
        }
        world.settle();
    }

    let report = ScenarioReport {
        name: scenario.name.clone(),
        seed,
        duration_ms: world.now_ms(),
        broadcasts: world.broadcasts,
        display_timeline: recorder.timeline(),
        requests: world.radio.request_log(),
        rejected_requests,
        unknown_codes,
        phones: (0..world.coordinator.phone_count())
            .filter_map(|id| world.coordinator.phone(id).cloned())
            .collect(),
        transaction: world.coordinator.snapshot(),
        displays: world.displays.iter().map(DisplayController::snapshot).collect(),
    };
    info!(
        name = %report.name,
        duration_ms = report.duration_ms,
        broadcasts = report.broadcasts.len(),
        requests = report.requests.len(),
        "scenario finished"
    );
    Ok(report)
}
