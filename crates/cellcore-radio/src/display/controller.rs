//! # Display Controller
//!
//! Per-phone state machine behind the 5G / LTE+ status icon. Every state
//! change goes through `transition_to`, which cancels timers that no longer protect
//! anything and then republishes the display type unless a grace timer is
//! holding it.
//!
//! Hysteresis works on state *names* (see [`rules`](super::rules)):
//!
//! - `previous_state` is the last state whose display was actually shown.
//! - A transition arms the primary timer with the rule for
//!   `previous_state → destination`. While it runs the internal state moves
//!   on but the published display stays frozen.
//! - Primary expiry looks up the secondary timer with the rule of the
//!   primary timer's *origin* toward the current state.
//! - Re-entering `connected_mmwave` clears every timer.

use std::time::Duration;

use quanta::{Clock, Instant};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use cellcore_common::{
    CarrierConfig, NetworkType, OverrideNetworkType, PhoneId, PhysicalLinkState,
    RadioAccessFamily, ServiceState,
};

use super::rules::{
    STATE_CONNECTED, STATE_CONNECTED_MMWAVE, STATE_NOT_RESTRICTED_RRC_CON,
    STATE_NOT_RESTRICTED_RRC_IDLE, STATE_RESTRICTED, TimerRules,
};
use super::{
    CarrierConfigSource, DisplayError, DisplayEvent, DisplayInfoSink, DisplayState,
    ServiceStateProvider,
};
use crate::event::EventQueue;

/// Serializable dump of the controller, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySnapshot {
    pub phone_id: PhoneId,
    pub state: &'static str,
    pub override_network_type: OverrideNetworkType,
    pub previous_state: &'static str,
    pub primary_timer_active: bool,
    pub primary_timer_state: Option<&'static str>,
    pub secondary_timer_active: bool,
    pub secondary_timer_state: Option<&'static str>,
    pub physical_link_state: PhysicalLinkState,
    pub physical_channel_config_on: bool,
}

/// Carrier values the display computation reads, refreshed on every
/// carrier config change.
#[derive(Debug, Clone)]
struct DisplayConfig {
    rules: TimerRules,
    lte_plus_threshold_khz: u32,
    lte_enhanced_pattern: Vec<String>,
    reset_timers_on_legacy_rrc_idle: bool,
}

impl DisplayConfig {
    fn from_carrier(config: &CarrierConfig) -> Self {
        DisplayConfig {
            rules: TimerRules::parse(config),
            lte_plus_threshold_khz: config.lte_plus_threshold_bandwidth_khz,
            lte_enhanced_pattern: config
                .lte_enhanced_pattern
                .split('|')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            reset_timers_on_legacy_rrc_idle: config.nr_timers_reset_if_non_endc_and_rrc_idle,
        }
    }
}

pub struct DisplayController {
    phone_id: PhoneId,
    queue: EventQueue<DisplayEvent>,
    service: Box<dyn ServiceStateProvider>,
    carrier: Box<dyn CarrierConfigSource>,
    sink: Box<dyn DisplayInfoSink>,
    config: DisplayConfig,

    state: DisplayState,
    override_network_type: OverrideNetworkType,
    previous_state: &'static str,
    primary_timer_active: bool,
    primary_timer_state: Option<&'static str>,
    secondary_timer_active: bool,
    secondary_timer_state: Option<&'static str>,
    physical_link_state: PhysicalLinkState,
    physical_channel_config_on: bool,
    quit: bool,
}

impl DisplayController {
    /// Starts in `legacy` with an `Initialize` event queued, which loads the
    /// carrier config and moves to whatever state the service state implies.
    pub fn new(
        phone_id: PhoneId,
        clock: Clock,
        service: Box<dyn ServiceStateProvider>,
        carrier: Box<dyn CarrierConfigSource>,
        sink: Box<dyn DisplayInfoSink>,
    ) -> Self {
        let initial = DisplayState::Legacy { restricted: false };
        let mut controller = DisplayController {
            phone_id,
            queue: EventQueue::new(clock),
            service,
            carrier,
            sink,
            config: DisplayConfig::from_carrier(&CarrierConfig::default()),
            state: initial,
            override_network_type: OverrideNetworkType::None,
            previous_state: initial.name(),
            primary_timer_active: false,
            primary_timer_state: None,
            secondary_timer_active: false,
            secondary_timer_state: None,
            physical_link_state: PhysicalLinkState::Unknown,
            physical_channel_config_on: true,
            quit: false,
        };
        controller.queue.push(DisplayEvent::Initialize);
        controller
    }

    // ─── Queries ────────────────────────────────────────────────────────

    /// Display type currently published.
    pub fn override_network_type(&self) -> OverrideNetworkType {
        self.override_network_type
    }

    pub fn current_state(&self) -> DisplayState {
        self.state
    }

    /// Whether a grace timer is holding the display.
    pub fn is_timer_active(&self) -> bool {
        self.primary_timer_active || self.secondary_timer_active
    }

    pub fn phone_id(&self) -> PhoneId {
        self.phone_id
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            phone_id: self.phone_id,
            state: self.state.name(),
            override_network_type: self.override_network_type,
            previous_state: self.previous_state,
            primary_timer_active: self.primary_timer_active,
            primary_timer_state: self.primary_timer_state,
            secondary_timer_active: self.secondary_timer_active,
            secondary_timer_state: self.secondary_timer_state,
            physical_link_state: self.physical_link_state,
            physical_channel_config_on: self.physical_channel_config_on,
        }
    }

    // ─── Event loop ─────────────────────────────────────────────────────

    pub fn post(&mut self, event: DisplayEvent) {
        self.queue.push(event);
    }

    /// Queue a raw collaborator event. An unknown code is an internal
    /// consistency failure: timers are cleared, the state is re-derived and
    /// the error returned.
    pub fn post_code(&mut self, code: u8, arg: i32) -> Result<(), DisplayError> {
        match DisplayEvent::from_code(code, arg) {
            Some(event) => {
                self.post(event);
                Ok(())
            }
            None => {
                error!(phone_id = self.phone_id, code, "received invalid display event");
                let ss = self.service.service_state();
                self.reset_all_timers();
                self.transition_to_current_state(&ss);
                Err(DisplayError::UnknownEvent(code))
            }
        }
    }

    pub fn process_next(&mut self) -> bool {
        match self.queue.pop_ready() {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    pub fn run_until_idle(&mut self) -> usize {
        let mut n = 0;
        while self.process_next() {
            n += 1;
        }
        n
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Time until the next queued event is due.
    pub fn time_until_next(&self) -> Option<Duration> {
        self.queue.time_until_next()
    }

    fn handle(&mut self, event: DisplayEvent) {
        if self.quit {
            debug!(phone_id = self.phone_id, ?event, "display controller stopped, event dropped");
            return;
        }
        debug!(phone_id = self.phone_id, state = %self.state, ?event, "display event");

        let ss = self.service.service_state();
        let handled = match self.state {
            DisplayState::Legacy { .. } => self.handle_legacy(event, &ss),
            DisplayState::Idle => self.handle_idle(event, &ss),
            DisplayState::LteConnected => self.handle_lte_connected(event, &ss),
            DisplayState::NrConnected { .. } => self.handle_nr_connected(event, &ss),
        };
        if !handled {
            self.handle_default(event, &ss);
        }
    }

    // ─── Per-state handlers ─────────────────────────────────────────────

    fn handle_default(&mut self, event: DisplayEvent, ss: &ServiceState) {
        match event {
            DisplayEvent::Update => self.transition_to_current_state(ss),
            DisplayEvent::PreferredNetworkModeChanged => {
                self.reset_all_timers();
                self.transition_to_current_state(ss);
            }
            DisplayEvent::Quit => {
                self.reset_all_timers();
                self.transition_to(DisplayState::Legacy { restricted: false }, ss);
                self.quit = true;
                info!(phone_id = self.phone_id, "display controller quit");
            }
            DisplayEvent::Initialize => {
                self.reload_carrier_config();
                self.transition_to_current_state(ss);
            }
            DisplayEvent::DataRatChanged
            | DisplayEvent::NrStateChanged
            | DisplayEvent::NrFrequencyChanged => {}
            DisplayEvent::PhysicalLinkStateChanged(link) => self.physical_link_state = link,
            DisplayEvent::PhysicalChannelConfigNotifChanged(on) => {
                self.physical_channel_config_on = on;
                if !on {
                    self.reset_all_timers();
                }
                self.transition_to_current_state(ss);
            }
            DisplayEvent::CarrierConfigChanged => {
                self.reload_carrier_config();
                self.reset_all_timers();
                self.transition_to_current_state(ss);
            }
            DisplayEvent::PrimaryTimerExpired => self.transition_with_secondary_timer(ss),
            DisplayEvent::SecondaryTimerExpired => {
                debug!(phone_id = self.phone_id, state = ?self.secondary_timer_state, "secondary timer expired");
                self.secondary_timer_active = false;
                self.secondary_timer_state = None;
                self.update_timers(ss);
                self.update_override_network_type(ss);
            }
            DisplayEvent::RadioOffOrUnavailable => {
                self.reset_all_timers();
                self.transition_to(DisplayState::Legacy { restricted: false }, ss);
            }
        }
    }

    fn handle_legacy(&mut self, event: DisplayEvent, ss: &ServiceState) -> bool {
        match event {
            DisplayEvent::NrFrequencyChanged => {}
            DisplayEvent::DataRatChanged | DisplayEvent::NrStateChanged => {
                let rat = ss.data_network_type;
                if is_nr_connected(ss) {
                    self.transition_with_timer_to(nr_connected(ss), ss);
                } else if rat.is_lte() && ss.is_nr_not_restricted() {
                    let dest = self.not_restricted_state();
                    self.transition_with_timer_to(dest, ss);
                } else {
                    if !rat.is_lte() {
                        // 2G/3G never shows NR icons.
                        self.reset_all_timers();
                    }
                    self.state = legacy(ss);
                    self.update_override_network_type(ss);
                }
            }
            DisplayEvent::PhysicalLinkStateChanged(link) => {
                self.physical_link_state = link;
                if self.config.reset_timers_on_legacy_rrc_idle && link != PhysicalLinkState::Active
                {
                    self.reset_all_timers();
                    self.update_override_network_type(ss);
                }
            }
            _ => return false,
        }
        true
    }

    fn handle_idle(&mut self, event: DisplayEvent, ss: &ServiceState) -> bool {
        match event {
            DisplayEvent::NrFrequencyChanged => {}
            DisplayEvent::DataRatChanged | DisplayEvent::NrStateChanged => {
                if is_nr_connected(ss) {
                    self.transition_with_timer_to(nr_connected(ss), ss);
                } else if !ss.data_network_type.is_lte() || !ss.is_nr_not_restricted() {
                    self.transition_with_timer_to(legacy(ss), ss);
                }
            }
            DisplayEvent::PhysicalLinkStateChanged(link) => {
                self.physical_link_state = link;
                if ss.is_nr_not_restricted() {
                    if link == PhysicalLinkState::Active {
                        self.transition_with_timer_to(DisplayState::LteConnected, ss);
                    }
                } else {
                    self.queue.push(DisplayEvent::NrStateChanged);
                }
            }
            _ => return false,
        }
        true
    }

    fn handle_lte_connected(&mut self, event: DisplayEvent, ss: &ServiceState) -> bool {
        match event {
            DisplayEvent::NrFrequencyChanged => {}
            DisplayEvent::DataRatChanged | DisplayEvent::NrStateChanged => {
                if is_nr_connected(ss) {
                    self.transition_with_timer_to(nr_connected(ss), ss);
                } else if !ss.data_network_type.is_lte() || !ss.is_nr_not_restricted() {
                    self.transition_with_timer_to(legacy(ss), ss);
                }
            }
            DisplayEvent::PhysicalLinkStateChanged(link) => {
                self.physical_link_state = link;
                if ss.is_nr_not_restricted() {
                    if link != PhysicalLinkState::Active {
                        self.transition_with_timer_to(DisplayState::Idle, ss);
                    }
                } else {
                    self.queue.push(DisplayEvent::NrStateChanged);
                }
            }
            _ => return false,
        }
        true
    }

    fn handle_nr_connected(&mut self, event: DisplayEvent, ss: &ServiceState) -> bool {
        match event {
            DisplayEvent::DataRatChanged | DisplayEvent::NrStateChanged => {
                let rat = ss.data_network_type;
                if is_nr_connected(ss) {
                    // LTE / LTE-CA anchor change.
                    self.update_override_network_type(ss);
                } else if rat.is_lte() && ss.is_nr_not_restricted() {
                    let dest = self.not_restricted_state();
                    self.transition_with_timer_to(dest, ss);
                } else {
                    self.transition_with_timer_to(legacy(ss), ss);
                }
            }
            DisplayEvent::NrFrequencyChanged => {
                let dest = nr_connected(ss);
                if ss.is_nr_mmwave() {
                    self.transition_to(dest, ss);
                } else {
                    self.transition_with_timer_to(dest, ss);
                }
            }
            DisplayEvent::PhysicalLinkStateChanged(link) => self.physical_link_state = link,
            _ => return false,
        }
        true
    }

    // ─── Transitions ────────────────────────────────────────────────────

    /// Enter `state`, re-running entry actions even when it is the current
    /// state.
    fn transition_to(&mut self, state: DisplayState, ss: &ServiceState) {
        if state != self.state {
            info!(phone_id = self.phone_id, from = %self.state, to = %state, "display state change");
        }
        self.state = state;
        self.update_timers(ss);
        self.update_override_network_type(ss);
        if !self.is_timer_active() {
            self.previous_state = state.name();
        }
    }

    /// Transition, arming the primary timer from the rule of the last
    /// displayed state. A same-name transition never arms a timer.
    fn transition_with_timer_to(&mut self, dest: DisplayState, ss: &ServiceState) {
        let dest_name = dest.name();
        let secs = if dest_name == self.state.name() {
            0
        } else {
            self.config
                .rules
                .get(self.previous_state)
                .map(|rule| rule.primary_timer(dest_name))
                .unwrap_or(0)
        };
        if secs > 0 {
            debug!(
                phone_id = self.phone_id,
                from = self.previous_state,
                to = dest_name,
                secs,
                "primary timer armed"
            );
            self.queue
                .remove_where(|e| *e == DisplayEvent::PrimaryTimerExpired);
            self.primary_timer_state = Some(self.previous_state);
            self.previous_state = self.state.name();
            self.primary_timer_active = true;
            self.queue.push_delayed(
                DisplayEvent::PrimaryTimerExpired,
                Duration::from_secs(u64::from(secs)),
            );
        }
        self.transition_to(dest, ss);
    }

    /// Primary expiry: maybe arm the secondary timer, then release the
    /// primary freeze by re-entering the current state.
    fn transition_with_secondary_timer(&mut self, ss: &ServiceState) {
        let current = self.state.name();
        let secs = self
            .primary_timer_state
            .and_then(|origin| self.config.rules.get(origin))
            .map(|rule| rule.secondary_timer(current))
            .unwrap_or(0);
        debug!(
            phone_id = self.phone_id,
            origin = ?self.primary_timer_state,
            current,
            secondary_secs = secs,
            "primary timer expired"
        );
        if secs > 0 {
            self.secondary_timer_state = Some(current);
            self.previous_state = current;
            self.secondary_timer_active = true;
            self.queue.push_delayed(
                DisplayEvent::SecondaryTimerExpired,
                Duration::from_secs(u64::from(secs)),
            );
        }
        self.primary_timer_active = false;
        self.transition_to(self.state, ss);
    }

    /// Move to whatever state the live inputs indicate.
    fn transition_to_current_state(&mut self, ss: &ServiceState) {
        let rat = ss.data_network_type;
        let dest = if is_nr_connected(ss) {
            nr_connected(ss)
        } else if rat.is_lte() && ss.is_nr_not_restricted() {
            self.not_restricted_state()
        } else {
            legacy(ss)
        };
        if dest.name() != self.state.name() {
            self.transition_to(dest, ss);
        } else {
            self.state = dest;
            self.update_override_network_type(ss);
        }
    }

    fn not_restricted_state(&self) -> DisplayState {
        if self.physical_link_state == PhysicalLinkState::Active {
            DisplayState::LteConnected
        } else {
            DisplayState::Idle
        }
    }

    // ─── Timers ─────────────────────────────────────────────────────────

    fn update_timers(&mut self, ss: &ServiceState) {
        let current = self.state.name();
        if self.primary_timer_active
            && self.override_network_type == self.compute_override_network_type(ss)
        {
            debug!(phone_id = self.phone_id, "display back to frozen value, primary timer cancelled");
            self.queue
                .remove_where(|e| *e == DisplayEvent::PrimaryTimerExpired);
            self.primary_timer_active = false;
            self.primary_timer_state = None;
        }
        if self.secondary_timer_active && self.secondary_timer_state != Some(current) {
            debug!(phone_id = self.phone_id, "left secondary timer state, secondary timer cancelled");
            self.queue
                .remove_where(|e| *e == DisplayEvent::SecondaryTimerExpired);
            self.secondary_timer_active = false;
            self.secondary_timer_state = None;
        }
        if current == STATE_CONNECTED_MMWAVE {
            self.reset_all_timers();
        }
    }

    fn reset_all_timers(&mut self) {
        self.queue.remove_where(|e| {
            matches!(
                e,
                DisplayEvent::PrimaryTimerExpired | DisplayEvent::SecondaryTimerExpired
            )
        });
        self.primary_timer_active = false;
        self.primary_timer_state = None;
        self.secondary_timer_active = false;
        self.secondary_timer_state = None;
    }

    // ─── Display computation ────────────────────────────────────────────

    fn update_override_network_type(&mut self, ss: &ServiceState) {
        if self.is_timer_active() {
            return;
        }
        let next = self.compute_override_network_type(ss);
        if next != self.override_network_type {
            info!(
                phone_id = self.phone_id,
                from = %self.override_network_type,
                to = %next,
                state = %self.state,
                "override network type changed"
            );
        }
        self.override_network_type = next;
        self.sink.update_display_info(self.phone_id, next);
    }

    fn compute_override_network_type(&self, ss: &ServiceState) -> OverrideNetworkType {
        let rat = ss.data_network_type;
        let nr_nsa = ss.nr_state != cellcore_common::NrState::None;
        let nr_sa = rat == NetworkType::Nr;

        if self.physical_channel_config_on && (nr_nsa || nr_sa) {
            match self.nr_display_type(ss, nr_sa) {
                OverrideNetworkType::None => self.lte_display_type(ss),
                nr => nr,
            }
        } else if rat.is_lte() {
            self.lte_display_type(ss)
        } else {
            OverrideNetworkType::None
        }
    }

    fn nr_display_type(&self, ss: &ServiceState, nr_sa: bool) -> OverrideNetworkType {
        if !nr_sa && !ss.preferred_network_types.intersects(RadioAccessFamily::NR) {
            return OverrideNetworkType::None;
        }

        let mut keys: Vec<&str> = Vec::with_capacity(2);
        if ss.is_nr_connected() || nr_sa {
            if ss.is_nr_mmwave() {
                keys.push(STATE_CONNECTED_MMWAVE);
            }
            keys.push(STATE_CONNECTED);
        } else if ss.is_nr_not_restricted() {
            keys.push(if self.physical_link_state == PhysicalLinkState::Active {
                STATE_NOT_RESTRICTED_RRC_CON
            } else {
                STATE_NOT_RESTRICTED_RRC_IDLE
            });
        } else if ss.is_nr_restricted() {
            keys.push(STATE_RESTRICTED);
        }

        keys.into_iter()
            .map(|key| self.config.rules.override_type(key))
            .find(|t| *t != OverrideNetworkType::None)
            .unwrap_or(OverrideNetworkType::None)
    }

    fn lte_display_type(&self, ss: &ServiceState) -> OverrideNetworkType {
        let mut value = OverrideNetworkType::None;
        if (ss.data_network_type == NetworkType::LteCa || ss.using_carrier_aggregation)
            && ss.total_bandwidth_khz() > self.config.lte_plus_threshold_khz
        {
            value = OverrideNetworkType::LteCa;
        }
        if self.is_lte_enhanced_available(ss) {
            value = OverrideNetworkType::LteAdvancedPro;
        }
        value
    }

    fn is_lte_enhanced_available(&self, ss: &ServiceState) -> bool {
        if self.config.lte_enhanced_pattern.is_empty() {
            return false;
        }
        ss.operator_names().any(|name| {
            self.config
                .lte_enhanced_pattern
                .iter()
                .any(|p| name.contains(p.as_str()))
        })
    }

    fn reload_carrier_config(&mut self) {
        let config = match self.carrier.carrier_config(self.phone_id) {
            Some(config) => config,
            None => {
                warn!(phone_id = self.phone_id, "no carrier config, using defaults");
                CarrierConfig::default()
            }
        };
        self.config = DisplayConfig::from_carrier(&config);
    }
}

/// NR connected on an LTE anchor, or standalone NR.
fn is_nr_connected(ss: &ServiceState) -> bool {
    let rat = ss.data_network_type;
    rat == NetworkType::Nr || (rat.is_lte() && ss.is_nr_connected())
}

fn nr_connected(ss: &ServiceState) -> DisplayState {
    DisplayState::NrConnected {
        mmwave: ss.is_nr_mmwave(),
    }
}

fn legacy(ss: &ServiceState) -> DisplayState {
    DisplayState::Legacy {
        restricted: ss.is_nr_restricted(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellcore_common::{FrequencyRange, NrState};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared<T>(Arc<Mutex<T>>);

    impl ServiceStateProvider for Shared<ServiceState> {
        fn service_state(&self) -> ServiceState {
            self.0.lock().unwrap().clone()
        }
    }

    impl CarrierConfigSource for Shared<Option<CarrierConfig>> {
        fn carrier_config(&self, _phone_id: PhoneId) -> Option<CarrierConfig> {
            self.0.lock().unwrap().clone()
        }
    }

    impl DisplayInfoSink for Shared<Vec<OverrideNetworkType>> {
        fn update_display_info(&mut self, _phone_id: PhoneId, t: OverrideNetworkType) {
            self.0.lock().unwrap().push(t);
        }
    }

    struct Harness {
        ctl: DisplayController,
        ss: Shared<ServiceState>,
        carrier: Shared<Option<CarrierConfig>>,
        published: Shared<Vec<OverrideNetworkType>>,
        mock: Arc<quanta::Mock>,
    }

    impl Harness {
        fn new(ss: ServiceState, carrier: CarrierConfig) -> Self {
            let (clock, mock) = Clock::mock();
            let ss = Shared(Arc::new(Mutex::new(ss)));
            let carrier = Shared(Arc::new(Mutex::new(Some(carrier))));
            let published = Shared::<Vec<OverrideNetworkType>>::default();
            let mut ctl = DisplayController::new(
                0,
                clock,
                Box::new(ss.clone()),
                Box::new(carrier.clone()),
                Box::new(published.clone()),
            );
            ctl.run_until_idle();
            Harness {
                ctl,
                ss,
                carrier,
                published,
                mock,
            }
        }

        fn set(&self, f: impl FnOnce(&mut ServiceState)) {
            f(&mut self.ss.0.lock().unwrap());
        }

        fn send(&mut self, event: DisplayEvent) {
            self.ctl.post(event);
            self.ctl.run_until_idle();
        }

        fn advance(&mut self, secs: u64) {
            self.mock.increment(Duration::from_secs(secs));
            self.ctl.run_until_idle();
        }
    }

    fn lte(nr_state: NrState) -> ServiceState {
        ServiceState {
            data_network_type: NetworkType::Lte,
            nr_state,
            ..Default::default()
        }
    }

    fn carrier(icons: &str, primary: &str, secondary: &str) -> CarrierConfig {
        CarrierConfig {
            nr_icon_configuration: icons.into(),
            nr_icon_display_grace_period: primary.into(),
            nr_icon_display_secondary_grace_period: secondary.into(),
            ..Default::default()
        }
    }

    // ─── Classification ─────────────────────────────────────────────────

    #[test]
    fn initial_state_follows_service_state() {
        let h = Harness::new(lte(NrState::Connected), CarrierConfig::default());
        assert_eq!(h.ctl.current_state(), DisplayState::NrConnected { mmwave: false });
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsa);
        assert_eq!(h.published.0.lock().unwrap().last(), Some(&OverrideNetworkType::NrNsa));
    }

    #[test]
    fn restricted_nr_is_labelled_legacy() {
        let h = Harness::new(lte(NrState::Restricted), CarrierConfig::default());
        assert_eq!(h.ctl.current_state(), DisplayState::Legacy { restricted: true });
        assert_eq!(h.ctl.current_state().name(), STATE_RESTRICTED);
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    #[test]
    fn nr_state_on_non_lte_rat_uses_nr_icons() {
        let ss = ServiceState {
            data_network_type: NetworkType::Umts,
            nr_state: NrState::Restricted,
            ..Default::default()
        };
        let h = Harness::new(ss, carrier("restricted:5g", "", ""));
        assert_eq!(h.ctl.current_state().name(), STATE_RESTRICTED);
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsa);
    }

    #[test]
    fn link_activity_splits_idle_and_connected() {
        let mut h = Harness::new(lte(NrState::NotRestricted), CarrierConfig::default());
        assert_eq!(h.ctl.current_state(), DisplayState::Idle);
        h.send(DisplayEvent::PhysicalLinkStateChanged(PhysicalLinkState::Active));
        assert_eq!(h.ctl.current_state(), DisplayState::LteConnected);
        h.send(DisplayEvent::PhysicalLinkStateChanged(PhysicalLinkState::Dormant));
        assert_eq!(h.ctl.current_state(), DisplayState::Idle);
    }

    #[test]
    fn lte_plus_needs_bandwidth_above_threshold() {
        let mut ss = lte(NrState::None);
        ss.using_carrier_aggregation = true;
        ss.cell_bandwidths_khz = vec![10_000, 10_000];
        let mut h = Harness::new(ss, CarrierConfig::default());
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);

        h.set(|ss| ss.cell_bandwidths_khz.push(5_000));
        h.send(DisplayEvent::DataRatChanged);
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::LteCa);
    }

    #[test]
    fn enhanced_pattern_matches_operator_name() {
        let mut ss = lte(NrState::None);
        ss.operator_alpha_short = Some("Acme LTE+".into());
        let config = CarrierConfig {
            lte_enhanced_pattern: "Foo|LTE+".into(),
            ..Default::default()
        };
        let h = Harness::new(ss, config);
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::LteAdvancedPro);
    }

    #[test]
    fn nr_hidden_when_preferred_mode_excludes_nr() {
        let mut ss = lte(NrState::Connected);
        ss.preferred_network_types = RadioAccessFamily::LTE | RadioAccessFamily::WCDMA;
        let h = Harness::new(ss, CarrierConfig::default());
        assert_eq!(h.ctl.current_state(), DisplayState::NrConnected { mmwave: false });
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    #[test]
    fn channel_config_off_hides_nr() {
        let mut h = Harness::new(lte(NrState::Connected), CarrierConfig::default());
        h.send(DisplayEvent::PhysicalChannelConfigNotifChanged(false));
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    // ─── Hysteresis ─────────────────────────────────────────────────────

    #[test]
    fn same_state_transition_never_arms_timer() {
        let mut ss = lte(NrState::Connected);
        ss.nr_frequency_range = FrequencyRange::Low;
        let mut h = Harness::new(ss, carrier("connected:5g", "any,any,10", ""));
        h.set(|ss| ss.nr_frequency_range = FrequencyRange::Mid);
        h.send(DisplayEvent::NrFrequencyChanged);
        assert!(!h.ctl.is_timer_active());
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsa);
    }

    #[test]
    fn primary_then_secondary_timer_hold_display() {
        let mut h = Harness::new(
            lte(NrState::Connected),
            carrier("connected:5g", "connected,legacy,10", "connected,legacy,5"),
        );
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsa);

        h.set(|ss| ss.nr_state = NrState::None);
        h.send(DisplayEvent::NrStateChanged);
        assert_eq!(h.ctl.current_state(), DisplayState::Legacy { restricted: false });
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsa);
        assert!(h.ctl.snapshot().primary_timer_active);

        h.advance(10);
        let snap = h.ctl.snapshot();
        assert!(!snap.primary_timer_active);
        assert!(snap.secondary_timer_active);
        assert_eq!(snap.secondary_timer_state, Some("legacy"));
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsa);

        h.advance(5);
        assert!(!h.ctl.is_timer_active());
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    #[test]
    fn returning_to_frozen_display_cancels_primary() {
        let mut h = Harness::new(
            lte(NrState::Connected),
            carrier("connected:5g", "connected,legacy,10", ""),
        );
        h.set(|ss| ss.nr_state = NrState::None);
        h.send(DisplayEvent::NrStateChanged);
        assert!(h.ctl.is_timer_active());

        h.set(|ss| ss.nr_state = NrState::Connected);
        h.send(DisplayEvent::NrStateChanged);
        assert!(!h.ctl.is_timer_active());
        assert_eq!(h.ctl.current_state(), DisplayState::NrConnected { mmwave: false });

        // The cancelled expiry never fires.
        h.advance(30);
        assert_eq!(h.ctl.snapshot().previous_state, STATE_CONNECTED);
    }

    #[test]
    fn mmwave_entry_resets_all_timers() {
        let mut h = Harness::new(
            lte(NrState::Connected),
            carrier("connected_mmwave:5g_plus,connected:5g", "connected,legacy,10", ""),
        );
        h.set(|ss| ss.nr_state = NrState::None);
        h.send(DisplayEvent::NrStateChanged);
        assert!(h.ctl.is_timer_active());

        h.set(|ss| {
            ss.nr_state = NrState::Connected;
            ss.nr_frequency_range = FrequencyRange::Mmwave;
        });
        h.send(DisplayEvent::NrStateChanged);
        assert_eq!(h.ctl.current_state(), DisplayState::NrConnected { mmwave: true });
        assert!(!h.ctl.is_timer_active());
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsaMmwave);
    }

    #[test]
    fn radio_off_clears_timers_and_goes_legacy() {
        let mut h = Harness::new(
            lte(NrState::Connected),
            carrier("connected:5g", "connected,legacy,10", ""),
        );
        h.set(|ss| ss.nr_state = NrState::None);
        h.send(DisplayEvent::NrStateChanged);
        assert!(h.ctl.is_timer_active());

        h.set(|ss| ss.data_network_type = NetworkType::Unknown);
        h.send(DisplayEvent::RadioOffOrUnavailable);
        assert!(!h.ctl.is_timer_active());
        assert_eq!(h.ctl.current_state(), DisplayState::Legacy { restricted: false });
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    #[test]
    fn legacy_rrc_idle_reset_flag() {
        let config = CarrierConfig {
            nr_timers_reset_if_non_endc_and_rrc_idle: true,
            ..carrier("connected:5g", "connected,legacy,10", "")
        };
        let mut h = Harness::new(lte(NrState::Connected), config);
        h.set(|ss| ss.nr_state = NrState::None);
        h.send(DisplayEvent::NrStateChanged);
        assert!(h.ctl.is_timer_active());

        h.send(DisplayEvent::PhysicalLinkStateChanged(PhysicalLinkState::Dormant));
        assert!(!h.ctl.is_timer_active());
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    #[test]
    fn carrier_config_change_reparses_and_clears_timers() {
        let mut h = Harness::new(
            lte(NrState::Connected),
            carrier("connected:5g", "connected,legacy,10", ""),
        );
        h.set(|ss| ss.nr_state = NrState::None);
        h.send(DisplayEvent::NrStateChanged);
        assert!(h.ctl.is_timer_active());

        *h.carrier.0.lock().unwrap() = Some(carrier("legacy:5g", "", ""));
        h.send(DisplayEvent::CarrierConfigChanged);
        assert!(!h.ctl.is_timer_active());
        // NR state None on LTE never reaches the NR display path.
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    // ─── Failure handling ───────────────────────────────────────────────

    #[test]
    fn unknown_event_code_resets() {
        let mut h = Harness::new(
            lte(NrState::Connected),
            carrier("connected:5g", "connected,legacy,10", ""),
        );
        h.set(|ss| ss.nr_state = NrState::None);
        h.send(DisplayEvent::NrStateChanged);
        assert!(h.ctl.is_timer_active());

        assert_eq!(h.ctl.post_code(42, 0), Err(DisplayError::UnknownEvent(42)));
        assert!(!h.ctl.is_timer_active());
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::None);
    }

    #[test]
    fn quit_stops_processing() {
        let mut h = Harness::new(lte(NrState::Connected), CarrierConfig::default());
        h.send(DisplayEvent::Quit);
        assert_eq!(h.ctl.current_state(), DisplayState::Legacy { restricted: false });
        h.send(DisplayEvent::Update);
        assert_eq!(h.ctl.current_state(), DisplayState::Legacy { restricted: false });
    }

    #[test]
    fn missing_carrier_config_uses_defaults() {
        let mut h = Harness::new(lte(NrState::NotRestricted), CarrierConfig::default());
        *h.carrier.0.lock().unwrap() = None;
        h.send(DisplayEvent::CarrierConfigChanged);
        assert_eq!(h.ctl.override_network_type(), OverrideNetworkType::NrNsa);
    }
}
