//! # Network Display State Machine
//!
//! Classifies a phone's data connection into a display state and derives
//! the [`OverrideNetworkType`] shown to the user, with carrier-configured
//! grace timers that hold the previous icon while the radio flaps.
//!
//! ```text
//!            ┌──────────── nr connected ───────────┐
//!            ▼                                     │
//!   Legacy ◀──▶ Idle ◀── link ──▶ LteConnected ──▶ NrConnected
//!   (restricted)  (rrc idle)       (rrc con)        (mmwave)
//! ```
//!
//! Inputs arrive as [`DisplayEvent`]s on the controller's queue; the live
//! service state is pulled from a [`ServiceStateProvider`] while handling
//! each event.

pub mod controller;
pub mod rules;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use cellcore_common::{
    CarrierConfig, OverrideNetworkType, PhoneId, PhysicalLinkState, ServiceState,
};

pub use controller::{DisplayController, DisplaySnapshot};
pub use rules::{OverrideTimerRule, TimerRules};

// ─── Collaborators ──────────────────────────────────────────────────────────

/// Synchronous view of the phone's current serving state.
pub trait ServiceStateProvider: Send {
    fn service_state(&self) -> ServiceState;
}

/// Carrier configuration store. `None` means the carrier supplies nothing
/// and defaults apply.
pub trait CarrierConfigSource: Send {
    fn carrier_config(&self, phone_id: PhoneId) -> Option<CarrierConfig>;
}

/// Receives every recomputed display type.
pub trait DisplayInfoSink: Send {
    fn update_display_info(&mut self, phone_id: PhoneId, override_type: OverrideNetworkType);
}

// ─── Events ─────────────────────────────────────────────────────────────────

/// Inputs to the display state machine. Discriminants are the raw codes
/// accepted by [`DisplayEvent::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Update,
    Quit,
    DataRatChanged,
    NrStateChanged,
    NrFrequencyChanged,
    PhysicalLinkStateChanged(PhysicalLinkState),
    /// Physical channel config notifications switched on or off.
    PhysicalChannelConfigNotifChanged(bool),
    CarrierConfigChanged,
    PrimaryTimerExpired,
    SecondaryTimerExpired,
    RadioOffOrUnavailable,
    PreferredNetworkModeChanged,
    Initialize,
}

pub const EVENT_UPDATE: u8 = 0;
pub const EVENT_QUIT: u8 = 1;
pub const EVENT_DATA_RAT_CHANGED: u8 = 2;
pub const EVENT_NR_STATE_CHANGED: u8 = 3;
pub const EVENT_NR_FREQUENCY_CHANGED: u8 = 4;
pub const EVENT_PHYSICAL_LINK_STATE_CHANGED: u8 = 5;
pub const EVENT_PHYSICAL_CHANNEL_CONFIG_NOTIF_CHANGED: u8 = 6;
pub const EVENT_CARRIER_CONFIG_CHANGED: u8 = 7;
pub const EVENT_PRIMARY_TIMER_EXPIRED: u8 = 8;
pub const EVENT_SECONDARY_TIMER_EXPIRED: u8 = 9;
pub const EVENT_RADIO_OFF_OR_UNAVAILABLE: u8 = 10;
pub const EVENT_PREFERRED_NETWORK_MODE_CHANGED: u8 = 11;
pub const EVENT_INITIALIZE: u8 = 12;

/// Raw link-state argument meaning RRC connected.
pub const LINK_ACTIVE: i32 = 2;
/// Raw link-state argument meaning RRC idle.
pub const LINK_DORMANT: i32 = 1;

impl DisplayEvent {
    /// Decode a raw collaborator event. `arg` carries the link state for
    /// [`EVENT_PHYSICAL_LINK_STATE_CHANGED`] and the on/off flag (non-zero
    /// is on) for [`EVENT_PHYSICAL_CHANNEL_CONFIG_NOTIF_CHANGED`].
    pub fn from_code(code: u8, arg: i32) -> Option<DisplayEvent> {
        let event = match code {
            EVENT_UPDATE => DisplayEvent::Update,
            EVENT_QUIT => DisplayEvent::Quit,
            EVENT_DATA_RAT_CHANGED => DisplayEvent::DataRatChanged,
            EVENT_NR_STATE_CHANGED => DisplayEvent::NrStateChanged,
            EVENT_NR_FREQUENCY_CHANGED => DisplayEvent::NrFrequencyChanged,
            EVENT_PHYSICAL_LINK_STATE_CHANGED => {
                let link = match arg {
                    LINK_ACTIVE => PhysicalLinkState::Active,
                    LINK_DORMANT => PhysicalLinkState::Dormant,
                    _ => PhysicalLinkState::Unknown,
                };
                DisplayEvent::PhysicalLinkStateChanged(link)
            }
            EVENT_PHYSICAL_CHANNEL_CONFIG_NOTIF_CHANGED => {
                DisplayEvent::PhysicalChannelConfigNotifChanged(arg != 0)
            }
            EVENT_CARRIER_CONFIG_CHANGED => DisplayEvent::CarrierConfigChanged,
            EVENT_PRIMARY_TIMER_EXPIRED => DisplayEvent::PrimaryTimerExpired,
            EVENT_SECONDARY_TIMER_EXPIRED => DisplayEvent::SecondaryTimerExpired,
            EVENT_RADIO_OFF_OR_UNAVAILABLE => DisplayEvent::RadioOffOrUnavailable,
            EVENT_PREFERRED_NETWORK_MODE_CHANGED => DisplayEvent::PreferredNetworkModeChanged,
            EVENT_INITIALIZE => DisplayEvent::Initialize,
            _ => return None,
        };
        Some(event)
    }

    pub fn code(&self) -> u8 {
        match self {
            DisplayEvent::Update => EVENT_UPDATE,
            DisplayEvent::Quit => EVENT_QUIT,
            DisplayEvent::DataRatChanged => EVENT_DATA_RAT_CHANGED,
            DisplayEvent::NrStateChanged => EVENT_NR_STATE_CHANGED,
            DisplayEvent::NrFrequencyChanged => EVENT_NR_FREQUENCY_CHANGED,
            DisplayEvent::PhysicalLinkStateChanged(_) => EVENT_PHYSICAL_LINK_STATE_CHANGED,
            DisplayEvent::PhysicalChannelConfigNotifChanged(_) => {
                EVENT_PHYSICAL_CHANNEL_CONFIG_NOTIF_CHANGED
            }
            DisplayEvent::CarrierConfigChanged => EVENT_CARRIER_CONFIG_CHANGED,
            DisplayEvent::PrimaryTimerExpired => EVENT_PRIMARY_TIMER_EXPIRED,
            DisplayEvent::SecondaryTimerExpired => EVENT_SECONDARY_TIMER_EXPIRED,
            DisplayEvent::RadioOffOrUnavailable => EVENT_RADIO_OFF_OR_UNAVAILABLE,
            DisplayEvent::PreferredNetworkModeChanged => EVENT_PREFERRED_NETWORK_MODE_CHANGED,
            DisplayEvent::Initialize => EVENT_INITIALIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("invalid display event code {0}")]
    UnknownEvent(u8),
}

// ─── States ─────────────────────────────────────────────────────────────────

/// Display state. Labelled sub-cases (restricted, mmWave) are fields so a
/// single variant covers the parent state's event handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Legacy { restricted: bool },
    Idle,
    LteConnected,
    NrConnected { mmwave: bool },
}

impl DisplayState {
    /// Name used as a key in carrier configuration.
    pub fn name(&self) -> &'static str {
        match self {
            DisplayState::Legacy { restricted: false } => rules::STATE_LEGACY,
            DisplayState::Legacy { restricted: true } => rules::STATE_RESTRICTED,
            DisplayState::Idle => rules::STATE_NOT_RESTRICTED_RRC_IDLE,
            DisplayState::LteConnected => rules::STATE_NOT_RESTRICTED_RRC_CON,
            DisplayState::NrConnected { mmwave: false } => rules::STATE_CONNECTED,
            DisplayState::NrConnected { mmwave: true } => rules::STATE_CONNECTED_MMWAVE,
        }
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
