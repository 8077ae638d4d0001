//! # Radio Capability Switching
//!
//! Reassigns which logical modem serves which radio access family across
//! all phones with a three-phase transaction:
//!
//! ```text
//!   START ──all ok, distinct modems──▶ APPLY ──all notified──▶ FINISH(success)
//!     │                                  │                        │
//!     └──any fail / duplicate modem──────┴──any fail / timeout──▶ FINISH(fail)
//!                                                                 │
//!                                        rollback to old families ┘
//! ```
//!
//! The modems are reached through [`ModemChannel`]; their responses and
//! the unsolicited capability-changed notifications come back as
//! [`CoordinatorEvent`]s posted to the [`Coordinator`]'s queue.

pub mod coordinator;
pub mod wakelock;

use serde::Serialize;
use thiserror::Error;

use cellcore_common::{PhoneId, PhoneRaf, RadioCapability, SessionId};

pub use coordinator::{Coordinator, CoordinatorConfig, TransactionSnapshot, TransactionStatus};
pub use wakelock::{PowerHold, WakeHold};

// ─── Collaborators ──────────────────────────────────────────────────────────

/// Command channel to the radio layer.
///
/// Dispatch is fire-and-forget; the response arrives later as a
/// [`CoordinatorEvent`].
pub trait ModemChannel: Send {
    fn send_capability_request(&mut self, request: &RadioCapability);
}

/// Invoked after a phone's capability switch is confirmed, so data
/// attach can be retried on the new modem.
pub trait AttachRetryHook: Send {
    fn on_radio_capability_changed(&mut self, phone_id: PhoneId);
}

// ─── Events ─────────────────────────────────────────────────────────────────

/// Error reported by the radio layer for a capability command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("radio not available")]
    RadioNotAvailable,
    #[error("request not supported")]
    RequestNotSupported,
    #[error("modem failure: {0}")]
    Generic(String),
}

/// Radio-layer answer to a capability command or notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityResponse {
    /// Echoed descriptor; `None` when the radio returned no payload.
    pub capability: Option<RadioCapability>,
    pub error: Option<CommandError>,
}

impl CapabilityResponse {
    pub fn ok(capability: RadioCapability) -> Self {
        CapabilityResponse {
            capability: Some(capability),
            error: None,
        }
    }

    pub fn err(capability: RadioCapability, error: CommandError) -> Self {
        CapabilityResponse {
            capability: Some(capability),
            error: Some(error),
        }
    }
}

/// Everything the coordinator reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    StartResponse(CapabilityResponse),
    ApplyResponse(CapabilityResponse),
    FinishResponse(CapabilityResponse),
    /// Unsolicited capability-changed notification.
    CapabilityChanged(CapabilityResponse),
    /// Global transaction deadline for `session_id`.
    Timeout { session_id: SessionId },
}

// ─── Results ────────────────────────────────────────────────────────────────

/// Outcome published to subscribers when a transaction completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CapabilityBroadcast {
    /// Every phone switched; carries the final family of each phone.
    CapabilitySet { phones: Vec<PhoneRaf> },
    /// The transaction was rolled back.
    CapabilityFailed,
}

/// Argument errors from [`Coordinator::set_radio_capability`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("expected a request for each of {expected} phones, got {got}")]
    PhoneCountMismatch { expected: usize, got: usize },
    #[error("phone id {0} out of range")]
    InvalidPhone(PhoneId),
    #[error("phone id {0} requested twice")]
    DuplicatePhone(PhoneId),
}
