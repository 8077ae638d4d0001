//! Radio capability descriptors exchanged with the modems.
//!
//! A [`RadioCapability`] is built fresh for every phase/phone dispatch and
//! echoed back by the radio layer in responses and in the unsolicited
//! capability-changed notification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::radio::RadioAccessFamily;

/// Transaction session identifier. Minted monotonically by the coordinator.
pub type SessionId = u32;

/// Index of a phone / modem slot.
pub type PhoneId = usize;

/// Phase of a capability-switch transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityPhase {
    /// Capability as configured at boot (reported by the radio, never sent).
    Configured,
    /// Reserve the modem and report the current capability.
    Start,
    /// Switch to the new capability.
    Apply,
    /// Unsolicited notification that the switch completed.
    Unsol,
    /// Commit (or roll back) the transaction.
    Finish,
}

impl fmt::Display for CapabilityPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityPhase::Configured => "CONFIGURED",
            CapabilityPhase::Start => "START",
            CapabilityPhase::Apply => "APPLY",
            CapabilityPhase::Unsol => "UNSOL_RSP",
            CapabilityPhase::Finish => "FINISH",
        };
        f.write_str(s)
    }
}

/// Status carried by a capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    #[default]
    None,
    Success,
    Fail,
}

/// Per-modem capability descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioCapability {
    pub phone_id: PhoneId,
    pub session_id: SessionId,
    pub phase: CapabilityPhase,
    pub raf: RadioAccessFamily,
    /// Logical modem serving the family. `None` when no phone currently
    /// owns the requested family.
    pub logical_modem_id: Option<String>,
    pub status: CapabilityStatus,
}

impl RadioCapability {
    pub fn new(
        phone_id: PhoneId,
        session_id: SessionId,
        phase: CapabilityPhase,
        raf: RadioAccessFamily,
        logical_modem_id: Option<String>,
        status: CapabilityStatus,
    ) -> Self {
        RadioCapability {
            phone_id,
            session_id,
            phase,
            raf,
            logical_modem_id,
            status,
        }
    }

    /// Copy of this descriptor as the radio would echo it back with `status`.
    pub fn echo(&self, phase: CapabilityPhase, status: CapabilityStatus) -> Self {
        RadioCapability {
            phase,
            status,
            ..self.clone()
        }
    }
}

impl fmt::Display for RadioCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ phone={} session={} phase={} raf={} modem={} status={:?} }}",
            self.phone_id,
            self.session_id,
            self.phase,
            self.raf,
            self.logical_modem_id.as_deref().unwrap_or("<none>"),
            self.status
        )
    }
}

/// A phone paired with a radio access family, as requested by callers and
/// reported in broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneRaf {
    pub phone_id: PhoneId,
    pub raf: RadioAccessFamily,
}

impl PhoneRaf {
    pub fn new(phone_id: PhoneId, raf: RadioAccessFamily) -> Self {
        PhoneRaf { phone_id, raf }
    }
}
