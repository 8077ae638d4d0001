//! Shared types for the cellcore telephony core.
//!
//! This crate contains:
//! - **Radio technologies** — `NetworkType` and the `RadioAccessFamily` bitmask
//! - **Capability descriptors** — the per-modem request/response record
//! - **Service state** — NR state, link activity, display classification
//! - **Carrier config** — the display-related carrier configuration bundle

pub mod capability;
pub mod carrier;
pub mod radio;
pub mod service;

pub use capability::{
    CapabilityPhase, CapabilityStatus, PhoneId, PhoneRaf, RadioCapability, SessionId,
};
pub use carrier::CarrierConfig;
pub use radio::{NetworkType, RadioAccessFamily, RafParseError};
pub use service::{FrequencyRange, NrState, OverrideNetworkType, PhysicalLinkState, ServiceState};
