//! # cellcore-radio
//!
//! Telephony control core: switches radio access families between modems
//! and derives the network type shown in the status bar.
//!
//! ## Crate structure
//!
//! - [`event`] — Ordered event queue with delayed delivery and cancellation
//! - [`capability`] — START/APPLY/FINISH capability transaction coordinator
//! - [`display`] — Network display state machine with grace timers
//! - [`config`] — TOML runtime configuration
//! - [`runtime`] — Worker thread hosting the coordinator and display controllers

pub mod capability;
pub mod config;
pub mod display;
pub mod event;
pub mod runtime;

pub use capability::{CapabilityBroadcast, Coordinator, CoordinatorConfig, CoordinatorEvent};
pub use config::{ConfigError, RuntimeConfig};
pub use display::{DisplayController, DisplayEvent, DisplayState};
pub use runtime::TelephonyRuntime;
