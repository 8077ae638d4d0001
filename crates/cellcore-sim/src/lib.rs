//! # cellcore-sim
//!
//! Deterministic, clock-mocked scenario runner for the telephony core.
//!
//! ## Crate structure
//!
//! - [`modem`] — simulated radio answering capability requests, with
//!   seeded fault injection
//! - [`service`] — shared service-state, carrier-config and display-info
//!   fixtures for the display controllers
//! - [`scenario`] — TOML scenario format and the runner producing a
//!   [`scenario::ScenarioReport`]

pub mod modem;
pub mod scenario;
pub mod service;

pub use modem::{FaultPlan, SimRadio};
pub use scenario::{Scenario, ScenarioReport, run_scenario};
