//! Carrier configuration bundle.
//!
//! Mirrors the handful of carrier-config keys the network display state
//! machine reads. Every field has a default so a partial TOML table (or
//! none at all) yields a usable bundle.

use serde::{Deserialize, Serialize};

/// Default icon mapping: every NR state shows the 5G icon.
pub const DEFAULT_NR_ICON_CONFIGURATION: &str =
    "connected_mmwave:5G,connected:5G,not_restricted_rrc_idle:5G,not_restricted_rrc_con:5G";

/// Default aggregate bandwidth above which LTE-CA is displayed (kHz).
pub const DEFAULT_LTE_PLUS_THRESHOLD_BANDWIDTH_KHZ: u32 = 20_000;

/// Per-carrier display configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    /// `state:icon` pairs separated by `,`.
    pub nr_icon_configuration: String,
    /// Primary grace-period rules: `from,to,seconds` separated by `;`.
    pub nr_icon_display_grace_period: String,
    /// Secondary grace-period rules, same grammar as the primary table.
    pub nr_icon_display_secondary_grace_period: String,
    /// Aggregate bandwidth above which carrier aggregation shows LTE+.
    pub lte_plus_threshold_bandwidth_khz: u32,
    /// `|`-separated operator-name fragments that mark LTE Advanced Pro.
    pub lte_enhanced_pattern: String,
    /// Clear all timers when RRC goes idle while in the legacy state.
    pub nr_timers_reset_if_non_endc_and_rrc_idle: bool,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        CarrierConfig {
            nr_icon_configuration: DEFAULT_NR_ICON_CONFIGURATION.to_string(),
            nr_icon_display_grace_period: String::new(),
            nr_icon_display_secondary_grace_period: String::new(),
            lte_plus_threshold_bandwidth_khz: DEFAULT_LTE_PLUS_THRESHOLD_BANDWIDTH_KHZ,
            lte_enhanced_pattern: String::new(),
            nr_timers_reset_if_non_endc_and_rrc_idle: false,
        }
    }
}
