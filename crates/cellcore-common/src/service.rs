//! Service-state snapshot and the display classification derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::radio::{NetworkType, RadioAccessFamily};

/// NR (5G NSA) registration state reported alongside an LTE anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NrState {
    /// No NR capability on the serving cell.
    #[default]
    None,
    /// NR available but restricted by the network (DCNR restricted).
    Restricted,
    /// NR available and not restricted, but no NR bearer yet.
    NotRestricted,
    /// NR secondary cell group connected.
    Connected,
}

/// Frequency range of the NR carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyRange {
    #[default]
    Unknown,
    Low,
    Mid,
    High,
    /// Millimetre wave (FR2).
    Mmwave,
}

/// RRC activity of the data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalLinkState {
    #[default]
    Unknown,
    /// RRC connected.
    Active,
    /// RRC idle.
    Dormant,
}

/// Externally visible network classification used for the status icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideNetworkType {
    #[default]
    None,
    LteCa,
    LteAdvancedPro,
    NrNsa,
    NrNsaMmwave,
}

impl fmt::Display for OverrideNetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverrideNetworkType::None => "NONE",
            OverrideNetworkType::LteCa => "LTE_CA",
            OverrideNetworkType::LteAdvancedPro => "LTE_ADV_PRO",
            OverrideNetworkType::NrNsa => "NR_NSA",
            OverrideNetworkType::NrNsaMmwave => "NR_NSA_MMWAVE",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a phone's serving state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceState {
    pub data_network_type: NetworkType,
    pub nr_state: NrState,
    pub nr_frequency_range: FrequencyRange,
    pub operator_alpha_long: Option<String>,
    pub operator_alpha_short: Option<String>,
    pub using_carrier_aggregation: bool,
    /// Bandwidth of each serving cell in kHz.
    pub cell_bandwidths_khz: Vec<u32>,
    /// Technologies allowed by the preferred network mode.
    pub preferred_network_types: RadioAccessFamily,
}

impl Default for ServiceState {
    fn default() -> Self {
        ServiceState {
            data_network_type: NetworkType::Unknown,
            nr_state: NrState::None,
            nr_frequency_range: FrequencyRange::Unknown,
            operator_alpha_long: None,
            operator_alpha_short: None,
            using_carrier_aggregation: false,
            cell_bandwidths_khz: Vec::new(),
            preferred_network_types: RadioAccessFamily::GSM
                | RadioAccessFamily::WCDMA
                | RadioAccessFamily::LTE
                | RadioAccessFamily::NR,
        }
    }
}

impl ServiceState {
    pub fn is_nr_connected(&self) -> bool {
        self.nr_state == NrState::Connected
    }

    pub fn is_nr_not_restricted(&self) -> bool {
        self.nr_state == NrState::NotRestricted
    }

    pub fn is_nr_restricted(&self) -> bool {
        self.nr_state == NrState::Restricted
    }

    pub fn is_nr_mmwave(&self) -> bool {
        self.nr_frequency_range == FrequencyRange::Mmwave
    }

    /// Summed bandwidth of all serving cells.
    pub fn total_bandwidth_khz(&self) -> u32 {
        self.cell_bandwidths_khz
            .iter()
            .fold(0u32, |acc, bw| acc.saturating_add(*bw))
    }

    /// Operator names to match against carrier patterns, long name first.
    pub fn operator_names(&self) -> impl Iterator<Item = &str> {
        [&self.operator_alpha_long, &self.operator_alpha_short]
            .into_iter()
            .filter_map(|n| n.as_deref())
            .filter(|n| !n.is_empty())
    }
}
