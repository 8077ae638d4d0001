//! # Radio Technologies
//!
//! Data radio-access technologies (`NetworkType`) and the bitmask of
//! technologies a modem can serve (`RadioAccessFamily`).
//!
//! ## Bit layout
//!
//! Every technology owns bit `code - 1`, where `code` is its
//! `NetworkType` discriminant:
//!
//! | Family     | Members                              |
//! |------------|--------------------------------------|
//! | `GSM`      | GSM, GPRS, EDGE                      |
//! | `CDMA`     | CDMA (IS-95A/B), 1xRTT               |
//! | `EVDO`     | EVDO rev 0/A/B, eHRPD                |
//! | `HS`       | HSDPA, HSUPA, HSPA, HSPA+            |
//! | `WCDMA`    | `HS` + UMTS                          |
//! | `LTE`      | LTE, LTE-CA                          |
//! | `NR`       | NR                                   |
//!
//! Families print and parse as `|`-separated names, e.g. `"GSM|WCDMA|LTE"`.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Network Type ───────────────────────────────────────────────────────────

/// Data radio-access technology currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum NetworkType {
    #[default]
    Unknown = 0,
    Gprs = 1,
    Edge = 2,
    Umts = 3,
    Cdma = 4,
    Evdo0 = 5,
    EvdoA = 6,
    OneXRtt = 7,
    Hsdpa = 8,
    Hsupa = 9,
    Hspa = 10,
    EvdoB = 12,
    Lte = 13,
    Ehrpd = 14,
    Hspap = 15,
    Gsm = 16,
    TdScdma = 17,
    Iwlan = 18,
    LteCa = 19,
    Nr = 20,
}

impl NetworkType {
    /// Every known technology, in code order.
    pub const ALL: &'static [NetworkType] = &[
        NetworkType::Gprs,
        NetworkType::Edge,
        NetworkType::Umts,
        NetworkType::Cdma,
        NetworkType::Evdo0,
        NetworkType::EvdoA,
        NetworkType::OneXRtt,
        NetworkType::Hsdpa,
        NetworkType::Hsupa,
        NetworkType::Hspa,
        NetworkType::EvdoB,
        NetworkType::Lte,
        NetworkType::Ehrpd,
        NetworkType::Hspap,
        NetworkType::Gsm,
        NetworkType::TdScdma,
        NetworkType::Iwlan,
        NetworkType::LteCa,
        NetworkType::Nr,
    ];

    /// Numeric technology code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Single-bit family mask for this technology (`Unknown` → empty).
    pub fn bitmask(self) -> RadioAccessFamily {
        match self {
            NetworkType::Unknown => RadioAccessFamily::UNKNOWN,
            other => RadioAccessFamily(1 << (other.code() - 1)),
        }
    }

    /// LTE or LTE carrier aggregation.
    pub fn is_lte(self) -> bool {
        matches!(self, NetworkType::Lte | NetworkType::LteCa)
    }

    fn name(self) -> &'static str {
        match self {
            NetworkType::Unknown => "UNKNOWN",
            NetworkType::Gprs => "GPRS",
            NetworkType::Edge => "EDGE",
            NetworkType::Umts => "UMTS",
            NetworkType::Cdma => "IS95",
            NetworkType::Evdo0 => "EVDO_0",
            NetworkType::EvdoA => "EVDO_A",
            NetworkType::OneXRtt => "1XRTT",
            NetworkType::Hsdpa => "HSDPA",
            NetworkType::Hsupa => "HSUPA",
            NetworkType::Hspa => "HSPA",
            NetworkType::EvdoB => "EVDO_B",
            NetworkType::Lte => "LTE_ONLY",
            NetworkType::Ehrpd => "EHRPD",
            NetworkType::Hspap => "HSPAP",
            NetworkType::Gsm => "GSM_ONLY",
            NetworkType::TdScdma => "TD_SCDMA",
            NetworkType::Iwlan => "IWLAN",
            NetworkType::LteCa => "LTE_CA",
            NetworkType::Nr => "NR_ONLY",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Radio Access Family ────────────────────────────────────────────────────

/// Bitmask of radio technologies a modem serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RadioAccessFamily(u32);

impl RadioAccessFamily {
    pub const UNKNOWN: RadioAccessFamily = RadioAccessFamily(0);

    pub const GSM: RadioAccessFamily = RadioAccessFamily(
        bit(NetworkType::Gsm) | bit(NetworkType::Gprs) | bit(NetworkType::Edge),
    );
    pub const CDMA: RadioAccessFamily =
        RadioAccessFamily(bit(NetworkType::Cdma) | bit(NetworkType::OneXRtt));
    pub const EVDO: RadioAccessFamily = RadioAccessFamily(
        bit(NetworkType::Evdo0)
            | bit(NetworkType::EvdoA)
            | bit(NetworkType::EvdoB)
            | bit(NetworkType::Ehrpd),
    );
    pub const HS: RadioAccessFamily = RadioAccessFamily(
        bit(NetworkType::Hsdpa)
            | bit(NetworkType::Hsupa)
            | bit(NetworkType::Hspa)
            | bit(NetworkType::Hspap),
    );
    pub const WCDMA: RadioAccessFamily =
        RadioAccessFamily(Self::HS.0 | bit(NetworkType::Umts));
    pub const TD_SCDMA: RadioAccessFamily = RadioAccessFamily(bit(NetworkType::TdScdma));
    pub const LTE: RadioAccessFamily =
        RadioAccessFamily(bit(NetworkType::Lte) | bit(NetworkType::LteCa));
    pub const NR: RadioAccessFamily = RadioAccessFamily(bit(NetworkType::Nr));

    /// Named groups, widest first. Display greedily uses these.
    const GROUPS: &'static [(&'static str, RadioAccessFamily)] = &[
        ("NR", Self::NR),
        ("LTE", Self::LTE),
        ("WCDMA", Self::WCDMA),
        ("HS", Self::HS),
        ("TD_SCDMA", Self::TD_SCDMA),
        ("GSM", Self::GSM),
        ("CDMA", Self::CDMA),
        ("EVDO", Self::EVDO),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        RadioAccessFamily(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: RadioAccessFamily) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: RadioAccessFamily) -> bool {
        self.0 & other.0 != 0
    }

    /// Number of technologies in the family.
    pub fn technology_count(self) -> u32 {
        self.0.count_ones()
    }

    /// Highest-generation technology family in the mask, used for logs.
    pub fn highest_generation(self) -> &'static str {
        if self.intersects(Self::NR) {
            "5G"
        } else if self.intersects(Self::LTE) {
            "4G"
        } else if self.intersects(Self::WCDMA | Self::TD_SCDMA | Self::EVDO) {
            "3G"
        } else if self.intersects(Self::GSM | Self::CDMA) {
            "2G"
        } else {
            "unknown"
        }
    }
}

const fn bit(t: NetworkType) -> u32 {
    1 << (t as u8 - 1)
}

impl BitOr for RadioAccessFamily {
    type Output = RadioAccessFamily;

    fn bitor(self, rhs: Self) -> Self::Output {
        RadioAccessFamily(self.0 | rhs.0)
    }
}

impl BitOrAssign for RadioAccessFamily {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RadioAccessFamily {
    type Output = RadioAccessFamily;

    fn bitand(self, rhs: Self) -> Self::Output {
        RadioAccessFamily(self.0 & rhs.0)
    }
}

impl fmt::Display for RadioAccessFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("UNKNOWN");
        }
        let mut remaining = self.0;
        let mut parts: Vec<&str> = Vec::new();
        for (name, group) in Self::GROUPS {
            if remaining & group.0 == group.0 {
                parts.push(*name);
                remaining &= !group.0;
            }
        }
        for t in NetworkType::ALL {
            if remaining & bit(*t) != 0 {
                parts.push(t.name());
                remaining &= !bit(*t);
            }
        }
        if remaining != 0 {
            return write!(f, "{}|0x{remaining:x}", parts.join("|"));
        }
        f.write_str(&parts.join("|"))
    }
}

/// Error returned when a family string contains an unknown name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown radio access family component: {0:?}")]
pub struct RafParseError(pub String);

impl FromStr for RadioAccessFamily {
    type Err = RafParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raf = RadioAccessFamily::UNKNOWN;
        for token in s.split('|').map(str::trim).filter(|t| !t.is_empty()) {
            let upper = token.to_ascii_uppercase();
            if upper == "UNKNOWN" {
                continue;
            }
            if let Some((_, group)) = Self::GROUPS.iter().find(|(name, _)| *name == upper) {
                raf |= *group;
                continue;
            }
            let single = NetworkType::ALL
                .iter()
                .find(|t| t.name() == upper)
                .ok_or_else(|| RafParseError(token.to_string()))?;
            raf |= single.bitmask();
        }
        Ok(raf)
    }
}

impl TryFrom<String> for RadioAccessFamily {
    type Error = RafParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RadioAccessFamily> for String {
    fn from(raf: RadioAccessFamily) -> Self {
        raf.to_string()
    }
}
