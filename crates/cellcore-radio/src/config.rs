//! Runtime configuration loaded from TOML.
//!
//! ```toml
//! version = 1
//!
//! [coordinator]
//! timeout_ms = 45000
//!
//! [[phones]]
//! raf = "GSM"
//! modem_id = "modem-0"
//!
//! [[phones]]
//! raf = "LTE|WCDMA"
//!
//! [carrier]
//! nr_icon_display_grace_period = "connected,legacy,10"
//! ```
//!
//! Phones are identified by position. A missing `modem_id` defaults to
//! `modem-<index>`.

use std::collections::HashSet;
use std::path::Path;

use quanta::Clock;
use serde::Deserialize;
use thiserror::Error;

use cellcore_common::{CarrierConfig, RadioAccessFamily, RafParseError, SessionId};

use crate::capability::coordinator::PhoneCapability;
use crate::capability::{Coordinator, CoordinatorConfig, ModemChannel};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("phone {phone}: {source}")]
    InvalidRaf {
        phone: usize,
        #[source]
        source: RafParseError,
    },
    #[error("logical modem id {0:?} assigned to more than one phone")]
    DuplicateModem(String),
    #[error("coordinator timeout must be non-zero")]
    ZeroTimeout,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfigInput {
    pub version: u32,
    pub coordinator: CoordinatorConfigInput,
    pub phones: Vec<PhoneConfigInput>,
    pub carrier: CarrierConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfigInput {
    pub timeout_ms: Option<u64>,
    pub first_session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PhoneConfigInput {
    pub raf: String,
    pub modem_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub version: u32,
    pub coordinator: CoordinatorConfig,
    pub phones: Vec<PhoneCapability>,
    pub carrier: CarrierConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            coordinator: CoordinatorConfig::default(),
            phones: Vec::new(),
            carrier: CarrierConfig::default(),
        }
    }
}

impl RuntimeConfigInput {
    pub fn resolve(self) -> Result<RuntimeConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let defaults = CoordinatorConfig::default();
        let coordinator = CoordinatorConfig {
            timeout_ms: self.coordinator.timeout_ms.unwrap_or(defaults.timeout_ms),
            first_session_id: self
                .coordinator
                .first_session_id
                .unwrap_or(defaults.first_session_id),
        };
        if coordinator.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut used = HashSet::new();
        let mut phones = Vec::with_capacity(self.phones.len());
        for (idx, phone) in self.phones.into_iter().enumerate() {
            let raf: RadioAccessFamily = phone
                .raf
                .parse()
                .map_err(|source| ConfigError::InvalidRaf { phone: idx, source })?;
            let modem_id = phone
                .modem_id
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("modem-{}", idx));
            if !used.insert(modem_id.clone()) {
                return Err(ConfigError::DuplicateModem(modem_id));
            }
            phones.push(PhoneCapability::new(raf, modem_id));
        }

        Ok(RuntimeConfig {
            version,
            coordinator,
            phones,
            carrier: self.carrier,
        })
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(RuntimeConfig::default());
        }
        let parsed: RuntimeConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Coordinator over the configured phones.
    pub fn build_coordinator(&self, clock: Clock, modem: Box<dyn ModemChannel>) -> Coordinator {
        Coordinator::new(self.coordinator.clone(), clock, self.phones.clone(), modem)
    }
}
