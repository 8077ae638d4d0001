//! # Override Timer Rules
//!
//! Parses the carrier's icon and grace-period strings into one
//! [`OverrideTimerRule`] per display state:
//!
//! ```text
//!   nr_icon_configuration                  "connected_mmwave:5g_plus,connected:5g"
//!   nr_icon_display_grace_period           "connected,legacy,10;any,connected,5"
//!   nr_icon_display_secondary_grace_period "connected,legacy,30"
//! ```
//!
//! Malformed entries are logged and skipped. Every known state always ends
//! up with a rule, so lookups by state name only miss for unknown names.

use std::collections::HashMap;

use tracing::warn;

use cellcore_common::{CarrierConfig, OverrideNetworkType};

pub const STATE_LEGACY: &str = "legacy";
pub const STATE_RESTRICTED: &str = "restricted";
pub const STATE_NOT_RESTRICTED_RRC_IDLE: &str = "not_restricted_rrc_idle";
pub const STATE_NOT_RESTRICTED_RRC_CON: &str = "not_restricted_rrc_con";
pub const STATE_CONNECTED: &str = "connected";
pub const STATE_CONNECTED_MMWAVE: &str = "connected_mmwave";
/// Wildcard origin (applies to every state) or destination (fallback).
pub const STATE_ANY: &str = "any";

pub const ALL_STATES: [&str; 6] = [
    STATE_LEGACY,
    STATE_RESTRICTED,
    STATE_NOT_RESTRICTED_RRC_IDLE,
    STATE_NOT_RESTRICTED_RRC_CON,
    STATE_CONNECTED,
    STATE_CONNECTED_MMWAVE,
];

const ICON_5G: &str = "5g";
const ICON_5G_PLUS: &str = "5g_plus";

/// Display override and grace periods for one origin state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideTimerRule {
    pub state: String,
    pub override_type: OverrideNetworkType,
    primary_timers: HashMap<String, u32>,
    secondary_timers: HashMap<String, u32>,
}

impl OverrideTimerRule {
    pub fn new(state: impl Into<String>, override_type: OverrideNetworkType) -> Self {
        OverrideTimerRule {
            state: state.into(),
            override_type,
            primary_timers: HashMap::new(),
            secondary_timers: HashMap::new(),
        }
    }

    pub fn add_timer(&mut self, dest: &str, secs: u32) {
        self.primary_timers.insert(dest.to_string(), secs);
    }

    pub fn add_secondary_timer(&mut self, dest: &str, secs: u32) {
        self.secondary_timers.insert(dest.to_string(), secs);
    }

    /// Primary grace period in seconds toward `dest`, falling back to `any`.
    pub fn primary_timer(&self, dest: &str) -> u32 {
        lookup(&self.primary_timers, dest)
    }

    /// Secondary grace period in seconds toward `dest`, falling back to `any`.
    pub fn secondary_timer(&self, dest: &str) -> u32 {
        lookup(&self.secondary_timers, dest)
    }
}

fn lookup(timers: &HashMap<String, u32>, dest: &str) -> u32 {
    timers
        .get(dest)
        .or_else(|| timers.get(STATE_ANY))
        .copied()
        .unwrap_or(0)
}

/// All per-state rules parsed from one carrier config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRules {
    rules: HashMap<String, OverrideTimerRule>,
}

impl Default for TimerRules {
    fn default() -> Self {
        let rules = ALL_STATES
            .iter()
            .map(|s| (s.to_string(), OverrideTimerRule::new(*s, OverrideNetworkType::None)))
            .collect();
        TimerRules { rules }
    }
}

#[derive(Clone, Copy)]
enum TimerKind {
    Primary,
    Secondary,
}

impl TimerRules {
    pub fn parse(config: &CarrierConfig) -> Self {
        let mut rules = TimerRules::default();
        rules.parse_icons(&config.nr_icon_configuration);
        rules.parse_timers(&config.nr_icon_display_grace_period, TimerKind::Primary);
        rules.parse_timers(
            &config.nr_icon_display_secondary_grace_period,
            TimerKind::Secondary,
        );
        rules
    }

    pub fn get(&self, state: &str) -> Option<&OverrideTimerRule> {
        self.rules.get(state)
    }

    /// Override icon for `state`; `None` for unknown states.
    pub fn override_type(&self, state: &str) -> OverrideNetworkType {
        self.rules
            .get(state)
            .map(|r| r.override_type)
            .unwrap_or(OverrideNetworkType::None)
    }

    fn parse_icons(&mut self, config: &str) {
        for pair in config.trim().split(',') {
            let pair = pair.trim().to_lowercase();
            if pair.is_empty() {
                continue;
            }
            let kv: Vec<&str> = pair.split(':').map(str::trim).collect();
            if kv.len() != 2 {
                warn!(entry = %pair, "invalid 5G icon configuration entry");
                continue;
            }
            let icon = match kv[1] {
                ICON_5G => OverrideNetworkType::NrNsa,
                ICON_5G_PLUS => OverrideNetworkType::NrNsaMmwave,
                other => {
                    warn!(icon = other, "invalid 5G icon");
                    OverrideNetworkType::None
                }
            };
            match self.rules.get_mut(kv[0]) {
                Some(rule) => rule.override_type = icon,
                None => warn!(state = kv[0], "5G icon configured for unknown state"),
            }
        }
    }

    fn parse_timers(&mut self, config: &str, kind: TimerKind) {
        for entry in config.trim().split(';') {
            let entry = entry.trim().to_lowercase();
            if entry.is_empty() {
                continue;
            }
            let kv: Vec<&str> = entry.split(',').map(str::trim).collect();
            if kv.len() != 3 {
                warn!(entry = %entry, "invalid 5G icon timer configuration entry");
                continue;
            }
            let secs: u32 = match kv[2].parse() {
                Ok(secs) => secs,
                Err(e) => {
                    warn!(entry = %entry, error = %e, "invalid 5G icon timer duration");
                    continue;
                }
            };

            let origins: Vec<&str> = if kv[0] == STATE_ANY {
                ALL_STATES.to_vec()
            } else if self.rules.contains_key(kv[0]) {
                vec![kv[0]]
            } else {
                warn!(state = kv[0], "5G icon timer configured for unknown state");
                continue;
            };

            for origin in origins {
                if let Some(rule) = self.rules.get_mut(origin) {
                    match kind {
                        TimerKind::Primary => rule.add_timer(kv[1], secs),
                        TimerKind::Secondary => rule.add_secondary_timer(kv[1], secs),
                    }
                }
            }
        }
    }
}
