//! # Capability Transaction Coordinator
//!
//! Owns the single in-flight [`TransactionState`] and drives it from
//! queued [`CoordinatorEvent`]s. Every response is matched against the
//! current session id; anything from a superseded or timed-out session is
//! dropped without touching state.
//!
//! A session id is minted when a transaction starts, when it completes
//! successfully, and when it times out. The timeout entry is never
//! removed from the queue: once the session moves on it fires as a no-op.

use std::collections::HashSet;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use quanta::{Clock, Instant};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use cellcore_common::{
    CapabilityPhase, CapabilityStatus, PhoneId, PhoneRaf, RadioAccessFamily, RadioCapability,
    SessionId,
};

use super::wakelock::{PowerHold, WakeHold};
use super::{
    AttachRetryHook, CapabilityBroadcast, CapabilityResponse, CoordinatorError, CoordinatorEvent,
    ModemChannel,
};
use crate::event::EventQueue;

/// Deadline for a whole transaction before it is forced to fail.
pub const SET_RC_TIMEOUT: Duration = Duration::from_secs(45);

/// Coordinator tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Global transaction timeout in milliseconds.
    pub timeout_ms: u64,
    /// First session id handed out.
    pub first_session_id: SessionId,
}

impl CoordinatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            timeout_ms: SET_RC_TIMEOUT.as_millis() as u64,
            first_session_id: 1,
        }
    }
}

/// Per-phone progress through a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Idle,
    Starting,
    Started,
    Applying,
    Success,
    Fail,
}

/// Live capability of one phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneCapability {
    pub raf: RadioAccessFamily,
    pub logical_modem_id: String,
}

impl PhoneCapability {
    pub fn new(raf: RadioAccessFamily, logical_modem_id: impl Into<String>) -> Self {
        PhoneCapability {
            raf,
            logical_modem_id: logical_modem_id.into(),
        }
    }
}

/// Mutable transaction bookkeeping. Outside a transaction every status is
/// `Idle` and `phase` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TransactionState {
    session_id: SessionId,
    phase: Option<CapabilityPhase>,
    status: Vec<TransactionStatus>,
    old_raf: Vec<RadioAccessFamily>,
    new_raf: Vec<RadioAccessFamily>,
    current_modem_id: Vec<Option<String>>,
    target_modem_id: Vec<Option<String>>,
    pending: usize,
    failed: bool,
}

impl TransactionState {
    fn new(phones: usize) -> Self {
        TransactionState {
            session_id: 0,
            phase: None,
            status: vec![TransactionStatus::Idle; phones],
            old_raf: vec![RadioAccessFamily::UNKNOWN; phones],
            new_raf: vec![RadioAccessFamily::UNKNOWN; phones],
            current_modem_id: vec![None; phones],
            target_modem_id: vec![None; phones],
            pending: 0,
            failed: false,
        }
    }

    /// Back to all-idle, keeping the session id.
    fn clear(&mut self) {
        let session_id = self.session_id;
        *self = TransactionState::new(self.status.len());
        self.session_id = session_id;
    }
}

/// Serializable dump of the coordinator, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSnapshot {
    pub session_id: SessionId,
    pub phase: Option<CapabilityPhase>,
    pub status: Vec<TransactionStatus>,
    pub old_raf: Vec<RadioAccessFamily>,
    pub new_raf: Vec<RadioAccessFamily>,
    pub current_modem_id: Vec<Option<String>>,
    pub target_modem_id: Vec<Option<String>>,
    pub pending_responses: usize,
    pub failed: bool,
    pub wake_held: bool,
    pub phones: Vec<PhoneCapability>,
}

/// Radio capability transaction coordinator.
pub struct Coordinator {
    config: CoordinatorConfig,
    queue: EventQueue<CoordinatorEvent>,
    modem: Box<dyn ModemChannel>,
    attach_retry: Option<Box<dyn AttachRetryHook>>,
    wake: WakeHold,
    phones: Vec<PhoneCapability>,
    txn: TransactionState,
    next_session_id: SessionId,
    subscribers: Vec<Sender<CapabilityBroadcast>>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        clock: Clock,
        phones: Vec<PhoneCapability>,
        modem: Box<dyn ModemChannel>,
    ) -> Self {
        let txn = TransactionState::new(phones.len());
        Coordinator {
            next_session_id: config.first_session_id,
            config,
            queue: EventQueue::new(clock),
            modem,
            attach_retry: None,
            wake: WakeHold::new("cellcore:capability"),
            phones,
            txn,
            subscribers: Vec::new(),
        }
    }

    pub fn with_attach_retry(mut self, hook: Box<dyn AttachRetryHook>) -> Self {
        self.attach_retry = Some(hook);
        self
    }

    pub fn with_power_hold(mut self, backend: Box<dyn PowerHold>) -> Self {
        self.wake = WakeHold::with_backend("cellcore:capability", backend);
        self
    }

    /// Register for transaction outcome broadcasts.
    pub fn subscribe(&mut self) -> Receiver<CapabilityBroadcast> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub fn phone_count(&self) -> usize {
        self.phones.len()
    }

    pub fn radio_access_family(&self, phone_id: PhoneId) -> Option<RadioAccessFamily> {
        self.phones.get(phone_id).map(|p| p.raf)
    }

    pub fn phone(&self, phone_id: PhoneId) -> Option<&PhoneCapability> {
        self.phones.get(phone_id)
    }

    pub fn status(&self, phone_id: PhoneId) -> Option<TransactionStatus> {
        self.txn.status.get(phone_id).copied()
    }

    pub fn session_id(&self) -> SessionId {
        self.txn.session_id
    }

    pub fn is_in_transaction(&self) -> bool {
        self.txn.status.iter().any(|s| *s != TransactionStatus::Idle)
    }

    pub fn is_wake_held(&self) -> bool {
        self.wake.is_held()
    }

    /// Family with the most technologies among all phones.
    pub fn max_raf_supported(&self) -> RadioAccessFamily {
        let mut max_bits = 0;
        let mut max_raf = RadioAccessFamily::UNKNOWN;
        for phone in &self.phones {
            let bits = phone.raf.technology_count();
            if max_bits < bits {
                max_bits = bits;
                max_raf = phone.raf;
            }
        }
        max_raf
    }

    /// Family with the fewest technologies among all phones.
    pub fn min_raf_supported(&self) -> RadioAccessFamily {
        let mut min_bits = 0;
        let mut min_raf = RadioAccessFamily::UNKNOWN;
        for phone in &self.phones {
            let bits = phone.raf.technology_count();
            if min_bits == 0 || min_bits > bits {
                min_bits = bits;
                min_raf = phone.raf;
            }
        }
        min_raf
    }

    pub fn snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            session_id: self.txn.session_id,
            phase: self.txn.phase,
            status: self.txn.status.clone(),
            old_raf: self.txn.old_raf.clone(),
            new_raf: self.txn.new_raf.clone(),
            current_modem_id: self.txn.current_modem_id.clone(),
            target_modem_id: self.txn.target_modem_id.clone(),
            pending_responses: self.txn.pending,
            failed: self.txn.failed,
            wake_held: self.wake.is_held(),
            phones: self.phones.clone(),
        }
    }

    // ─── Event loop ─────────────────────────────────────────────────────

    /// Queue an event from the radio layer.
    pub fn post(&mut self, event: CoordinatorEvent) {
        self.queue.push(event);
    }

    /// Handle one due event. Returns false when nothing was due.
    pub fn process_next(&mut self) -> bool {
        match self.queue.pop_ready() {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Handle every due event. Returns how many were processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut n = 0;
        while self.process_next() {
            n += 1;
        }
        n
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Time until the next queued event is due.
    pub fn time_until_next(&self) -> Option<Duration> {
        self.queue.time_until_next()
    }

    fn handle(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::StartResponse(rsp) => self.on_start_response(rsp),
            CoordinatorEvent::ApplyResponse(rsp) => self.on_apply_response(rsp),
            CoordinatorEvent::CapabilityChanged(rsp) => self.on_capability_changed(rsp),
            CoordinatorEvent::FinishResponse(rsp) => self.on_finish_response(rsp),
            CoordinatorEvent::Timeout { session_id } => self.on_timeout(session_id),
        }
    }

    // ─── Public contract ────────────────────────────────────────────────

    /// Request a new family for every phone.
    ///
    /// Returns `Ok(false)` while another transaction is in flight and
    /// `Ok(true)` when the request was accepted (or already satisfied).
    pub fn set_radio_capability(&mut self, requests: &[PhoneRaf]) -> Result<bool, CoordinatorError> {
        if requests.len() != self.phones.len() {
            return Err(CoordinatorError::PhoneCountMismatch {
                expected: self.phones.len(),
                got: requests.len(),
            });
        }
        let mut seen = HashSet::new();
        for req in requests {
            if req.phone_id >= self.phones.len() {
                return Err(CoordinatorError::InvalidPhone(req.phone_id));
            }
            if !seen.insert(req.phone_id) {
                return Err(CoordinatorError::DuplicatePhone(req.phone_id));
            }
        }

        if let Some(busy) = self
            .txn
            .status
            .iter()
            .position(|s| *s != TransactionStatus::Idle)
        {
            warn!(
                phone_id = busy,
                status = ?self.txn.status[busy],
                "set_radio_capability rejected: transaction in flight"
            );
            return Ok(false);
        }

        if requests
            .iter()
            .all(|req| self.phones[req.phone_id].raf == req.raf)
        {
            info!("set_radio_capability: requested families already in place");
            return Ok(true);
        }

        self.clear_transaction();
        self.wake.acquire();
        self.start_transaction(requests);
        Ok(true)
    }

    // ─── Phases ─────────────────────────────────────────────────────────

    fn start_transaction(&mut self, requests: &[PhoneRaf]) {
        let session_id = self.mint_session_id();
        self.queue
            .push_delayed(CoordinatorEvent::Timeout { session_id }, self.config.timeout());

        self.txn.phase = Some(CapabilityPhase::Start);
        self.txn.pending = requests.len();
        for req in requests {
            let id = req.phone_id;
            let phone = &self.phones[id];
            self.txn.status[id] = TransactionStatus::Starting;
            self.txn.old_raf[id] = phone.raf;
            self.txn.new_raf[id] = req.raf;
            self.txn.current_modem_id[id] = Some(phone.logical_modem_id.clone());
            self.txn.target_modem_id[id] = self.logical_modem_id_for(req.raf);

            info!(
                phone_id = id,
                session_id,
                old_raf = %self.txn.old_raf[id],
                new_raf = %req.raf,
                target_modem = ?self.txn.target_modem_id[id],
                "capability START"
            );
            self.send(
                id,
                CapabilityPhase::Start,
                self.txn.old_raf[id],
                self.txn.current_modem_id[id].clone(),
                CapabilityStatus::None,
            );
        }
    }

    fn on_start_response(&mut self, rsp: CapabilityResponse) {
        let Some(rc) = self.accept(&rsp, CapabilityPhase::Start) else {
            return;
        };
        let id = rc.phone_id;
        self.txn.pending = self.txn.pending.saturating_sub(1);

        if rsp.error.is_some() || rc.status == CapabilityStatus::Fail {
            warn!(phone_id = id, error = ?rsp.error, "START failed");
            self.txn.status[id] = TransactionStatus::Fail;
            self.txn.failed = true;
        } else {
            debug!(phone_id = id, "START ok");
            self.txn.status[id] = TransactionStatus::Started;
        }

        if self.txn.pending > 0 {
            return;
        }

        let mut in_use = HashSet::with_capacity(self.txn.target_modem_id.len());
        for (phone_id, modem_id) in self.txn.target_modem_id.iter().enumerate() {
            if !in_use.insert(modem_id.as_deref()) {
                error!(
                    phone_id,
                    modem_id = ?modem_id,
                    "same logical modem assigned to more than one phone"
                );
                self.txn.failed = true;
            }
        }

        if self.txn.failed {
            self.issue_finish();
            return;
        }

        self.txn.phase = Some(CapabilityPhase::Apply);
        self.txn.pending = self.phones.len();
        for id in 0..self.phones.len() {
            self.send(
                id,
                CapabilityPhase::Apply,
                self.txn.new_raf[id],
                self.txn.target_modem_id[id].clone(),
                CapabilityStatus::None,
            );
            self.txn.status[id] = TransactionStatus::Applying;
        }
    }

    /// APPLY acks only confirm receipt; completion is the notification.
    fn on_apply_response(&mut self, rsp: CapabilityResponse) {
        let Some(rc) = self.accept(&rsp, CapabilityPhase::Apply) else {
            return;
        };
        if rsp.error.is_some() || rc.status == CapabilityStatus::Fail {
            warn!(phone_id = rc.phone_id, error = ?rsp.error, "APPLY rejected");
            self.txn.status[rc.phone_id] = TransactionStatus::Fail;
            self.txn.failed = true;
        } else {
            debug!(phone_id = rc.phone_id, "APPLY accepted, awaiting notification");
        }
    }

    fn on_capability_changed(&mut self, rsp: CapabilityResponse) {
        let Some(rc) = self.accept(&rsp, CapabilityPhase::Apply) else {
            return;
        };
        let id = rc.phone_id;

        if rsp.error.is_some() || rc.status == CapabilityStatus::Fail {
            warn!(phone_id = id, error = ?rsp.error, "capability change failed");
            self.txn.status[id] = TransactionStatus::Fail;
            self.txn.failed = true;
        } else {
            info!(phone_id = id, raf = %rc.raf, modem = ?rc.logical_modem_id, "capability changed");
            self.txn.status[id] = TransactionStatus::Success;
            let phone = &mut self.phones[id];
            phone.raf = rc.raf;
            if let Some(modem_id) = rc.logical_modem_id {
                phone.logical_modem_id = modem_id;
            }
            if let Some(hook) = self.attach_retry.as_mut() {
                hook.on_radio_capability_changed(id);
            }
        }

        self.txn.pending = self.txn.pending.saturating_sub(1);
        if self.txn.pending == 0 {
            self.issue_finish();
        }
    }

    fn issue_finish(&mut self) {
        let failed = self.txn.failed;
        self.txn.phase = Some(CapabilityPhase::Finish);
        for id in 0..self.phones.len() {
            self.txn.pending += 1;
            let (raf, modem_id) = if failed {
                (self.txn.old_raf[id], self.txn.current_modem_id[id].clone())
            } else {
                (self.txn.new_raf[id], self.txn.target_modem_id[id].clone())
            };
            let status = if failed {
                CapabilityStatus::Fail
            } else {
                CapabilityStatus::Success
            };
            debug!(phone_id = id, session_id = self.txn.session_id, failed, "capability FINISH");
            self.send(id, CapabilityPhase::Finish, raf, modem_id, status);
            if failed {
                self.txn.status[id] = TransactionStatus::Fail;
            }
        }
    }

    fn on_finish_response(&mut self, rsp: CapabilityResponse) {
        let Some(rc) = self.accept(&rsp, CapabilityPhase::Finish) else {
            return;
        };
        if let Some(err) = &rsp.error {
            warn!(phone_id = rc.phone_id, error = %err, "FINISH reported an error");
        }
        self.txn.pending = self.txn.pending.saturating_sub(1);
        if self.txn.pending == 0 {
            self.complete_transaction();
        }
    }

    fn complete_transaction(&mut self) {
        if !self.txn.failed {
            let phones: Vec<PhoneRaf> = self
                .phones
                .iter()
                .enumerate()
                .map(|(id, p)| PhoneRaf::new(id, p.raf))
                .collect();
            info!(session_id = self.txn.session_id, "capability transaction succeeded");
            self.mint_session_id();
            self.clear_transaction();
            self.broadcast(CapabilityBroadcast::CapabilitySet { phones });
            return;
        }

        let rollback: Vec<PhoneRaf> = self
            .txn
            .old_raf
            .iter()
            .enumerate()
            .map(|(id, raf)| PhoneRaf::new(id, *raf))
            .collect();
        warn!(
            session_id = self.txn.session_id,
            "capability transaction failed, rolling back to previous families"
        );
        // FINISH(fail) reverted the modems to these values; partial APPLY
        // results must not survive into the rollback.
        for (id, phone) in self.phones.iter_mut().enumerate() {
            phone.raf = self.txn.old_raf[id];
            if let Some(modem_id) = &self.txn.current_modem_id[id] {
                phone.logical_modem_id = modem_id.clone();
            }
        }
        self.broadcast(CapabilityBroadcast::CapabilityFailed);
        self.txn.failed = false;
        self.txn.clear();
        self.start_transaction(&rollback);
    }

    fn on_timeout(&mut self, session_id: SessionId) {
        if session_id != self.txn.session_id {
            debug!(session_id, current = self.txn.session_id, "stale timeout ignored");
            return;
        }
        error!(
            session_id,
            status = ?self.txn.status,
            "capability transaction timed out"
        );
        self.mint_session_id();
        self.txn.pending = 0;
        self.txn.failed = true;
        self.issue_finish();
    }

    // ─── Internal ───────────────────────────────────────────────────────

    /// Session and phase fence. Returns the echoed descriptor when the
    /// response belongs to the current session and phase.
    fn accept(&self, rsp: &CapabilityResponse, phase: CapabilityPhase) -> Option<RadioCapability> {
        let Some(rc) = rsp.capability.as_ref() else {
            warn!(?phase, "response without capability payload dropped");
            return None;
        };
        if rc.session_id != self.txn.session_id {
            debug!(
                phone_id = rc.phone_id,
                session_id = rc.session_id,
                current = self.txn.session_id,
                ?phase,
                "stale response dropped"
            );
            return None;
        }
        if self.txn.phase != Some(phase) {
            warn!(
                phone_id = rc.phone_id,
                ?phase,
                current = ?self.txn.phase,
                "out-of-phase response dropped"
            );
            return None;
        }
        if rc.phone_id >= self.phones.len() {
            error!(phone_id = rc.phone_id, "response for unknown phone dropped");
            return None;
        }
        Some(rc.clone())
    }

    fn send(
        &mut self,
        phone_id: PhoneId,
        phase: CapabilityPhase,
        raf: RadioAccessFamily,
        logical_modem_id: Option<String>,
        status: CapabilityStatus,
    ) {
        let request = RadioCapability::new(
            phone_id,
            self.txn.session_id,
            phase,
            raf,
            logical_modem_id,
            status,
        );
        self.modem.send_capability_request(&request);
    }

    /// Modem currently serving `raf`, if any phone has exactly that family.
    fn logical_modem_id_for(&self, raf: RadioAccessFamily) -> Option<String> {
        self.phones
            .iter()
            .find(|p| p.raf == raf)
            .map(|p| p.logical_modem_id.clone())
    }

    fn mint_session_id(&mut self) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1);
        self.txn.session_id = id;
        id
    }

    /// Reset to all-idle and drop the wake hold. Safe to call repeatedly.
    fn clear_transaction(&mut self) {
        self.txn.clear();
        self.wake.release();
    }

    fn broadcast(&mut self, result: CapabilityBroadcast) {
        self.subscribers.retain(|tx| tx.send(result.clone()).is_ok());
    }
}
