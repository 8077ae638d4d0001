//! Integration tests for the radio capability transaction coordinator.
//!
//! A recording modem captures every request; the tests answer them the way
//! the radio layer would and check the resulting phases, broadcasts and
//! rollback behaviour.

use std::sync::{Arc, Mutex};

use quanta::Clock;

use cellcore_common::{
    CapabilityPhase, CapabilityStatus, PhoneId, PhoneRaf, RadioAccessFamily, RadioCapability,
};
use cellcore_radio::capability::coordinator::{PhoneCapability, TransactionStatus};
use cellcore_radio::capability::{
    AttachRetryHook, CapabilityBroadcast, CapabilityResponse, CommandError, Coordinator,
    CoordinatorConfig, CoordinatorEvent, ModemChannel, PowerHold,
};

// ─── Mock Infrastructure ────────────────────────────────────────────────

#[derive(Clone, Default)]
struct RecordingModem(Arc<Mutex<Vec<RadioCapability>>>);

impl RecordingModem {
    fn take(&self) -> Vec<RadioCapability> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl ModemChannel for RecordingModem {
    fn send_capability_request(&mut self, request: &RadioCapability) {
        self.0.lock().unwrap().push(request.clone());
    }
}

#[derive(Clone, Default)]
struct HoldCounter(Arc<Mutex<(u32, u32)>>);

impl PowerHold for HoldCounter {
    fn acquire(&mut self) {
        self.0.lock().unwrap().0 += 1;
    }
    fn release(&mut self) {
        self.0.lock().unwrap().1 += 1;
    }
}

#[derive(Clone, Default)]
struct AttachLog(Arc<Mutex<Vec<PhoneId>>>);

impl AttachRetryHook for AttachLog {
    fn on_radio_capability_changed(&mut self, phone_id: PhoneId) {
        self.0.lock().unwrap().push(phone_id);
    }
}

struct Harness {
    coordinator: Coordinator,
    modem: RecordingModem,
    hold: HoldCounter,
    attach: AttachLog,
    mock: Arc<quanta::Mock>,
}

impl Harness {
    fn new() -> Self {
        let (clock, mock) = Clock::mock();
        let modem = RecordingModem::default();
        let hold = HoldCounter::default();
        let attach = AttachLog::default();
        let coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            clock,
            vec![
                PhoneCapability::new(RadioAccessFamily::GSM, "modem-0"),
                PhoneCapability::new(RadioAccessFamily::LTE, "modem-1"),
            ],
            Box::new(modem.clone()),
        )
        .with_power_hold(Box::new(hold.clone()))
        .with_attach_retry(Box::new(attach.clone()));
        Harness {
            coordinator,
            modem,
            hold,
            attach,
            mock,
        }
    }

    fn post(&mut self, event: CoordinatorEvent) {
        self.coordinator.post(event);
        self.coordinator.run_until_idle();
    }

    /// Acknowledge every request of `phase` with success.
    fn ack_all(&mut self, requests: &[RadioCapability]) {
        for r in requests {
            let rsp = CapabilityResponse::ok(r.echo(r.phase, CapabilityStatus::Success));
            let event = match r.phase {
                CapabilityPhase::Start => CoordinatorEvent::StartResponse(rsp),
                CapabilityPhase::Apply => CoordinatorEvent::ApplyResponse(rsp),
                CapabilityPhase::Finish => CoordinatorEvent::FinishResponse(rsp),
                other => panic!("unexpected phase {other}"),
            };
            self.coordinator.post(event);
        }
        self.coordinator.run_until_idle();
    }

    fn notify(&mut self, request: &RadioCapability, status: CapabilityStatus) {
        let rc = request.echo(CapabilityPhase::Unsol, status);
        self.post(CoordinatorEvent::CapabilityChanged(CapabilityResponse::ok(rc)));
    }

    fn holds(&self) -> (u32, u32) {
        *self.hold.0.lock().unwrap()
    }
}

fn swap() -> Vec<PhoneRaf> {
    vec![
        PhoneRaf::new(0, RadioAccessFamily::LTE),
        PhoneRaf::new(1, RadioAccessFamily::GSM),
    ]
}

fn phases(requests: &[RadioCapability]) -> Vec<CapabilityPhase> {
    requests.iter().map(|r| r.phase).collect()
}

// ─── Scenarios ──────────────────────────────────────────────────────────

#[test]
fn swap_completes_and_broadcasts_new_families() {
    let mut h = Harness::new();
    let rx = h.coordinator.subscribe();
    assert!(h.coordinator.set_radio_capability(&swap()).unwrap());

    let starts = h.modem.take();
    assert_eq!(phases(&starts), vec![CapabilityPhase::Start; 2]);
    assert_eq!(starts[0].raf, RadioAccessFamily::GSM);
    assert_eq!(starts[1].raf, RadioAccessFamily::LTE);
    h.ack_all(&starts);

    let applies = h.modem.take();
    assert_eq!(phases(&applies), vec![CapabilityPhase::Apply; 2]);
    assert_eq!(applies[0].raf, RadioAccessFamily::LTE);
    assert_eq!(applies[1].raf, RadioAccessFamily::GSM);
    h.ack_all(&applies);
    assert!(h.modem.take().is_empty(), "APPLY acks do not advance the transaction");

    h.notify(&applies[0], CapabilityStatus::Success);
    h.notify(&applies[1], CapabilityStatus::Success);
    assert_eq!(*h.attach.0.lock().unwrap(), vec![0, 1]);

    let finishes = h.modem.take();
    assert_eq!(phases(&finishes), vec![CapabilityPhase::Finish; 2]);
    assert!(finishes.iter().all(|r| r.status == CapabilityStatus::Success));
    h.ack_all(&finishes);

    assert_eq!(
        rx.try_recv().unwrap(),
        CapabilityBroadcast::CapabilitySet {
            phones: vec![
                PhoneRaf::new(0, RadioAccessFamily::LTE),
                PhoneRaf::new(1, RadioAccessFamily::GSM),
            ]
        }
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(
        h.coordinator.radio_access_family(0),
        Some(RadioAccessFamily::LTE)
    );
    assert_eq!(h.coordinator.phone(0).unwrap().logical_modem_id, "modem-1");
    assert!(!h.coordinator.is_in_transaction());
    assert_eq!(h.holds(), (1, 1));
}

#[test]
fn failed_notification_rolls_back_to_previous_families() {
    let mut h = Harness::new();
    let rx = h.coordinator.subscribe();
    h.coordinator.set_radio_capability(&swap()).unwrap();
    let first_session = h.coordinator.session_id();

    let starts = h.modem.take();
    h.ack_all(&starts);
    let applies = h.modem.take();
    h.ack_all(&applies);

    h.notify(&applies[0], CapabilityStatus::Success);
    h.notify(&applies[1], CapabilityStatus::Fail);

    let finishes = h.modem.take();
    assert_eq!(phases(&finishes), vec![CapabilityPhase::Finish; 2]);
    assert!(finishes.iter().all(|r| r.status == CapabilityStatus::Fail));
    assert_eq!(finishes[0].raf, RadioAccessFamily::GSM);
    assert_eq!(finishes[0].logical_modem_id.as_deref(), Some("modem-0"));
    assert_eq!(finishes[1].raf, RadioAccessFamily::LTE);
    assert_eq!(finishes[1].logical_modem_id.as_deref(), Some("modem-1"));
    assert_eq!(h.coordinator.status(1), Some(TransactionStatus::Fail));

    h.ack_all(&finishes);
    assert_eq!(rx.try_recv().unwrap(), CapabilityBroadcast::CapabilityFailed);

    // Rollback starts straight away, without releasing the wake hold.
    let retry = h.modem.take();
    assert_eq!(phases(&retry), vec![CapabilityPhase::Start; 2]);
    assert!(retry.iter().all(|r| r.session_id != first_session));
    let snap = h.coordinator.snapshot();
    assert_eq!(
        snap.new_raf,
        vec![RadioAccessFamily::GSM, RadioAccessFamily::LTE]
    );
    assert!(snap.wake_held);
    assert_eq!(h.holds(), (1, 0));

    // Phone 0's partial switch is undone before the rollback starts.
    assert_eq!(h.coordinator.radio_access_family(0), Some(RadioAccessFamily::GSM));
    assert_eq!(h.coordinator.phone(0).unwrap().logical_modem_id, "modem-0");
    assert_eq!(h.coordinator.phone(1).unwrap().logical_modem_id, "modem-1");
    assert_eq!(retry[0].raf, RadioAccessFamily::GSM);
    assert_eq!(retry[0].logical_modem_id.as_deref(), Some("modem-0"));
    assert_eq!(
        snap.target_modem_id,
        vec![Some("modem-0".to_string()), Some("modem-1".to_string())]
    );
}

#[test]
fn start_failure_rollback_requests_pre_transaction_families() {
    let mut h = Harness::new();
    h.coordinator.set_radio_capability(&swap()).unwrap();
    let starts = h.modem.take();

    h.post(CoordinatorEvent::StartResponse(CapabilityResponse::err(
        starts[0].clone(),
        CommandError::RequestNotSupported,
    )));
    h.post(CoordinatorEvent::StartResponse(CapabilityResponse::ok(
        starts[1].echo(CapabilityPhase::Start, CapabilityStatus::Success),
    )));

    let finishes = h.modem.take();
    assert!(finishes.iter().all(|r| r.status == CapabilityStatus::Fail));
    h.ack_all(&finishes);

    let retry = h.modem.take();
    assert_eq!(phases(&retry), vec![CapabilityPhase::Start; 2]);
    assert_eq!(
        h.coordinator.snapshot().new_raf,
        vec![RadioAccessFamily::GSM, RadioAccessFamily::LTE]
    );
}

// ─── Properties ─────────────────────────────────────────────────────────

#[test]
fn colliding_target_modems_fail_after_all_starts() {
    let mut h = Harness::new();
    let rx = h.coordinator.subscribe();
    let both_lte = vec![
        PhoneRaf::new(0, RadioAccessFamily::LTE),
        PhoneRaf::new(1, RadioAccessFamily::LTE),
    ];
    h.coordinator.set_radio_capability(&both_lte).unwrap();
    let snap = h.coordinator.snapshot();
    assert_eq!(snap.target_modem_id[0], snap.target_modem_id[1]);

    let starts = h.modem.take();
    h.ack_all(&starts);

    let finishes = h.modem.take();
    assert_eq!(phases(&finishes), vec![CapabilityPhase::Finish; 2]);
    assert!(finishes.iter().all(|r| r.status == CapabilityStatus::Fail));

    h.ack_all(&finishes);
    assert_eq!(rx.try_recv().unwrap(), CapabilityBroadcast::CapabilityFailed);
}

#[test]
fn late_duplicates_do_not_reset_twice() {
    let mut h = Harness::new();
    let rx = h.coordinator.subscribe();
    h.coordinator.set_radio_capability(&swap()).unwrap();

    let starts = h.modem.take();
    h.ack_all(&starts);
    let applies = h.modem.take();
    h.notify(&applies[0], CapabilityStatus::Success);
    h.notify(&applies[1], CapabilityStatus::Success);
    let finishes = h.modem.take();
    h.ack_all(&finishes);
    assert!(rx.try_recv().is_ok());

    // The same FINISH acks again, then the old notifications.
    let before = h.coordinator.snapshot();
    h.ack_all(&finishes);
    h.notify(&applies[1], CapabilityStatus::Fail);
    assert_eq!(h.coordinator.snapshot(), before);
    assert!(rx.try_recv().is_err());
    assert_eq!(h.holds(), (1, 1));
}

#[test]
fn stale_session_messages_change_nothing_mid_transaction() {
    let mut h = Harness::new();
    h.coordinator.set_radio_capability(&swap()).unwrap();
    let starts = h.modem.take();
    h.ack_all(&starts);
    let applies = h.modem.take();

    let before = h.coordinator.snapshot();
    for r in &applies {
        let mut stale = r.echo(CapabilityPhase::Unsol, CapabilityStatus::Fail);
        stale.session_id += 1000;
        h.post(CoordinatorEvent::CapabilityChanged(CapabilityResponse::ok(stale)));
    }
    // START acks are now out of phase as well.
    h.ack_all(&starts);
    assert_eq!(h.coordinator.snapshot(), before);
}

#[test]
fn timeout_fails_transaction_and_rolls_back() {
    let mut h = Harness::new();
    let rx = h.coordinator.subscribe();
    h.coordinator.set_radio_capability(&swap()).unwrap();
    let starts = h.modem.take();
    h.ack_all(&starts);
    let applies = h.modem.take();
    h.notify(&applies[0], CapabilityStatus::Success);

    h.mock
        .increment(cellcore_radio::capability::coordinator::SET_RC_TIMEOUT);
    h.coordinator.run_until_idle();

    let finishes = h.modem.take();
    assert_eq!(phases(&finishes), vec![CapabilityPhase::Finish; 2]);
    assert!(finishes.iter().all(|r| r.status == CapabilityStatus::Fail));

    // Phone 1's notification for the timed-out session is fenced off.
    h.notify(&applies[1], CapabilityStatus::Success);
    assert!(h.modem.take().is_empty());

    h.ack_all(&finishes);
    assert_eq!(rx.try_recv().unwrap(), CapabilityBroadcast::CapabilityFailed);
    assert_eq!(phases(&h.modem.take()), vec![CapabilityPhase::Start; 2]);
}

#[test]
fn broadcast_serializes_with_result_tag() {
    let set = CapabilityBroadcast::CapabilitySet { phones: swap() };
    let json = serde_json::to_value(&set).unwrap();
    assert_eq!(json["result"], "capability_set");
    assert_eq!(json["phones"][1]["raf"], "GSM");

    let failed = serde_json::to_value(CapabilityBroadcast::CapabilityFailed).unwrap();
    assert_eq!(failed["result"], "capability_failed");
}
