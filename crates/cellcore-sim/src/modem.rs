use cellcore_common::{CapabilityPhase, CapabilityStatus, PhoneId, RadioCapability, SessionId};
use cellcore_radio::capability::{
    CapabilityResponse, CommandError, Coordinator, CoordinatorEvent, ModemChannel,
};
use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Failures injected by [`SimRadio`].
///
/// By default faults hit only the first transaction the radio sees, so the
/// coordinator's rollback transaction can succeed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPlan {
    /// Phones whose START is rejected.
    pub fail_start: Vec<PhoneId>,
    /// Phones whose APPLY is rejected outright.
    pub fail_apply: Vec<PhoneId>,
    /// Phones whose capability-changed notification reports failure.
    pub fail_notification: Vec<PhoneId>,
    /// Never answer anything, forcing the transaction timeout.
    pub drop_responses: bool,
    /// Probability that any START or notification fails.
    pub random_failure_rate: f64,
    /// Keep injecting faults into every transaction, rollbacks included.
    pub repeat: bool,
}

/// Recording [`ModemChannel`]. Requests queue up until the owning
/// [`SimRadio`] pumps them.
#[derive(Clone, Default)]
pub struct SimModem {
    inner: Arc<Mutex<ModemInner>>,
}

#[derive(Default)]
struct ModemInner {
    outbox: VecDeque<RadioCapability>,
    log: Vec<RadioCapability>,
}

impl ModemChannel for SimModem {
    fn send_capability_request(&mut self, request: &RadioCapability) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.outbox.push_back(request.clone());
        inner.log.push(request.clone());
    }
}

/// Simulated radio layer answering capability requests per a [`FaultPlan`].
pub struct SimRadio {
    modem: SimModem,
    plan: FaultPlan,
    rng: StdRng,
    faulted_session: Option<SessionId>,
}

impl SimRadio {
    pub fn new(plan: FaultPlan, seed: u64) -> Self {
        Self {
            modem: SimModem::default(),
            plan,
            rng: StdRng::seed_from_u64(seed),
            faulted_session: None,
        }
    }

    /// Channel to hand to the coordinator.
    pub fn modem(&self) -> SimModem {
        self.modem.clone()
    }

    /// Every request received so far.
    pub fn request_log(&self) -> Vec<RadioCapability> {
        self.modem
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .log
            .clone()
    }

    /// Answers every outstanding request by posting responses to the
    /// coordinator. Returns how many requests were consumed.
    pub fn pump(&mut self, coordinator: &mut Coordinator) -> usize {
        let requests: Vec<RadioCapability> = {
            let mut inner = self.modem.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.outbox.drain(..).collect()
        };

        for request in &requests {
            let faulty = self.is_faulty(request);
            if faulty && self.plan.drop_responses {
                debug!(phone_id = request.phone_id, phase = %request.phase, "response dropped");
                continue;
            }
            for event in self.answer(request, faulty) {
                coordinator.post(event);
            }
        }
        requests.len()
    }

    fn is_faulty(&mut self, request: &RadioCapability) -> bool {
        if request.phase == CapabilityPhase::Start && self.faulted_session.is_none() {
            self.faulted_session = Some(request.session_id);
        }
        self.plan.repeat || self.faulted_session == Some(request.session_id)
    }

    fn roll(&mut self) -> bool {
        self.plan.random_failure_rate > 0.0
            && self.rng.random::<f64>() < self.plan.random_failure_rate
    }

    fn answer(&mut self, request: &RadioCapability, faulty: bool) -> Vec<CoordinatorEvent> {
        let phone = request.phone_id;
        match request.phase {
            CapabilityPhase::Start => {
                let fail = faulty && (self.plan.fail_start.contains(&phone) || self.roll());
                vec![CoordinatorEvent::StartResponse(reply(request, fail))]
            }
            CapabilityPhase::Apply => {
                if faulty && self.plan.fail_apply.contains(&phone) {
                    return vec![CoordinatorEvent::ApplyResponse(reply(request, true))];
                }
                let fail =
                    faulty && (self.plan.fail_notification.contains(&phone) || self.roll());
                let status = if fail {
                    CapabilityStatus::Fail
                } else {
                    CapabilityStatus::Success
                };
                vec![
                    CoordinatorEvent::ApplyResponse(reply(request, false)),
                    CoordinatorEvent::CapabilityChanged(CapabilityResponse::ok(
                        request.echo(CapabilityPhase::Unsol, status),
                    )),
                ]
            }
            CapabilityPhase::Finish => vec![CoordinatorEvent::FinishResponse(
                CapabilityResponse::ok(request.echo(CapabilityPhase::Finish, request.status)),
            )],
            other => {
                warn!(phone_id = phone, phase = %other, "unexpected request phase");
                Vec::new()
            }
        }
    }
}

fn reply(request: &RadioCapability, fail: bool) -> CapabilityResponse {
    if fail {
        CapabilityResponse::err(
            request.echo(request.phase, CapabilityStatus::Fail),
            CommandError::Generic("injected fault".into()),
        )
    } else {
        CapabilityResponse::ok(request.echo(request.phase, CapabilityStatus::Success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellcore_common::{PhoneRaf, RadioAccessFamily};
    use cellcore_radio::capability::coordinator::PhoneCapability;
    use cellcore_radio::capability::{CapabilityBroadcast, CoordinatorConfig};
    use quanta::Clock;

    fn setup(plan: FaultPlan) -> (Coordinator, SimRadio) {
        let radio = SimRadio::new(plan, 1);
        let (clock, _mock) = Clock::mock();
        let coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            clock,
            vec![
                PhoneCapability::new(RadioAccessFamily::GSM, "modem-0"),
                PhoneCapability::new(RadioAccessFamily::LTE, "modem-1"),
            ],
            Box::new(radio.modem()),
        );
        (coordinator, radio)
    }

    fn settle(coordinator: &mut Coordinator, radio: &mut SimRadio) {
        loop {
            coordinator.run_until_idle();
            if radio.pump(coordinator) == 0 {
                break;
            }
        }
    }

    fn swap() -> Vec<PhoneRaf> {
        vec![
            PhoneRaf::new(0, RadioAccessFamily::LTE),
            PhoneRaf::new(1, RadioAccessFamily::GSM),
        ]
    }

    #[test]
    fn healthy_radio_completes_swap() {
        let (mut c, mut radio) = setup(FaultPlan::default());
        let rx = c.subscribe();
        c.set_radio_capability(&swap()).unwrap();
        settle(&mut c, &mut radio);

        assert!(matches!(
            rx.try_recv().unwrap(),
            CapabilityBroadcast::CapabilitySet { .. }
        ));
        assert_eq!(radio.request_log().len(), 6);
    }

    #[test]
    fn first_transaction_fault_then_rollback_succeeds() {
        let (mut c, mut radio) = setup(FaultPlan {
            fail_notification: vec![1],
            ..Default::default()
        });
        let rx = c.subscribe();
        c.set_radio_capability(&swap()).unwrap();
        settle(&mut c, &mut radio);

        assert_eq!(rx.try_recv().unwrap(), CapabilityBroadcast::CapabilityFailed);
        assert!(matches!(
            rx.try_recv().unwrap(),
            CapabilityBroadcast::CapabilitySet { .. }
        ));
        assert!(!c.is_in_transaction());
    }

    #[test]
    fn dropped_responses_leave_transaction_pending() {
        let (mut c, mut radio) = setup(FaultPlan {
            drop_responses: true,
            ..Default::default()
        });
        c.set_radio_capability(&swap()).unwrap();
        settle(&mut c, &mut radio);
        assert!(c.is_in_transaction());
        assert_eq!(radio.request_log().len(), 2);
    }

    #[test]
    fn random_failures_are_seeded() {
        let plan = FaultPlan {
            random_failure_rate: 0.5,
            ..Default::default()
        };
        let run = || {
            let (mut c, mut radio) = setup(plan.clone());
            c.set_radio_capability(&swap()).unwrap();
            settle(&mut c, &mut radio);
            radio.request_log()
        };
        assert_eq!(run(), run());
    }
}
