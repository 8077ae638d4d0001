use crate::capability::{
    CapabilityBroadcast, Coordinator, CoordinatorEvent, TransactionSnapshot,
};
use crate::display::{DisplayController, DisplayEvent, DisplaySnapshot};
use cellcore_common::{OverrideNetworkType, PhoneId, PhoneRaf};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest the worker sleeps when no event is scheduled.
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// Control messages sent to the worker via crossbeam channel.
enum ControlMessage {
    SetCapability {
        requests: Vec<PhoneRaf>,
        reply: Sender<Result<bool, crate::capability::CoordinatorError>>,
    },
    Capability(CoordinatorEvent),
    Display(PhoneId, DisplayEvent),
    /// Raw display code that failed to decode; runs the reset path.
    InvalidDisplayCode(PhoneId, u8),
    Subscribe(Sender<Receiver<CapabilityBroadcast>>),
    Shutdown,
}

/// Thread-safe handle to the telephony worker.
///
/// Owns a background thread that runs the capability [`Coordinator`] and one
/// [`DisplayController`] per phone, sleeping until the next scheduled event
/// or control message.
///
/// Published state (display snapshots, the current transaction) is mirrored
/// into shared maps readable from any thread.
///
/// Dropping the runtime triggers a graceful shutdown of the worker thread.
pub struct TelephonyRuntime {
    control_tx: Sender<ControlMessage>,
    shutdown: Arc<AtomicBool>,
    displays: Arc<Mutex<HashMap<PhoneId, DisplaySnapshot>>>,
    transaction: Arc<Mutex<Option<TransactionSnapshot>>>,
    phone_count: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl TelephonyRuntime {
    /// Moves the coordinator and display controllers onto a worker thread.
    pub fn spawn(
        coordinator: Coordinator,
        displays: Vec<DisplayController>,
    ) -> anyhow::Result<Self> {
        let (control_tx, control_rx) = bounded(64);
        let shared_displays = Arc::new(Mutex::new(HashMap::new()));
        let displays_clone = shared_displays.clone();
        let transaction = Arc::new(Mutex::new(None));
        let transaction_clone = transaction.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let phone_count = coordinator.phone_count();

        let handle = thread::Builder::new()
            .name("cellcore-worker".into())
            .spawn(move || {
                runtime_worker(
                    coordinator,
                    displays,
                    control_rx,
                    displays_clone,
                    transaction_clone,
                    shutdown_clone,
                )
            })
            .map_err(|e| anyhow::anyhow!("Failed to spawn telephony worker: {}", e))?;

        Ok(Self {
            control_tx,
            shutdown,
            displays: shared_displays,
            transaction,
            phone_count,
            handle: Some(handle),
        })
    }

    pub fn phone_count(&self) -> usize {
        self.phone_count
    }

    /// Requests a capability switch and waits for the coordinator's verdict.
    ///
    /// `Ok(false)` means another transaction is still in flight.
    pub fn set_radio_capability(&self, requests: Vec<PhoneRaf>) -> anyhow::Result<bool> {
        let (reply, rx) = bounded(1);
        self.control_tx
            .send(ControlMessage::SetCapability { requests, reply })
            .map_err(|e| anyhow::anyhow!("Failed to send capability request: {}", e))?;
        let result = rx
            .recv()
            .map_err(|e| anyhow::anyhow!("Failed to receive capability verdict: {}", e))?;
        Ok(result?)
    }

    /// Forwards a modem response or notification to the coordinator.
    pub fn post_capability_event(&self, event: CoordinatorEvent) -> anyhow::Result<()> {
        self.control_tx
            .send(ControlMessage::Capability(event))
            .map_err(|e| anyhow::anyhow!("Failed to post capability event: {}", e))
    }

    pub fn post_display_event(&self, phone_id: PhoneId, event: DisplayEvent) -> anyhow::Result<()> {
        self.control_tx
            .send(ControlMessage::Display(phone_id, event))
            .map_err(|e| anyhow::anyhow!("Failed to post display event: {}", e))
    }

    /// Forwards a raw display event code. Unknown codes still reach the
    /// controller (which resets itself) and are reported as an error.
    pub fn post_display_code(&self, phone_id: PhoneId, code: u8, arg: i32) -> anyhow::Result<()> {
        match DisplayEvent::from_code(code, arg) {
            Some(event) => self.post_display_event(phone_id, event),
            None => {
                self.control_tx
                    .send(ControlMessage::InvalidDisplayCode(phone_id, code))
                    .map_err(|e| anyhow::anyhow!("Failed to post display event: {}", e))?;
                Err(crate::display::DisplayError::UnknownEvent(code).into())
            }
        }
    }

    /// Registers for capability transaction outcomes.
    pub fn subscribe(&self) -> anyhow::Result<Receiver<CapabilityBroadcast>> {
        let (reply, rx) = bounded(1);
        self.control_tx
            .send(ControlMessage::Subscribe(reply))
            .map_err(|e| anyhow::anyhow!("Failed to subscribe: {}", e))?;
        rx.recv()
            .map_err(|e| anyhow::anyhow!("Failed to receive subscription: {}", e))
    }

    /// Last published display type for a phone.
    pub fn override_network_type(&self, phone_id: PhoneId) -> Option<OverrideNetworkType> {
        self.displays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&phone_id)
            .map(|s| s.override_network_type)
    }

    /// Returns a snapshot of every display controller (thread-safe clone).
    pub fn display_snapshots(&self) -> HashMap<PhoneId, DisplaySnapshot> {
        self.displays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Current transaction state, refreshed after every processed event.
    pub fn transaction_snapshot(&self) -> Option<TransactionSnapshot> {
        self.transaction
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Gracefully shuts down the worker thread. Idempotent.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TelephonyRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn runtime_worker(
    mut coordinator: Coordinator,
    mut displays: Vec<DisplayController>,
    control_rx: Receiver<ControlMessage>,
    shared_displays: Arc<Mutex<HashMap<PhoneId, DisplaySnapshot>>>,
    transaction: Arc<Mutex<Option<TransactionSnapshot>>>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        coordinator.run_until_idle();
        for display in displays.iter_mut() {
            display.run_until_idle();
        }
        publish(&coordinator, &displays, &shared_displays, &transaction);

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let wait = displays
            .iter()
            .filter_map(|d| d.time_until_next())
            .chain(coordinator.time_until_next())
            .min()
            .unwrap_or(IDLE_WAIT)
            .min(IDLE_WAIT);

        match control_rx.recv_timeout(wait) {
            Ok(msg) => match msg {
                ControlMessage::SetCapability { requests, reply } => {
                    let result = coordinator.set_radio_capability(&requests);
                    let _ = reply.send(result);
                }
                ControlMessage::Capability(event) => coordinator.post(event),
                ControlMessage::Display(phone_id, event) => {
                    match displays.iter_mut().find(|d| d.phone_id() == phone_id) {
                        Some(display) => display.post(event),
                        None => warn!(phone_id, ?event, "display event for unknown phone"),
                    }
                }
                ControlMessage::InvalidDisplayCode(phone_id, code) => {
                    if let Some(display) = displays.iter_mut().find(|d| d.phone_id() == phone_id) {
                        let _ = display.post_code(code, 0);
                    }
                }
                ControlMessage::Subscribe(reply) => {
                    let _ = reply.send(coordinator.subscribe());
                }
                ControlMessage::Shutdown => break,
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("telephony worker stopped");
}

fn publish(
    coordinator: &Coordinator,
    displays: &[DisplayController],
    shared_displays: &Mutex<HashMap<PhoneId, DisplaySnapshot>>,
    transaction: &Mutex<Option<TransactionSnapshot>>,
) {
    let mut m = shared_displays.lock().unwrap_or_else(|e| e.into_inner());
    for display in displays {
        m.insert(display.phone_id(), display.snapshot());
    }
    drop(m);
    *transaction.lock().unwrap_or_else(|e| e.into_inner()) = Some(coordinator.snapshot());
}
