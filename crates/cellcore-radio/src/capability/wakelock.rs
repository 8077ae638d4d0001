//! Process wake hold for in-flight capability transactions.
//!
//! Non reference-counted: repeated acquires collapse into one hold and the
//! first release drops it. Releasing an unheld lock is a no-op.

use tracing::debug;

/// Platform power-management backend.
pub trait PowerHold: Send {
    fn acquire(&mut self);
    fn release(&mut self);
}

/// Idempotent wake hold wrapper.
pub struct WakeHold {
    tag: &'static str,
    backend: Option<Box<dyn PowerHold>>,
    held: bool,
}

impl WakeHold {
    /// A hold with no platform backend; only tracks state.
    pub fn new(tag: &'static str) -> Self {
        WakeHold {
            tag,
            backend: None,
            held: false,
        }
    }

    pub fn with_backend(tag: &'static str, backend: Box<dyn PowerHold>) -> Self {
        WakeHold {
            tag,
            backend: Some(backend),
            held: false,
        }
    }

    pub fn acquire(&mut self) {
        if self.held {
            return;
        }
        self.held = true;
        if let Some(backend) = self.backend.as_mut() {
            backend.acquire();
        }
        debug!(tag = self.tag, "wake hold acquired");
    }

    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Some(backend) = self.backend.as_mut() {
            backend.release();
        }
        debug!(tag = self.tag, "wake hold released");
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counts {
        acquired: u32,
        released: u32,
    }

    struct CountingHold(Arc<Mutex<Counts>>);

    impl PowerHold for CountingHold {
        fn acquire(&mut self) {
            self.0.lock().unwrap().acquired += 1;
        }
        fn release(&mut self) {
            self.0.lock().unwrap().released += 1;
        }
    }

    #[test]
    fn acquire_is_not_reference_counted() {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut hold = WakeHold::with_backend("test", Box::new(CountingHold(counts.clone())));
        hold.acquire();
        hold.acquire();
        assert!(hold.is_held());
        hold.release();
        assert!(!hold.is_held());

        let c = counts.lock().unwrap();
        assert_eq!(c.acquired, 1);
        assert_eq!(c.released, 1);
    }

    #[test]
    fn release_without_acquire_is_noop() {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut hold = WakeHold::with_backend("test", Box::new(CountingHold(counts.clone())));
        hold.release();
        hold.release();
        assert_eq!(counts.lock().unwrap().released, 0);
    }
}
