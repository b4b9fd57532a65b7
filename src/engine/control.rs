use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Request posted by the caller, consumed by the loop at its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Running,
    PauseRequested,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

/// Cooperative control channel between the caller and one agent loop.
///
/// Stop is sticky: once requested the signal never leaves `StopRequested`
/// and the cancellation token stays cancelled. Work run through `gated`
/// is serialized against `request_stop`, so nothing gated happens after
/// `request_stop` returns.
pub struct RunControl {
    signal: watch::Sender<ControlSignal>,
    cancel: CancellationToken,
    paused: AtomicBool,
    gate: Mutex<()>,
}

impl RunControl {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(ControlSignal::Running);
        Self {
            signal,
            cancel: CancellationToken::new(),
            paused: AtomicBool::new(false),
            gate: Mutex::new(()),
        }
    }

    pub fn signal(&self) -> ControlSignal {
        *self.signal.borrow()
    }

    /// Returns false when a pause or stop is already pending.
    pub fn request_pause(&self) -> bool {
        self.signal.send_if_modified(|current| {
            if *current == ControlSignal::Running {
                *current = ControlSignal::PauseRequested;
                true
            } else {
                false
            }
        })
    }

    /// Clears a pending pause. No-op otherwise.
    pub fn resume(&self) -> bool {
        self.signal.send_if_modified(|current| {
            if *current == ControlSignal::PauseRequested {
                *current = ControlSignal::Running;
                true
            } else {
                false
            }
        })
    }

    /// Returns true the first time only.
    pub fn request_stop(&self) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        let first = self.signal.send_if_modified(|current| {
            if *current == ControlSignal::StopRequested {
                false
            } else {
                *current = ControlSignal::StopRequested;
                true
            }
        });
        self.cancel.cancel();
        first
    }

    /// Run `f` unless a stop has been requested.
    pub fn gated<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_stop_requested() {
            None
        } else {
            Some(f())
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.signal() == ControlSignal::StopRequested
    }

    /// True only while the loop is parked inside `suspend`.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Park the loop until the pending pause is lifted or a stop arrives.
    pub async fn suspend(&self) -> Checkpoint {
        let mut rx = self.signal.subscribe();
        self.paused.store(true, Ordering::SeqCst);
        let outcome = loop {
            match *rx.borrow_and_update() {
                ControlSignal::PauseRequested => {}
                ControlSignal::Running => break Checkpoint::Continue,
                ControlSignal::StopRequested => break Checkpoint::Stop,
            }
            if rx.changed().await.is_err() {
                break Checkpoint::Stop;
            }
        };
        self.paused.store(false, Ordering::SeqCst);
        outcome
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}
