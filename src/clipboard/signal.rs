//! Waitable signals for request/response exchanges
//!
//! Every outbound request (format data, file contents) blocks on a
//! [`WaitableSignal`] until the matching response is delivered by the
//! protocol handler thread. Waits are bounded and are composed of short
//! polling steps so that a [`StopToken`] can abort them early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::trace;

use crate::clipboard::error::{ClipboardError, Result};

/// Default polling step for bounded waits
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared "session stopped" flag
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that every in-flight wait return [`WaitOutcome::Aborted`]
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the flag before a fresh exchange
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// The peer answered
    Ok(T),
    /// No answer within the configured timeout
    TimedOut,
    /// The stop token fired while waiting
    Aborted,
}

impl<T> WaitOutcome<T> {
    /// Convert into a `Result`, mapping the non-answer outcomes to errors
    pub fn into_result(self, timeout: Duration) -> Result<T> {
        match self {
            WaitOutcome::Ok(value) => Ok(value),
            WaitOutcome::TimedOut => Err(ClipboardError::Timeout(timeout.as_millis() as u64)),
            WaitOutcome::Aborted => Err(ClipboardError::Aborted),
        }
    }
}

/// Single-shot, reusable event carrying a payload
pub struct WaitableSignal<T> {
    slot: Mutex<Option<T>>,
    cond: Condvar,
    poll_interval: Duration,
}

impl<T> WaitableSignal<T> {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            cond: Condvar::new(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Reset to unsignaled, discarding any payload left by a late response
    pub fn arm(&self) {
        *self.slot.lock() = None;
    }

    /// Store the payload and wake the waiter
    ///
    /// Returns `false` if a payload is already waiting to be consumed; the
    /// first payload wins.
    pub fn signal(&self, payload: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(payload);
        self.cond.notify_one();
        true
    }

    pub fn is_signaled(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Block until signaled, `timeout` elapses, or `stop` fires
    ///
    /// Returns within `timeout + poll_interval` in the worst case.
    pub fn wait(&self, timeout: Duration, stop: &StopToken) -> WaitOutcome<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();

        loop {
            if let Some(payload) = slot.take() {
                return WaitOutcome::Ok(payload);
            }
            if stop.is_stopped() {
                return WaitOutcome::Aborted;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            let step = self.poll_interval.min(deadline - now);
            self.cond.wait_for(&mut slot, step);
        }
    }
}

/// One kind of outstanding request (format data or file contents)
///
/// At most one request per kind is on the wire. A second caller queues on
/// the gate for at most `queue_timeout` and is rejected with
/// [`ClipboardError::RequestInFlight`] after that.
pub struct PendingRequest<T> {
    kind: &'static str,
    gate: Mutex<()>,
    awaiting: AtomicBool,
    signal: WaitableSignal<T>,
}

impl<T> PendingRequest<T> {
    pub fn new(kind: &'static str, poll_interval: Duration) -> Self {
        Self {
            kind,
            gate: Mutex::new(()),
            awaiting: AtomicBool::new(false),
            signal: WaitableSignal::new(poll_interval),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Claim the request slot and arm the signal
    ///
    /// The slot is released when the returned guard is dropped.
    pub fn begin(&self, queue_timeout: Duration) -> Result<InFlight<'_, T>> {
        let gate = self
            .gate
            .try_lock_for(queue_timeout)
            .ok_or(ClipboardError::RequestInFlight(self.kind))?;
        self.signal.arm();
        self.awaiting.store(true, Ordering::SeqCst);
        trace!("{} request armed", self.kind);
        Ok(InFlight {
            request: self,
            _gate: gate,
        })
    }

    /// Deliver a response
    ///
    /// Fails with [`ClipboardError::StateInconsistent`] when nothing is
    /// waiting for it.
    pub fn complete(&self, payload: T) -> Result<()> {
        if !self.awaiting.load(Ordering::SeqCst) {
            return Err(ClipboardError::StateInconsistent(format!(
                "{} response without a pending request",
                self.kind
            )));
        }
        if !self.signal.signal(payload) {
            return Err(ClipboardError::StateInconsistent(format!(
                "duplicate {} response",
                self.kind
            )));
        }
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.awaiting.load(Ordering::SeqCst)
    }
}

/// Guard for a claimed request slot
pub struct InFlight<'a, T> {
    request: &'a PendingRequest<T>,
    _gate: MutexGuard<'a, ()>,
}

impl<T> InFlight<'_, T> {
    pub fn wait(&self, timeout: Duration, stop: &StopToken) -> WaitOutcome<T> {
        self.request.signal.wait(timeout, stop)
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.request.awaiting.store(false, Ordering::SeqCst);
    }
}
