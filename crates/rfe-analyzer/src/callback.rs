//! Sweep callback registration and dispatch.
//!
//! A registered [`SweepHandler`] runs on a dedicated `rfe-callback` thread,
//! never on the IO task. The IO task forwards sweeps over an unbounded
//! channel, so a slow handler delays its own deliveries but never stalls
//! reading from the device.
//!
//! Revocation is synchronous: once [`CallbackSlot::revoke`] returns, the
//! handler will not be invoked again. When called from inside the handler
//! itself, revocation takes effect after the current invocation returns.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error};

use rfe_core::error::{Error, Result};
use rfe_core::SweepRecord;

use crate::io::Delivery;

/// Receives sweep records from a session.
///
/// Implemented for any `FnMut(&SweepRecord) + Send + 'static` closure.
pub trait SweepHandler: Send + 'static {
    /// Called once per parsed sweep, in arrival order.
    fn on_sweep(&mut self, record: &SweepRecord);

    /// Called at most once when the session faults. No sweeps follow.
    fn on_fault(&mut self, error: &Error) {
        let _ = error;
    }
}

impl<F> SweepHandler for F
where
    F: FnMut(&SweepRecord) + Send + 'static,
{
    fn on_sweep(&mut self, record: &SweepRecord) {
        self(record)
    }
}

/// State shared between the slot and its dispatcher thread.
struct SlotInner {
    handler: Mutex<Option<Box<dyn SweepHandler>>>,
    revoked: AtomicBool,
}

/// A registered handler and the thread that runs it.
pub(crate) struct CallbackSlot {
    inner: Arc<SlotInner>,
    dispatcher: ThreadId,
}

impl CallbackSlot {
    /// Start a dispatcher thread for `handler`, fed by `deliveries`.
    ///
    /// The thread exits when `deliveries` closes or the slot is revoked.
    pub fn spawn(
        handler: Box<dyn SweepHandler>,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
    ) -> Result<Self> {
        let inner = Arc::new(SlotInner {
            handler: Mutex::new(Some(handler)),
            revoked: AtomicBool::new(false),
        });

        let thread_inner = Arc::clone(&inner);
        let dispatcher = thread::Builder::new()
            .name("rfe-callback".into())
            .spawn(move || dispatch(thread_inner, deliveries))?;

        Ok(CallbackSlot {
            inner,
            dispatcher: dispatcher.thread().id(),
        })
    }

    /// Stop all further invocations.
    ///
    /// Waits for an in-flight invocation to finish unless called from the
    /// dispatcher thread.
    pub fn revoke(&self) {
        self.inner.revoked.store(true, Ordering::Release);
        if thread::current().id() == self.dispatcher {
            debug!("sweep callback revoked from inside the handler");
            return;
        }
        let handler = self
            .inner
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(handler);
        debug!("sweep callback revoked");
    }
}

fn dispatch(inner: Arc<SlotInner>, mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(delivery) = deliveries.blocking_recv() {
        if inner.revoked.load(Ordering::Acquire) {
            break;
        }
        let mut guard = inner.handler.lock().unwrap_or_else(PoisonError::into_inner);
        // Revocation may have raced the lock.
        if inner.revoked.load(Ordering::Acquire) {
            break;
        }
        let Some(handler) = guard.as_mut() else {
            break;
        };

        let outcome = match delivery {
            Delivery::Sweep(record) => {
                catch_unwind(AssertUnwindSafe(|| handler.on_sweep(&record)))
            }
            Delivery::Fault(e) => catch_unwind(AssertUnwindSafe(|| handler.on_fault(&e))),
        };
        if outcome.is_err() {
            error!("sweep callback panicked");
        }
    }

    inner
        .handler
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    debug!("callback dispatcher exiting");
}
