//! Event dispatcher
//!
//! Routes a decoded event to its handlers: catch-all handlers first, then handlers for
//! the event type, each in registration order. Handlers run synchronously on the
//! caller (the read loop), so frame order is invocation order.

mod registry;

pub use registry::{HandlerKey, HandlerRegistry, HandlerToken};

use crate::error::GatewayError;
use crate::events::Event;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of dispatching one event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that ran to completion
    pub invoked: usize,
    /// Handlers that panicked
    pub panicked: usize,
}

impl<C: 'static> HandlerRegistry<C> {
    /// Invoke every handler registered for `event`
    ///
    /// The registry lock is released before any handler runs, so handlers may register
    /// and unregister freely. Fire-once handlers are claimed before running and removed
    /// afterwards. A panicking handler is logged and skipped.
    pub fn dispatch(&self, ctx: &C, event: &Event) -> DispatchReport {
        let mut report = DispatchReport::default();

        for entry in self.snapshot(event.kind()) {
            if !entry.claim() {
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| (entry.callback)(ctx, event)));

            if entry.once {
                self.remove(entry.key, entry.id);
            }

            match result {
                Ok(()) => report.invoked += 1,
                Err(panic) => {
                    report.panicked += 1;
                    let err = GatewayError::Handler(panic_message(panic.as_ref()));
                    tracing::error!(
                        event_type = event.name(),
                        handler_id = entry.id,
                        error = %err,
                        "Event handler panicked"
                    );
                }
            }
        }

        tracing::trace!(
            event_type = event.name(),
            invoked = report.invoked,
            "Event dispatched"
        );
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
