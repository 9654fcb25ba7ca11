use std::sync::{
    mpsc::{self, Receiver, SyncSender},
    Arc, Mutex,
};

use rp2daq_driver::{error::DriverError, protocol::Report};

/// An asynchronous report handler.
pub(crate) type ReportHandler = dyn Fn(Report) + Send + Sync;

/// Per-report-type consumer registration.
enum Binding {
    /// Nobody is interested; reports of this type are dropped.
    Unregistered,
    /// One blocking caller is parked on the rendezvous slot.
    AwaitingSync { id: u64, slot: SyncSender<Report> },
    /// A persistent asynchronous callback.
    Handler(Arc<ReportHandler>),
}

struct Table {
    bindings: Vec<Binding>,
    next_wait_id: u64,
}

/// Routes decoded reports to rendezvous slots and the callback queue.
///
/// The binding table lives behind this type; callers register interest
/// through [`Device`](crate::Device) and never touch the raw map.
pub(crate) struct Dispatcher {
    table: Mutex<Table>,
    callback_tx: async_channel::Sender<(Arc<ReportHandler>, Report)>,
}

impl Dispatcher {
    pub(crate) fn new(callback_tx: async_channel::Sender<(Arc<ReportHandler>, Report)>) -> Self {
        Self {
            table: Mutex::new(Table {
                bindings: (0..=u8::MAX as usize).map(|_| Binding::Unregistered).collect(),
                next_wait_id: 0,
            }),
            callback_tx,
        }
    }

    /// Routes one report: O(1) lookup plus a queue push or rendezvous
    /// signal, never blocking.
    pub(crate) fn route(&self, report: Report) {
        let ty = report.report_type;
        let binding = {
            let Ok(mut table) = self.table.lock() else {
                return;
            };
            match &table.bindings[ty as usize] {
                Binding::Unregistered => {
                    tracing::debug!("dropping unsolicited report {:#04X}", ty);
                    return;
                }
                Binding::Handler(h) => Binding::Handler(h.clone()),
                Binding::AwaitingSync { .. } => std::mem::replace(
                    &mut table.bindings[ty as usize],
                    Binding::Unregistered,
                ),
            }
        };
        match binding {
            Binding::Handler(handler) => {
                // unbounded queue: only fails once shut down
                if self.callback_tx.send_blocking((handler, report)).is_err() {
                    tracing::debug!("callback queue closed; dropping report {:#04X}", ty);
                }
            }
            Binding::AwaitingSync { slot, .. } => {
                if slot.send(report).is_err() {
                    tracing::debug!("rendezvous abandoned; dropping report {:#04X}", ty);
                }
            }
            Binding::Unregistered => {}
        }
    }

    /// Installs a persistent handler for `ty`, replacing any previous
    /// binding.
    pub(crate) fn register_handler(&self, ty: u8, handler: Arc<ReportHandler>) {
        if let Ok(mut table) = self.table.lock() {
            table.bindings[ty as usize] = Binding::Handler(handler);
        }
    }

    /// Clears the binding for `ty`.
    pub(crate) fn unregister(&self, ty: u8) {
        if let Ok(mut table) = self.table.lock() {
            table.bindings[ty as usize] = Binding::Unregistered;
        }
    }

    /// Arms the rendezvous slot for `ty`.
    ///
    /// At most one synchronous wait may be outstanding per report type; a
    /// second one (or one racing a persistent handler) is rejected.
    pub(crate) fn begin_sync_wait(&self, ty: u8) -> Result<(u64, Receiver<Report>), DriverError> {
        let mut table = self.table.lock().map_err(|_| DriverError::EngineStopped)?;
        match table.bindings[ty as usize] {
            Binding::Unregistered => {
                let id = table.next_wait_id;
                table.next_wait_id += 1;
                let (slot, rx) = mpsc::sync_channel(1);
                table.bindings[ty as usize] = Binding::AwaitingSync { id, slot };
                Ok((id, rx))
            }
            _ => Err(DriverError::SyncWaitInProgress(ty)),
        }
    }

    /// Clears a stale sync wait after a timeout.
    ///
    /// Only the wait identified by `id` is cleared, so a rendezvous armed
    /// by another caller in the meantime is left alone.
    pub(crate) fn cancel_sync_wait(&self, ty: u8, id: u64) {
        if let Ok(mut table) = self.table.lock() {
            if matches!(table.bindings[ty as usize], Binding::AwaitingSync { id: armed, .. } if armed == id)
            {
                table.bindings[ty as usize] = Binding::Unregistered;
            }
        }
    }

    /// Fails every outstanding rendezvous and closes the callback queue, so
    /// no parked caller outlives the engine.
    pub(crate) fn shutdown(&self) {
        self.callback_tx.close();
        if let Ok(mut table) = self.table.lock() {
            for binding in &mut table.bindings {
                if matches!(binding, Binding::AwaitingSync { .. }) {
                    // dropping the sender unparks the waiter with an error
                    *binding = Binding::Unregistered;
                }
            }
        }
    }
}
