//! The background engine turning link bytes into dispatched reports.
//!
//! Three always-running threads: the receiver drains the link into an
//! ordered chunk queue, the decode thread frames buffered bytes into
//! reports and routes them, and the worker invokes asynchronous handlers in
//! routing order. One shared run flag stops all of them cooperatively; a
//! fatal condition (transport or protocol failure) clears it, closes both
//! queues and fails every parked rendezvous.

mod dispatcher;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

use async_channel::{Receiver, Sender};
use rp2daq_core::{
    link::{Link, LinkError},
    sleep::Sleep,
};
use rp2daq_driver::protocol::{decode_next, Report};

pub(crate) use dispatcher::{Dispatcher, ReportHandler};

/// Handle to the three background threads of an open device.
pub struct Engine {
    run: Arc<AtomicBool>,
    dispatcher: Arc<Dispatcher>,
    rx_guard: Option<RxThreadGuard>,
    decode_guard: Option<DecodeThreadGuard>,
    worker_guard: Option<WorkerThreadGuard>,
}

impl Engine {
    pub(crate) fn start<L: Link + 'static>(
        link: Arc<Mutex<L>>,
        sleeper: impl Sleep + 'static,
        poll_interval: Duration,
    ) -> Self {
        let run = Arc::new(AtomicBool::new(true));
        let (chunk_tx, chunk_rx) = async_channel::unbounded();
        let (callback_tx, callback_rx) = async_channel::unbounded();
        let dispatcher = Arc::new(Dispatcher::new(callback_tx));

        tracing::info!("Starting engine with poll interval {:?}.", poll_interval);
        Self {
            rx_guard: Some(RxThreadGuard::new(
                run.clone(),
                dispatcher.clone(),
                link,
                sleeper,
                poll_interval,
                chunk_tx,
            )),
            decode_guard: Some(DecodeThreadGuard::new(
                run.clone(),
                dispatcher.clone(),
                chunk_rx,
            )),
            worker_guard: Some(WorkerThreadGuard::new(callback_rx)),
            run,
            dispatcher,
        }
    }

    /// Whether the background threads are still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stops the background threads and joins them. Idempotent.
    pub(crate) fn stop(&mut self) {
        self.run.store(false, Ordering::Release);
        self.dispatcher.shutdown();
        let _ = self.rx_guard.take();
        let _ = self.decode_guard.take();
        let _ = self.worker_guard.take();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RxThreadGuard {
    handle: Option<JoinHandle<()>>,
}

impl RxThreadGuard {
    fn new<L: Link + 'static>(
        run: Arc<AtomicBool>,
        dispatcher: Arc<Dispatcher>,
        link: Arc<Mutex<L>>,
        sleeper: impl Sleep + 'static,
        poll_interval: Duration,
        chunk_tx: Sender<Vec<u8>>,
    ) -> Self {
        Self {
            handle: Some(std::thread::spawn(move || {
                if let Err(e) = Self::pump(&run, &link, &sleeper, poll_interval, &chunk_tx) {
                    tracing::error!("Transport failure, stopping the engine: {}", e);
                    run.store(false, Ordering::Release);
                    dispatcher.shutdown();
                }
                // closing the queue lets the decode thread drain and exit
                chunk_tx.close();
                tracing::debug!("Receiver thread stopped.");
            })),
        }
    }

    fn pump<L: Link>(
        run: &AtomicBool,
        link: &Mutex<L>,
        sleeper: &impl Sleep,
        poll_interval: Duration,
        chunk_tx: &Sender<Vec<u8>>,
    ) -> Result<(), LinkError> {
        while run.load(Ordering::Acquire) {
            let chunk = {
                let mut link = link.lock().map_err(|_| LinkError::new("link poisoned"))?;
                match link.bytes_to_read()? {
                    0 => None,
                    n => {
                        let mut chunk = vec![0; n];
                        link.read_exact(&mut chunk)?;
                        Some(chunk)
                    }
                }
            };
            match chunk {
                // unbounded queue: send never blocks, fails only when closed
                Some(chunk) => {
                    if chunk_tx.send_blocking(chunk).is_err() {
                        break;
                    }
                }
                None => sleeper.sleep(poll_interval),
            }
        }
        Ok(())
    }
}

impl Drop for RxThreadGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct DecodeThreadGuard {
    handle: Option<JoinHandle<()>>,
}

impl DecodeThreadGuard {
    fn new(run: Arc<AtomicBool>, dispatcher: Arc<Dispatcher>, chunk_rx: Receiver<Vec<u8>>) -> Self {
        Self {
            handle: Some(std::thread::spawn(move || {
                Self::decode(&run, &dispatcher, &chunk_rx);
                tracing::debug!("Decode thread stopped.");
            })),
        }
    }

    fn decode(run: &AtomicBool, dispatcher: &Dispatcher, chunk_rx: &Receiver<Vec<u8>>) {
        let mut buf = VecDeque::new();
        while let Ok(chunk) = chunk_rx.recv_blocking() {
            buf.extend(chunk);
            loop {
                match decode_next(&mut buf) {
                    Ok(Some(report)) => dispatcher.route(report),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Protocol failure, stopping the engine: {}", e);
                        run.store(false, Ordering::Release);
                        dispatcher.shutdown();
                        return;
                    }
                }
            }
        }
        if !buf.is_empty() {
            tracing::debug!("Discarding {} residual bytes.", buf.len());
        }
    }
}

impl Drop for DecodeThreadGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct WorkerThreadGuard {
    handle: Option<JoinHandle<()>>,
}

impl WorkerThreadGuard {
    fn new(callback_rx: Receiver<(Arc<ReportHandler>, Report)>) -> Self {
        Self {
            handle: Some(std::thread::spawn(move || {
                // global FIFO across all report types; a slow handler delays
                // everything queued behind it
                while let Ok((handler, report)) = callback_rx.recv_blocking() {
                    handler(report);
                }
                tracing::debug!("Worker thread stopped.");
            })),
        }
    }
}

impl Drop for WorkerThreadGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
