//! Background reachability check for trackers with a slow first contact.
//!
//! The worker owns a private probe and retries the handshake until it succeeds or is
//! told to stop. Its only output is the `online` flag; the real connection is opened
//! afterwards on the frame loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::Probe;

pub type ProbeFactory = Arc<dyn Fn() -> Box<dyn Probe> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Upper bound for one handshake attempt. Also bounds how long `stop` can block.
    pub attempt_timeout_ms: u64,
    /// Pause between failed attempts.
    pub retry_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 1000,
            retry_interval_ms: 20,
        }
    }
}

pub struct ConnectionWatchdog {
    factory: ProbeFactory,
    config: WatchdogConfig,
    running: Arc<AtomicBool>,
    online: Arc<AtomicBool>,
    attempts: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl ConnectionWatchdog {
    pub fn new(factory: ProbeFactory, config: WatchdogConfig) -> Self {
        Self {
            factory,
            config,
            running: Arc::new(AtomicBool::new(false)),
            online: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Spawns the worker. A no-op while a worker exists, even one that has already
    /// reported online; call [`stop`](Self::stop) first to respawn.
    pub fn start(&mut self, address: &str) {
        if self.handle.is_some() {
            debug!("watchdog already started for {}", address);
            return;
        }
        info!("watchdog started for {}", address);
        self.online.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let address = address.to_string();
        let factory = Arc::clone(&self.factory);
        let running = Arc::clone(&self.running);
        let online = Arc::clone(&self.online);
        let attempts = Arc::clone(&self.attempts);
        let timeout = Duration::from_millis(self.config.attempt_timeout_ms);
        let retry = Duration::from_millis(self.config.retry_interval_ms);

        let spawned = thread::Builder::new()
            .name("gazex-watchdog".to_string())
            .spawn(move || {
                let mut probe = factory();
                while running.load(Ordering::SeqCst) {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if let Err(e) = probe.open(&address, timeout) {
                        debug!("handshake with {} failed: {}", address, e);
                    }
                    if probe.is_connected() {
                        online.store(true, Ordering::SeqCst);
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    if !retry.is_zero() {
                        thread::sleep(retry);
                    }
                }
            });

        match spawned {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                warn!("could not spawn watchdog thread: {}", e);
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Requests termination and waits for the worker to exit. The online flag is left
    /// as the worker set it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("watchdog thread panicked");
            }
            info!("watchdog stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Handshake attempts made since construction.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn has_worker(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for ConnectionWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
