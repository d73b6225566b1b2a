//! The monitor engine
//!
//! Ties one registry, one enumerator and one notification source together.
//! The source is started on the first successful `start_monitor` and then
//! runs on its own thread for the rest of the engine's life; later monitors
//! share that subscription.

use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::enumerate::{DeviceEnumerator, HidEnumerator};
use crate::error::{MonitorError, RecvError, RecvTimeoutError, TryRecvError};
use crate::registry::{MonitorId, MonitorRegistry};
use crate::source::{platform_source, EventSink, NotificationSource};
use crate::types::{DeviceInfo, HidEvent};

const WATCHER_THREAD_NAME: &str = "hid-hotplug-watcher";

enum Watcher {
    /// Source built but not yet subscribed
    Idle(Box<dyn NotificationSource>),
    Running(JoinHandle<()>),
    /// Spawning the watcher thread failed; every monitor is disconnected
    Failed,
}

pub struct Engine {
    registry: Arc<MonitorRegistry>,
    enumerator: Arc<dyn DeviceEnumerator>,
    watcher: Mutex<Watcher>,
}

impl Engine {
    /// Engine with explicit collaborators
    pub fn new(
        config: &EngineConfig,
        enumerator: Arc<dyn DeviceEnumerator>,
        source: Box<dyn NotificationSource>,
    ) -> Self {
        if let Err(e) = config.validate() {
            warn!("{}, using a capacity of 1", e);
        }
        Self {
            registry: Arc::new(MonitorRegistry::new(config.queue_policy())),
            enumerator,
            watcher: Mutex::new(Watcher::Idle(source)),
        }
    }

    /// Engine on the platform enumerator and the backend named in `config`
    pub fn from_config(config: &EngineConfig) -> Self {
        let enumerator: Arc<dyn DeviceEnumerator> = Arc::new(HidEnumerator::new());
        let source = platform_source(config, Arc::clone(&enumerator));
        Self::new(config, enumerator, source)
    }

    /// Process-wide engine, configured from `HID_MONITOR_CONFIG`
    pub fn global() -> &'static Engine {
        static ENGINE: OnceLock<Engine> = OnceLock::new();
        ENGINE.get_or_init(|| Engine::from_config(&EngineConfig::from_env()))
    }

    /// Best-effort snapshot of attached devices
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.enumerator.list_devices()
    }

    /// Fallible snapshot of attached devices
    pub fn enumerate(&self) -> Result<Vec<DeviceInfo>, MonitorError> {
        self.enumerator.enumerate()
    }

    /// Start the notification source if it has not been started yet
    fn ensure_watching(&self) -> Result<(), MonitorError> {
        let mut watcher = self.watcher.lock();
        let source = match std::mem::replace(&mut *watcher, Watcher::Failed) {
            Watcher::Idle(source) => source,
            other => {
                *watcher = other;
                return Ok(());
            }
        };

        let name = source.name();
        let sink = self.sink();
        let spawned = std::thread::Builder::new()
            .name(WATCHER_THREAD_NAME.into())
            .spawn(move || run_watcher(source, sink));

        match spawned {
            Ok(handle) => {
                info!("Started {} notification source", name);
                *watcher = Watcher::Running(handle);
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn {} thread: {}", WATCHER_THREAD_NAME, e);
                self.registry.disconnect_all();
                Err(MonitorError::Io(e))
            }
        }
    }

    /// Create a monitor; the first call also starts the notification source
    pub fn start_monitor(&self) -> Result<MonitorId, MonitorError> {
        self.ensure_watching()?;
        self.registry.start()
    }

    pub fn stop_monitor(&self, id: MonitorId) -> Result<(), MonitorError> {
        self.registry.stop(id)
    }

    pub fn try_recv(&self, id: MonitorId) -> Result<HidEvent, TryRecvError> {
        self.registry.try_recv(id)
    }

    pub fn recv(&self, id: MonitorId) -> Result<HidEvent, RecvError> {
        self.registry.recv(id)
    }

    pub fn recv_timeout(
        &self,
        id: MonitorId,
        timeout: Duration,
    ) -> Result<HidEvent, RecvTimeoutError> {
        self.registry.recv_timeout(id, timeout)
    }

    /// Sink feeding this engine's registry directly, bypassing the source
    pub fn sink(&self) -> EventSink {
        EventSink::new(Arc::clone(&self.registry))
    }

    /// True once the watcher thread has been started and has not exited
    pub fn is_watching(&self) -> bool {
        match &*self.watcher.lock() {
            Watcher::Running(handle) => !handle.is_finished(),
            _ => false,
        }
    }

    /// True once the notification source has failed permanently
    pub fn is_disconnected(&self) -> bool {
        self.registry.is_disconnected()
    }

    pub fn active_monitors(&self) -> usize {
        self.registry.len()
    }
}

fn run_watcher(source: Box<dyn NotificationSource>, sink: EventSink) {
    let name = source.name();
    match source.run(&sink) {
        Ok(()) => warn!("{} notification source ended", name),
        Err(e) => error!("{} notification source failed: {}", name, e),
    }
    sink.disconnect();
}
