//! Notification sources
//!
//! A source owns the single OS hotplug subscription of the process. It runs
//! on the watcher thread and pushes every transition into an [`EventSink`],
//! which fans it out to the registry. Whenever `run` returns the subscription
//! is considered permanently gone.

mod poll;
mod scripted;
#[cfg(all(target_os = "linux", feature = "hotplug"))]
mod udev;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{Backend, EngineConfig};
use crate::enumerate::DeviceEnumerator;
use crate::error::MonitorError;
use crate::registry::MonitorRegistry;
use crate::types::HidEvent;

pub use poll::{diff_snapshots, PollingSource};
pub use scripted::{scripted, ScriptedHandle, ScriptedSource};
#[cfg(all(target_os = "linux", feature = "hotplug"))]
pub use udev::{parse_hid_id, UdevSource};

/// Background hotplug subscription
pub trait NotificationSource: Send + 'static {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Run the subscription on the calling thread until it ends
    fn run(self: Box<Self>, sink: &EventSink) -> Result<(), MonitorError>;
}

/// Entry point from a source into the registry
#[derive(Clone)]
pub struct EventSink {
    registry: Arc<MonitorRegistry>,
}

impl EventSink {
    pub fn new(registry: Arc<MonitorRegistry>) -> Self {
        Self { registry }
    }

    /// Fan one notification out to every live monitor
    pub fn emit(&self, event: HidEvent) -> usize {
        let delivered = self.registry.dispatch(&event);
        debug!("{} -> {} monitors", event, delivered);
        delivered
    }

    pub(crate) fn disconnect(&self) {
        self.registry.disconnect_all();
    }
}

/// True when this build can subscribe to udev
pub fn udev_available() -> bool {
    cfg!(all(target_os = "linux", feature = "hotplug"))
}

/// Build the source selected by `config`
pub fn platform_source(
    config: &EngineConfig,
    enumerator: Arc<dyn DeviceEnumerator>,
) -> Box<dyn NotificationSource> {
    let use_udev = match config.backend {
        Backend::Auto => udev_available(),
        Backend::Udev if !udev_available() => {
            warn!("udev backend not available in this build, polling instead");
            false
        }
        Backend::Udev => true,
        Backend::Poll => false,
    };

    if use_udev {
        udev_source(enumerator)
    } else {
        Box::new(PollingSource::new(enumerator, config.poll_interval()))
    }
}

#[cfg(all(target_os = "linux", feature = "hotplug"))]
fn udev_source(enumerator: Arc<dyn DeviceEnumerator>) -> Box<dyn NotificationSource> {
    Box::new(UdevSource::new(enumerator))
}

#[cfg(not(all(target_os = "linux", feature = "hotplug")))]
fn udev_source(enumerator: Arc<dyn DeviceEnumerator>) -> Box<dyn NotificationSource> {
    Box::new(PollingSource::new(
        enumerator,
        EngineConfig::default().poll_interval(),
    ))
}
