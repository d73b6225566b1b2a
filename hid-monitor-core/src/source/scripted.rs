//! Scripted source fed from a channel
//!
//! Used by tests and by hosts that learn about hotplug from somewhere else.
//! Dropping every [`ScriptedHandle`] ends the subscription, which the engine
//! reports to monitors as a disconnect.

use tokio::sync::mpsc;
use tracing::debug;

use super::{EventSink, NotificationSource};
use crate::error::MonitorError;
use crate::types::{DeviceInfo, HidEvent};

pub struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<HidEvent>,
}

/// Producer side of a [`ScriptedSource`]
#[derive(Clone)]
pub struct ScriptedHandle {
    tx: mpsc::UnboundedSender<HidEvent>,
}

/// Create a connected source/handle pair
pub fn scripted() -> (ScriptedSource, ScriptedHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ScriptedSource { rx }, ScriptedHandle { tx })
}

impl ScriptedHandle {
    /// Queue a notification; false once the source has gone away
    pub fn emit(&self, event: HidEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn arrive(&self, device: DeviceInfo) -> bool {
        self.emit(HidEvent::arrived(device))
    }

    pub fn remove(&self, device: DeviceInfo) -> bool {
        self.emit(HidEvent::removed(device))
    }
}

impl NotificationSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn run(mut self: Box<Self>, sink: &EventSink) -> Result<(), MonitorError> {
        while let Some(event) = self.rx.blocking_recv() {
            sink.emit(event);
        }
        debug!("All scripted handles dropped");
        Err(MonitorError::Disconnected)
    }
}
