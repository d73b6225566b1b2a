//! HID hotplug monitor engine
//!
//! Enumerates attached HID devices and lets any number of independent
//! monitors observe arrival/removal events from a single OS subscription:
//!
//! - [`DeviceEnumerator`]: one-shot snapshots (`hidapi`)
//! - [`NotificationSource`]: the process-wide hotplug subscription
//!   (udev on Linux, enumeration polling elsewhere)
//! - [`MonitorRegistry`]: generation-stamped monitor handles, each owning an
//!   [`EventQueue`] that receives a copy of every notification
//! - [`Engine`]: wires the three together and starts the source lazily

pub mod config;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod queue;
pub mod registry;
pub mod source;
pub mod types;

pub use config::{Backend, EngineConfig, OverflowPolicy, CONFIG_ENV};
pub use engine::Engine;
pub use enumerate::{DeviceEnumerator, FixedEnumerator, HidEnumerator};
pub use error::{MonitorError, RecvError, RecvTimeoutError, TryRecvError};
pub use queue::{EventQueue, MonitorState, PushOutcome, QueuePolicy};
pub use registry::{MonitorId, MonitorRegistry, MAX_MONITORS};
pub use source::{
    diff_snapshots, platform_source, scripted, EventSink, NotificationSource, PollingSource,
    ScriptedHandle, ScriptedSource,
};
pub use types::{DeviceInfo, EventKind, HidEvent};
