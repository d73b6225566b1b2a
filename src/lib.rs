// HID hotplug monitor - shared library
// C boundary over the monitor engine, plus logging setup

pub mod cli;
pub mod ffi;
pub mod logging;

pub use hid_monitor_core::{
    Backend, DeviceInfo, Engine, EngineConfig, EventKind, HidEvent, MonitorError, MonitorId,
    RecvError, RecvTimeoutError, TryRecvError,
};
