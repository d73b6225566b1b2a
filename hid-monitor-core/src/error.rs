//! Engine error types

use thiserror::Error;

use crate::registry::MonitorId;

/// Errors from monitor lifecycle, enumeration and notification sources
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor not found: {0}")]
    NotFound(MonitorId),

    #[error("Monitor table exhausted")]
    Exhausted,

    #[error("Notification source disconnected")]
    Disconnected,

    // Platform errors
    #[error("HID error: {0}")]
    Hid(String),

    #[error("udev error: {0}")]
    Udev(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<hidapi::HidError> for MonitorError {
    fn from(e: hidapi::HidError) -> Self {
        MonitorError::Hid(e.to_string())
    }
}

/// Outcome of a non-blocking receive that produced no event
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Monitor is live but has nothing queued
    #[error("no event queued")]
    Empty,

    /// Monitor was stopped, or the notification source failed and the queue is drained
    #[error("monitor disconnected")]
    Disconnected,

    /// Identifier is unknown or already stopped
    #[error("monitor not found")]
    NotFound,
}

/// Outcome of a blocking receive that produced no event
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    #[error("monitor disconnected")]
    Disconnected,

    #[error("monitor not found")]
    NotFound,
}

/// Outcome of a timed receive that produced no event
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    #[error("timed out waiting for an event")]
    Timeout,

    #[error("monitor disconnected")]
    Disconnected,

    #[error("monitor not found")]
    NotFound,
}
