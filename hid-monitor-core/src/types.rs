//! Device descriptors and hotplug events

use std::fmt;

use serde::Serialize;

/// Identity snapshot of one attached HID device
///
/// Descriptors are plain owned data. Every queue that receives an event gets
/// its own deep copy, so no two consumers ever share a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceInfo {
    /// Platform device path (hidraw devnode, IOService path, interface path)
    pub path: Option<String>,
    /// USB/Bluetooth vendor ID, when the platform reports one
    pub vendor_id: Option<u16>,
    /// Product ID, when the platform reports one
    pub product_id: Option<u16>,
}

impl DeviceInfo {
    /// Descriptor with a known path and optional IDs
    pub fn new(path: impl Into<String>, vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        Self {
            path: Some(path.into()),
            vendor_id,
            product_id,
        }
    }

    /// Descriptor with a path and both IDs present
    pub fn with_ids(path: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self::new(path, Some(vendor_id), Some(product_id))
    }

    /// Path as a string slice, empty if absent
    pub fn path_str(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path={}", self.path.as_deref().unwrap_or("<none>"))?;
        match self.vendor_id {
            Some(vid) => write!(f, " vid={vid:04X}")?,
            None => write!(f, " vid=N/A")?,
        }
        match self.product_id {
            Some(pid) => write!(f, " pid={pid:04X}"),
            None => write!(f, " pid=N/A"),
        }
    }
}

/// Direction of a hotplug transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Device was attached
    Arrived,
    /// Device was detached
    Removed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Arrived => "arrived",
            EventKind::Removed => "removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hotplug notification, owning its device descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HidEvent {
    pub kind: EventKind,
    pub device: DeviceInfo,
}

impl HidEvent {
    pub fn arrived(device: DeviceInfo) -> Self {
        Self {
            kind: EventKind::Arrived,
            device,
        }
    }

    pub fn removed(device: DeviceInfo) -> Self {
        Self {
            kind: EventKind::Removed,
            device,
        }
    }
}

impl fmt::Display for HidEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_ids() {
        let dev = DeviceInfo::with_ids("/dev/hidraw3", 0x046D, 0xC52B);
        assert_eq!(dev.to_string(), "path=/dev/hidraw3 vid=046D pid=C52B");
    }

    #[test]
    fn test_display_without_ids() {
        let dev = DeviceInfo::default();
        assert_eq!(dev.to_string(), "path=<none> vid=N/A pid=N/A");
        assert_eq!(dev.path_str(), "");
    }

    #[test]
    fn test_event_json_shape() {
        let event = HidEvent::removed(DeviceInfo::new("/dev/hidraw0", Some(0x3151), None));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "removed");
        assert_eq!(json["device"]["path"], "/dev/hidraw0");
        assert_eq!(json["device"]["vendor_id"], 0x3151);
        assert!(json["device"]["product_id"].is_null());
    }
}
