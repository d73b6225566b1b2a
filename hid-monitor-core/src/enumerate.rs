//! One-shot device enumeration

use hidapi::HidApi;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::types::DeviceInfo;

/// Source of current device snapshots
pub trait DeviceEnumerator: Send + Sync {
    /// Query the platform for attached devices
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, MonitorError>;

    /// Best-effort snapshot: a failed query is reported as no devices
    fn list_devices(&self) -> Vec<DeviceInfo> {
        match self.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Enumerator over `hidapi`
///
/// The `HidApi` context is created on first use and its device list refreshed
/// on every call after that.
#[derive(Default)]
pub struct HidEnumerator {
    api: Mutex<Option<HidApi>>,
}

impl HidEnumerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceEnumerator for HidEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, MonitorError> {
        let mut guard = self.api.lock();
        // A context whose refresh failed is dropped and recreated next time
        let api = match guard.take() {
            Some(mut api) => {
                api.refresh_devices()?;
                api
            }
            None => HidApi::new()?,
        };
        let api = guard.insert(api);

        let devices: Vec<DeviceInfo> = api
            .device_list()
            .map(|d| DeviceInfo {
                path: Some(d.path().to_string_lossy().into_owned()).filter(|p| !p.is_empty()),
                vendor_id: Some(d.vendor_id()),
                product_id: Some(d.product_id()),
            })
            .collect();

        debug!("Found {} HID devices", devices.len());
        Ok(devices)
    }
}

/// Enumerator returning a fixed list; for tests and for hosts that track
/// devices themselves
#[derive(Debug, Clone, Default)]
pub struct FixedEnumerator {
    devices: Vec<DeviceInfo>,
}

impl FixedEnumerator {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }
}

impl DeviceEnumerator for FixedEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, MonitorError> {
        Ok(self.devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl DeviceEnumerator for Broken {
        fn enumerate(&self) -> Result<Vec<DeviceInfo>, MonitorError> {
            Err(MonitorError::Hid("backend unavailable".into()))
        }
    }

    #[test]
    fn test_failure_is_empty_list() {
        assert!(Broken.list_devices().is_empty());
    }

    #[test]
    fn test_no_devices_is_empty_list() {
        assert!(FixedEnumerator::default().list_devices().is_empty());
    }

    #[test]
    fn test_fixed_returns_copies() {
        let dev = DeviceInfo::with_ids("/dev/hidraw0", 0x046D, 0xC52B);
        let enumerator = FixedEnumerator::new(vec![dev.clone()]);
        assert_eq!(enumerator.list_devices(), vec![dev.clone()]);
        assert_eq!(enumerator.list_devices(), vec![dev]);
    }

    #[test]
    #[ignore] // requires hidapi backend access
    fn test_hidapi_enumeration() {
        let enumerator = HidEnumerator::new();
        let first = enumerator.enumerate().unwrap();
        let second = enumerator.enumerate().unwrap();
        assert!(first.iter().all(|d| d.vendor_id.is_some()));
        println!("{} / {} devices", first.len(), second.len());
    }
}
