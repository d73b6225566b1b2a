//! udev hotplug subscription on the `hidraw` subsystem

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_udev::{AsyncMonitorSocket, Device, EventType, MonitorBuilder};
use tracing::{debug, info, warn};

use super::{EventSink, NotificationSource};
use crate::enumerate::DeviceEnumerator;
use crate::error::MonitorError;
use crate::types::{DeviceInfo, HidEvent};

const SUBSYSTEM: &str = "hidraw";

/// Back-off after a failed socket read
const ERROR_SLEEP_MS: u64 = 100;

type Ids = (Option<u16>, Option<u16>);

/// Parse a `HID_ID` property (`BUS:VENDOR:PRODUCT`, hex fields)
pub fn parse_hid_id(value: &str) -> (Option<u16>, Option<u16>) {
    let mut fields = value.trim().split(':').skip(1);
    let mut next = || {
        fields
            .next()
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(|v| u16::try_from(v).ok())
    };
    let vid = next();
    let pid = next();
    (vid, pid)
}

/// VID/PID from the parent `hid` device, if sysfs still has it
fn device_ids(device: &Device) -> Ids {
    match device.parent_with_subsystem("hid") {
        Ok(Some(parent)) => parent
            .property_value("HID_ID")
            .and_then(|v| v.to_str())
            .map(parse_hid_id)
            .unwrap_or((None, None)),
        _ => (None, None),
    }
}

pub struct UdevSource {
    enumerator: Arc<dyn DeviceEnumerator>,
    /// IDs by devnode, so removals can be described after sysfs is gone
    known: HashMap<String, Ids>,
}

impl UdevSource {
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        Self {
            enumerator,
            known: HashMap::new(),
        }
    }

    fn seed(&mut self) {
        match self.enumerator.enumerate() {
            Ok(devices) => {
                for d in devices {
                    if let Some(path) = d.path {
                        self.known.insert(path, (d.vendor_id, d.product_id));
                    }
                }
            }
            Err(e) => debug!("Could not seed udev ID cache: {}", e),
        }
    }

    fn describe(&mut self, event_type: EventType, device: &Device) -> Option<HidEvent> {
        let path = device.devnode().map(|p| p.to_string_lossy().into_owned());
        match event_type {
            EventType::Add => {
                let (vendor_id, product_id) = device_ids(device);
                if let Some(path) = &path {
                    self.known.insert(path.clone(), (vendor_id, product_id));
                }
                Some(HidEvent::arrived(DeviceInfo {
                    path,
                    vendor_id,
                    product_id,
                }))
            }
            EventType::Remove => {
                let cached = path.as_ref().and_then(|p| self.known.remove(p));
                let (vendor_id, product_id) = cached.unwrap_or_else(|| device_ids(device));
                Some(HidEvent::removed(DeviceInfo {
                    path,
                    vendor_id,
                    product_id,
                }))
            }
            _ => None,
        }
    }

    async fn watch(&mut self, sink: &EventSink) -> Result<(), MonitorError> {
        let socket = MonitorBuilder::new()?.match_subsystem(SUBSYSTEM)?.listen()?;
        let mut socket = AsyncMonitorSocket::new(socket)?;

        // Seed after subscribing so no arrival falls in between
        self.seed();
        info!(
            "Watching udev {} events ({} devices present)",
            SUBSYSTEM,
            self.known.len()
        );

        while let Some(item) = socket.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!("udev monitor read error: {}", e);
                    tokio::time::sleep(Duration::from_millis(ERROR_SLEEP_MS)).await;
                    continue;
                }
            };
            let device = event.device();
            if let Some(hid_event) = self.describe(event.event_type(), &device) {
                sink.emit(hid_event);
            }
        }

        Err(MonitorError::Udev("monitor socket closed".into()))
    }
}

impl NotificationSource for UdevSource {
    fn name(&self) -> &'static str {
        "udev"
    }

    fn run(self: Box<Self>, sink: &EventSink) -> Result<(), MonitorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let mut source = *self;
        runtime.block_on(source.watch(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hid_id_usb() {
        assert_eq!(
            parse_hid_id("0003:0000046D:0000C52B"),
            (Some(0x046D), Some(0xC52B))
        );
    }

    #[test]
    fn test_parse_hid_id_bluetooth() {
        assert_eq!(
            parse_hid_id("0005:00003151:00005027\n"),
            (Some(0x3151), Some(0x5027))
        );
    }

    #[test]
    fn test_parse_hid_id_malformed() {
        assert_eq!(parse_hid_id(""), (None, None));
        assert_eq!(parse_hid_id("0003:zzzz"), (None, None));
        assert_eq!(parse_hid_id("0003:0001046D:0000C52B"), (None, Some(0xC52B)));
    }
}
