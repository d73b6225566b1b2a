//! C boundary
//!
//! Every exported function runs against the process-wide [`Engine`]. All
//! descriptors handed out are deep copies owned by the caller and must be
//! released with the matching `hid_free_*` call. Releasing twice, or
//! releasing memory this library did not allocate, is undefined.

use std::borrow::Cow;
use std::ffi::{c_char, c_int, c_uint, CStr, CString};
use std::ptr;
use std::time::Duration;

use hid_monitor_core::{
    DeviceInfo, Engine, EventKind, HidEvent, MonitorError, MonitorId, RecvError,
    RecvTimeoutError, TryRecvError,
};
use tracing::warn;

/// An event was written to the out parameter / the monitor was stopped
pub const HID_OK: c_int = 1;
/// Nothing queued (`try_recv`), timed out (`recv_timeout`), unknown id (`stop`)
pub const HID_NONE: c_int = 0;
pub const HID_ERR_INVALID_ARGUMENT: c_int = -1;
pub const HID_ERR_DISCONNECTED: c_int = -2;
pub const HID_ERR_NOT_FOUND: c_int = -3;

/// Device descriptor as seen from C
#[repr(C)]
#[derive(Debug)]
pub struct CDeviceInfo {
    /// NUL-terminated path, or null when the platform reported none
    pub path: *mut c_char,
    pub vid: c_uint,
    pub pid: c_uint,
    pub has_vid: c_int,
    pub has_pid: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CEventType {
    Arrived = 0,
    Removed = 1,
}

#[repr(C)]
#[derive(Debug)]
pub struct CHidEvent {
    pub event_type: CEventType,
    pub device: CDeviceInfo,
}

impl Default for CDeviceInfo {
    fn default() -> Self {
        Self {
            path: ptr::null_mut(),
            vid: 0,
            pid: 0,
            has_vid: 0,
            has_pid: 0,
        }
    }
}

impl Default for CHidEvent {
    fn default() -> Self {
        Self {
            event_type: CEventType::Arrived,
            device: CDeviceInfo::default(),
        }
    }
}

/// Heap copy of `path`, cut at the first interior NUL
fn path_into_raw(path: &str) -> *mut c_char {
    let bytes = path.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    match CString::new(&bytes[..end]) {
        Ok(c) => c.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

impl CDeviceInfo {
    /// Caller-owned copy of `device`
    pub fn from_device(device: &DeviceInfo) -> Self {
        Self {
            path: device
                .path
                .as_deref()
                .map_or(ptr::null_mut(), path_into_raw),
            vid: device.vendor_id.map_or(0, c_uint::from),
            pid: device.product_id.map_or(0, c_uint::from),
            has_vid: c_int::from(device.vendor_id.is_some()),
            has_pid: c_int::from(device.product_id.is_some()),
        }
    }

    /// Release the path and leave the descriptor empty
    ///
    /// # Safety
    /// `path` must be null or come from [`CDeviceInfo::from_device`].
    unsafe fn release_path(&mut self) {
        if !self.path.is_null() {
            drop(CString::from_raw(self.path));
            self.path = ptr::null_mut();
        }
    }
}

impl From<EventKind> for CEventType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Arrived => CEventType::Arrived,
            EventKind::Removed => CEventType::Removed,
        }
    }
}

impl CHidEvent {
    pub fn from_event(event: &HidEvent) -> Self {
        Self {
            event_type: event.kind.into(),
            device: CDeviceInfo::from_device(&event.device),
        }
    }
}

/// Convert a snapshot into one contiguous caller-owned array
///
/// Returns null and 0 for an empty snapshot. The array is released with
/// [`hid_free_device_list`] and the returned count.
pub fn device_list_into_raw(mut devices: Vec<DeviceInfo>) -> (*mut CDeviceInfo, c_uint) {
    if devices.is_empty() {
        return (ptr::null_mut(), 0);
    }
    devices.truncate(c_uint::MAX as usize);
    let list: Box<[CDeviceInfo]> = devices.iter().map(CDeviceInfo::from_device).collect();
    let count = list.len() as c_uint;
    (Box::into_raw(list) as *mut CDeviceInfo, count)
}

/// # Safety
/// `event` must be valid for writes.
unsafe fn write_event(event: *mut CHidEvent, hid_event: &HidEvent) -> c_int {
    ptr::write(event, CHidEvent::from_event(hid_event));
    HID_OK
}

// Engine-parametrized bodies of the exports

unsafe fn list_devices_in(engine: &Engine, count: *mut c_uint) -> *mut CDeviceInfo {
    if count.is_null() {
        return ptr::null_mut();
    }
    let (list, n) = device_list_into_raw(engine.list_devices());
    ptr::write(count, n);
    list
}

fn start_monitor_in(engine: &Engine) -> c_uint {
    match engine.start_monitor() {
        Ok(id) => id.as_raw(),
        Err(e) => {
            warn!("hid_start_monitor failed: {}", e);
            0
        }
    }
}

fn stop_monitor_in(engine: &Engine, monitor_id: c_uint) -> c_int {
    let Some(id) = MonitorId::from_raw(monitor_id) else {
        return HID_NONE;
    };
    match engine.stop_monitor(id) {
        Ok(()) => HID_OK,
        Err(MonitorError::NotFound(_)) => HID_NONE,
        Err(e) => {
            warn!("hid_stop_monitor({}) failed: {}", monitor_id, e);
            HID_ERR_INVALID_ARGUMENT
        }
    }
}

unsafe fn try_recv_in(engine: &Engine, monitor_id: c_uint, event: *mut CHidEvent) -> c_int {
    if event.is_null() {
        return HID_ERR_INVALID_ARGUMENT;
    }
    let Some(id) = MonitorId::from_raw(monitor_id) else {
        return HID_ERR_NOT_FOUND;
    };
    match engine.try_recv(id) {
        Ok(hid_event) => write_event(event, &hid_event),
        Err(TryRecvError::Empty) => HID_NONE,
        Err(TryRecvError::Disconnected) => HID_ERR_DISCONNECTED,
        Err(TryRecvError::NotFound) => HID_ERR_NOT_FOUND,
    }
}

unsafe fn recv_in(engine: &Engine, monitor_id: c_uint, event: *mut CHidEvent) -> c_int {
    if event.is_null() {
        return HID_ERR_INVALID_ARGUMENT;
    }
    let Some(id) = MonitorId::from_raw(monitor_id) else {
        return HID_ERR_NOT_FOUND;
    };
    match engine.recv(id) {
        Ok(hid_event) => write_event(event, &hid_event),
        Err(RecvError::Disconnected) => HID_ERR_DISCONNECTED,
        Err(RecvError::NotFound) => HID_ERR_NOT_FOUND,
    }
}

unsafe fn recv_timeout_in(
    engine: &Engine,
    monitor_id: c_uint,
    event: *mut CHidEvent,
    timeout_ms: c_uint,
) -> c_int {
    if event.is_null() {
        return HID_ERR_INVALID_ARGUMENT;
    }
    let Some(id) = MonitorId::from_raw(monitor_id) else {
        return HID_ERR_NOT_FOUND;
    };
    match engine.recv_timeout(id, Duration::from_millis(u64::from(timeout_ms))) {
        Ok(hid_event) => write_event(event, &hid_event),
        Err(RecvTimeoutError::Timeout) => HID_NONE,
        Err(RecvTimeoutError::Disconnected) => HID_ERR_DISCONNECTED,
        Err(RecvTimeoutError::NotFound) => HID_ERR_NOT_FOUND,
    }
}

/// List attached HID devices
///
/// Writes the element count to `*count` and returns the array, or null when
/// no device is attached. Returns null without touching anything when
/// `count` is null.
///
/// # Safety
/// `count` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn hid_list_devices(count: *mut c_uint) -> *mut CDeviceInfo {
    list_devices_in(Engine::global(), count)
}

/// Start a monitor; returns its non-zero id, or 0 on failure
#[no_mangle]
pub extern "C" fn hid_start_monitor() -> c_uint {
    start_monitor_in(Engine::global())
}

/// Stop a monitor: 1 stopped, 0 not found, -1 error
#[no_mangle]
pub extern "C" fn hid_stop_monitor(monitor_id: c_uint) -> c_int {
    stop_monitor_in(Engine::global(), monitor_id)
}

/// Non-blocking receive
///
/// 1 event written, 0 nothing queued, -1 invalid argument, -2 disconnected,
/// -3 no such monitor.
///
/// # Safety
/// `event` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn hid_try_recv_event(monitor_id: c_uint, event: *mut CHidEvent) -> c_int {
    try_recv_in(Engine::global(), monitor_id, event)
}

/// Blocking receive; same codes as [`hid_try_recv_event`] except 0
///
/// # Safety
/// `event` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn hid_recv_event(monitor_id: c_uint, event: *mut CHidEvent) -> c_int {
    recv_in(Engine::global(), monitor_id, event)
}

/// Receive with a deadline; 0 means the timeout elapsed
///
/// # Safety
/// `event` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn hid_recv_event_timeout(
    monitor_id: c_uint,
    event: *mut CHidEvent,
    timeout_ms: c_uint,
) -> c_int {
    recv_timeout_in(Engine::global(), monitor_id, event, timeout_ms)
}

/// # Safety
/// `ptr` must be null or a path string handed out by this library.
#[no_mangle]
pub unsafe extern "C" fn hid_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Release a descriptor's path; the struct itself stays in caller storage
///
/// # Safety
/// `device` must be null or point to a descriptor filled in by this library.
#[no_mangle]
pub unsafe extern "C" fn hid_free_device_info(device: *mut CDeviceInfo) {
    if let Some(device) = device.as_mut() {
        device.release_path();
    }
}

/// Release the descriptor nested in an event written by a receive call
///
/// # Safety
/// `event` must be null or point to an event filled in by this library.
#[no_mangle]
pub unsafe extern "C" fn hid_free_event(event: *mut CHidEvent) {
    if let Some(event) = event.as_mut() {
        event.device.release_path();
    }
}

/// Release an array from [`hid_list_devices`] and every path in it
///
/// # Safety
/// `devices` and `count` must be exactly what `hid_list_devices` returned.
#[no_mangle]
pub unsafe extern "C" fn hid_free_device_list(devices: *mut CDeviceInfo, count: c_uint) {
    if devices.is_null() {
        return;
    }
    let mut list = Box::from_raw(ptr::slice_from_raw_parts_mut(devices, count as usize));
    for device in list.iter_mut() {
        device.release_path();
    }
    drop(list);
}

/// Install a stderr log subscriber
///
/// `filter` is an `EnvFilter` directive such as `"debug"` or
/// `"hid_monitor_core=trace"`; null means `"info"`. `RUST_LOG` overrides it.
/// Returns 1 when installed, 0 when a subscriber already exists.
///
/// # Safety
/// `filter` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hid_init_logging(filter: *const c_char) -> c_int {
    let directive = if filter.is_null() {
        Cow::Borrowed("info")
    } else {
        CStr::from_ptr(filter).to_string_lossy()
    };
    c_int::from(crate::logging::init(&directive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hid_monitor_core::{scripted, EngineConfig, FixedEnumerator, ScriptedHandle};
    use std::sync::{mpsc, Arc};
    use std::thread;

    fn engine(devices: Vec<DeviceInfo>) -> (Engine, ScriptedHandle) {
        let (source, handle) = scripted();
        let engine = Engine::new(
            &EngineConfig::default(),
            Arc::new(FixedEnumerator::new(devices)),
            Box::new(source),
        );
        (engine, handle)
    }

    fn path_of(device: &CDeviceInfo) -> Option<String> {
        if device.path.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(device.path) }.to_str().unwrap().to_owned())
        }
    }

    #[test]
    fn test_descriptor_conversion() {
        let mut c = CDeviceInfo::from_device(&DeviceInfo::with_ids("/dev/hidraw3", 0x3151, 0x5030));
        assert_eq!(path_of(&c).as_deref(), Some("/dev/hidraw3"));
        assert_eq!((c.vid, c.pid, c.has_vid, c.has_pid), (0x3151, 0x5030, 1, 1));
        unsafe { hid_free_device_info(&mut c) };
        assert!(c.path.is_null());

        let c = CDeviceInfo::from_device(&DeviceInfo::default());
        assert!(c.path.is_null());
        assert_eq!((c.vid, c.pid, c.has_vid, c.has_pid), (0, 0, 0, 0));
    }

    #[test]
    fn test_interior_nul_truncates_path() {
        let mut c = CDeviceInfo::from_device(&DeviceInfo::new("IOService:/a\0b", None, Some(1)));
        assert_eq!(path_of(&c).as_deref(), Some("IOService:/a"));
        assert_eq!((c.has_vid, c.has_pid, c.pid), (0, 1, 1));
        unsafe { hid_free_device_info(&mut c) };
    }

    #[test]
    fn test_list_devices() {
        let (engine, _handle) = engine(vec![
            DeviceInfo::with_ids("/dev/hidraw0", 0x046D, 0xC52B),
            DeviceInfo::new("/dev/hidraw1", None, None),
        ]);
        let mut count = 99;
        let list = unsafe { list_devices_in(&engine, &mut count) };
        assert_eq!(count, 2);
        let devices = unsafe { std::slice::from_raw_parts(list, count as usize) };
        assert_eq!(path_of(&devices[0]).as_deref(), Some("/dev/hidraw0"));
        assert_eq!(devices[0].vid, 0x046D);
        assert_eq!(devices[1].has_vid, 0);
        unsafe { hid_free_device_list(list, count) };
    }

    #[test]
    fn test_list_devices_empty_and_null_count() {
        let (engine, _handle) = engine(Vec::new());
        let mut count = 7;
        assert!(unsafe { list_devices_in(&engine, &mut count) }.is_null());
        assert_eq!(count, 0);
        assert!(unsafe { list_devices_in(&engine, ptr::null_mut()) }.is_null());
    }

    #[test]
    fn test_arrival_scenario() {
        let (engine, _handle) = engine(Vec::new());
        let id = start_monitor_in(&engine);
        assert_ne!(id, 0);

        engine
            .sink()
            .emit(HidEvent::arrived(DeviceInfo::with_ids("/dev/hid0", 0x046D, 0xC52B)));

        let mut event = CHidEvent::default();
        assert_eq!(unsafe { try_recv_in(&engine, id, &mut event) }, HID_OK);
        assert_eq!(event.event_type, CEventType::Arrived);
        assert_eq!(path_of(&event.device).as_deref(), Some("/dev/hid0"));
        assert_eq!((event.device.vid, event.device.pid), (0x046D, 0xC52B));
        unsafe { hid_free_event(&mut event) };
        assert!(event.device.path.is_null());

        assert_eq!(unsafe { try_recv_in(&engine, id, &mut event) }, HID_NONE);
        assert_eq!(stop_monitor_in(&engine, id), HID_OK);
        assert_eq!(unsafe { try_recv_in(&engine, id, &mut event) }, HID_ERR_NOT_FOUND);
        assert_eq!(stop_monitor_in(&engine, id), HID_NONE);
    }

    #[test]
    fn test_removed_event_type() {
        let (engine, _handle) = engine(Vec::new());
        let id = start_monitor_in(&engine);
        engine.sink().emit(HidEvent::removed(DeviceInfo::default()));
        let mut event = CHidEvent::default();
        assert_eq!(
            unsafe { recv_timeout_in(&engine, id, &mut event, 1000) },
            HID_OK
        );
        assert_eq!(event.event_type, CEventType::Removed);
        assert!(event.device.path.is_null());
        assert_eq!(unsafe { recv_timeout_in(&engine, id, &mut event, 10) }, HID_NONE);
    }

    #[test]
    fn test_start_reports_zero_when_table_full() {
        let (engine, _handle) = engine(Vec::new());
        for _ in 0..hid_monitor_core::MAX_MONITORS {
            assert_ne!(start_monitor_in(&engine), 0);
        }
        assert_eq!(engine.active_monitors(), hid_monitor_core::MAX_MONITORS);
        assert_eq!(start_monitor_in(&engine), 0);
        assert_eq!(engine.active_monitors(), hid_monitor_core::MAX_MONITORS);
    }

    #[test]
    fn test_invalid_arguments() {
        let (engine, _handle) = engine(Vec::new());
        let id = start_monitor_in(&engine);
        let mut event = CHidEvent::default();
        unsafe {
            assert_eq!(try_recv_in(&engine, id, ptr::null_mut()), HID_ERR_INVALID_ARGUMENT);
            assert_eq!(recv_in(&engine, id, ptr::null_mut()), HID_ERR_INVALID_ARGUMENT);
            assert_eq!(
                recv_timeout_in(&engine, id, ptr::null_mut(), 0),
                HID_ERR_INVALID_ARGUMENT
            );
            assert_eq!(try_recv_in(&engine, 0, &mut event), HID_ERR_NOT_FOUND);
            assert_eq!(recv_in(&engine, 0, &mut event), HID_ERR_NOT_FOUND);
            assert_eq!(try_recv_in(&engine, id ^ 0x0001_0000, &mut event), HID_ERR_NOT_FOUND);
        }
        assert_eq!(stop_monitor_in(&engine, 0), HID_NONE);
    }

    #[test]
    fn test_blocking_recv_unblocked_by_stop() {
        let (engine, _handle) = engine(Vec::new());
        let engine = Arc::new(engine);
        let id = start_monitor_in(&engine);

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut event = CHidEvent::default();
                let _ = tx.send(unsafe { recv_in(&engine, id, &mut event) });
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(stop_monitor_in(&engine, id), HID_OK);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            HID_ERR_DISCONNECTED
        );
        waiter.join().unwrap();
    }

    #[test]
    fn test_source_loss_reported_as_disconnected() {
        let (engine, handle) = engine(Vec::new());
        let id = start_monitor_in(&engine);
        drop(handle);

        let mut event = CHidEvent::default();
        let code = unsafe { recv_timeout_in(&engine, id, &mut event, 2000) };
        assert_eq!(code, HID_ERR_DISCONNECTED);
        assert_eq!(unsafe { try_recv_in(&engine, id, &mut event) }, HID_ERR_DISCONNECTED);
    }
}
