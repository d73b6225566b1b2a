//! Polling fallback: diff successive enumeration snapshots

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{EventSink, NotificationSource};
use crate::enumerate::DeviceEnumerator;
use crate::error::MonitorError;
use crate::types::{DeviceInfo, HidEvent};

/// Devices keyed by path; devices without a path cannot be tracked
type Snapshot = HashMap<String, DeviceInfo>;

fn snapshot(devices: Vec<DeviceInfo>) -> Snapshot {
    devices
        .into_iter()
        .filter_map(|d| d.path.clone().map(|path| (path, d)))
        .collect()
}

/// Compare two snapshots, returning the transitions and the new snapshot
///
/// Removals come first, then arrivals, each sorted by path so the output is
/// deterministic. A path whose descriptor changed between snapshots was
/// reused by another device and yields both a removal and an arrival.
pub fn diff_snapshots(
    previous: &HashMap<String, DeviceInfo>,
    current: Vec<DeviceInfo>,
) -> (Vec<HidEvent>, HashMap<String, DeviceInfo>) {
    let current = snapshot(current);

    let mut removed: Vec<&DeviceInfo> = previous
        .iter()
        .filter(|(path, d)| current.get(*path) != Some(*d))
        .map(|(_, d)| d)
        .collect();
    removed.sort_by(|a, b| a.path.cmp(&b.path));

    let mut arrived: Vec<&DeviceInfo> = current
        .iter()
        .filter(|(path, d)| previous.get(*path) != Some(*d))
        .map(|(_, d)| d)
        .collect();
    arrived.sort_by(|a, b| a.path.cmp(&b.path));

    let events = removed
        .into_iter()
        .map(|d| HidEvent::removed(d.clone()))
        .chain(arrived.into_iter().map(|d| HidEvent::arrived(d.clone())))
        .collect();

    (events, current)
}

/// Source that re-enumerates on a fixed interval
pub struct PollingSource {
    enumerator: Arc<dyn DeviceEnumerator>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl PollingSource {
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>, interval: Duration) -> Self {
        Self {
            enumerator,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the polling loop when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}

impl NotificationSource for PollingSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn run(self: Box<Self>, sink: &EventSink) -> Result<(), MonitorError> {
        // Without a baseline every device would look new, so this is fatal
        let mut known = snapshot(self.enumerator.enumerate()?);
        info!(
            "Polling {} HID devices every {:?}",
            known.len(),
            self.interval
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(self.interval);
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let devices = match self.enumerator.enumerate() {
                Ok(devices) => devices,
                Err(e) => {
                    // Skip this tick; a transient failure must not look like mass removal
                    warn!("Poll enumeration failed: {}", e);
                    continue;
                }
            };

            let (events, next) = diff_snapshots(&known, devices);
            known = next;
            if !events.is_empty() {
                debug!("Poll found {} transitions", events.len());
            }
            for event in events {
                sink.emit(event);
            }
        }

        debug!("Polling source exiting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MonitorRegistry;
    use crate::types::EventKind;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn dev(path: &str, pid: u16) -> DeviceInfo {
        DeviceInfo::with_ids(path, 0x046D, pid)
    }

    #[test]
    fn test_diff_arrival_and_removal() {
        let (events, known) = diff_snapshots(&HashMap::new(), vec![dev("/dev/hidraw0", 1)]);
        assert_eq!(events, vec![HidEvent::arrived(dev("/dev/hidraw0", 1))]);

        let (events, known) = diff_snapshots(&known, vec![dev("/dev/hidraw1", 2)]);
        assert_eq!(
            events,
            vec![
                HidEvent::removed(dev("/dev/hidraw0", 1)),
                HidEvent::arrived(dev("/dev/hidraw1", 2)),
            ]
        );
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn test_diff_path_reused_by_other_device() {
        let old = DeviceInfo::with_ids("/dev/hidraw0", 0x046D, 0xC52B);
        let new = DeviceInfo::with_ids("/dev/hidraw0", 0x3151, 0x5030);
        let (_, known) = diff_snapshots(&HashMap::new(), vec![old.clone()]);

        let (events, known) = diff_snapshots(&known, vec![new.clone()]);
        assert_eq!(
            events,
            vec![HidEvent::removed(old), HidEvent::arrived(new.clone())]
        );
        assert_eq!(known.get("/dev/hidraw0"), Some(&new));
    }

    #[test]
    fn test_diff_unchanged_is_quiet() {
        let devices = vec![dev("/dev/hidraw0", 1), dev("/dev/hidraw1", 2)];
        let (_, known) = diff_snapshots(&HashMap::new(), devices.clone());
        let (events, _) = diff_snapshots(&known, devices);
        assert!(events.is_empty());
    }

    #[test]
    fn test_diff_ignores_pathless_devices() {
        let (events, known) = diff_snapshots(&HashMap::new(), vec![DeviceInfo::default()]);
        assert!(events.is_empty());
        assert!(known.is_empty());
    }

    /// Enumerator replaying scripted snapshots, then stopping the source
    struct Script {
        steps: Mutex<VecDeque<Result<Vec<DeviceInfo>, MonitorError>>>,
        shutdown: Mutex<Option<Arc<AtomicBool>>>,
    }

    impl DeviceEnumerator for Script {
        fn enumerate(&self) -> Result<Vec<DeviceInfo>, MonitorError> {
            let mut steps = self.steps.lock();
            let step = steps.pop_front().unwrap_or_else(|| Ok(Vec::new()));
            if steps.is_empty() {
                if let Some(flag) = self.shutdown.lock().as_ref() {
                    flag.store(true, Ordering::Relaxed);
                }
            }
            step
        }
    }

    #[test]
    fn test_run_emits_transitions_and_skips_failed_tick() {
        let script = Arc::new(Script {
            steps: Mutex::new(VecDeque::from(vec![
                Ok(vec![dev("/dev/hidraw0", 1)]),
                Err(MonitorError::Hid("busy".into())),
                Ok(vec![dev("/dev/hidraw0", 1), dev("/dev/hidraw1", 2)]),
                Ok(vec![dev("/dev/hidraw1", 2)]),
            ])),
            shutdown: Mutex::new(None),
        });
        let source = PollingSource::new(script.clone(), Duration::from_millis(1));
        *script.shutdown.lock() = Some(source.shutdown_handle());

        let registry = Arc::new(MonitorRegistry::default());
        let id = registry.start().unwrap();
        Box::new(source).run(&EventSink::new(Arc::clone(&registry))).unwrap();

        let first = registry.try_recv(id).unwrap();
        assert_eq!(first.kind, EventKind::Arrived);
        assert_eq!(first.device, dev("/dev/hidraw1", 2));
        let second = registry.try_recv(id).unwrap();
        assert_eq!(second.kind, EventKind::Removed);
        assert_eq!(second.device, dev("/dev/hidraw0", 1));
        assert!(registry.try_recv(id).is_err());
    }

    #[test]
    fn test_run_fails_without_baseline() {
        let script = Arc::new(Script {
            steps: Mutex::new(VecDeque::from(vec![Err(MonitorError::Hid(
                "no backend".into(),
            ))])),
            shutdown: Mutex::new(None),
        });
        let source = Box::new(PollingSource::new(script, Duration::from_millis(1)));
        let registry = Arc::new(MonitorRegistry::default());
        assert!(source.run(&EventSink::new(registry)).is_err());
    }
}
