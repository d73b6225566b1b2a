//! Monitor registry
//!
//! A generation-stamped arena of event queues. Identifiers handed out are
//! `(generation << 16) | (slot + 1)`: lookups are an index plus a generation
//! compare, never a pointer dereference. When a monitor stops its slot's
//! generation is bumped before the slot is reused, and a slot whose
//! generation is exhausted is retired for good, so an identifier is never
//! issued twice within a process.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{MonitorError, RecvError, RecvTimeoutError, TryRecvError};
use crate::queue::{EventQueue, PushOutcome, QueuePolicy};
use crate::types::HidEvent;

const INDEX_BITS: u32 = 16;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Maximum number of simultaneously live monitors
pub const MAX_MONITORS: usize = INDEX_MASK as usize;

/// Opaque, non-zero monitor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(NonZeroU32);

impl MonitorId {
    fn new(index: usize, generation: u16) -> Self {
        let raw = (u32::from(generation) << INDEX_BITS) | (index as u32 + 1);
        // index + 1 keeps the low half non-zero
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    /// Interpret a raw boundary value; zero is never a valid id
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn as_raw(self) -> u32 {
        self.0.get()
    }

    fn index(self) -> Option<usize> {
        match self.as_raw() & INDEX_MASK {
            0 => None,
            low => Some(low as usize - 1),
        }
    }

    fn generation(self) -> u16 {
        (self.as_raw() >> INDEX_BITS) as u16
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

struct Slot {
    generation: u16,
    queue: Option<Arc<EventQueue>>,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<usize>,
    /// Set once the notification source has failed; new queues start disconnected
    disconnected: bool,
}

impl Slots {
    fn live(&self, id: MonitorId) -> Option<&Arc<EventQueue>> {
        let slot = self.entries.get(id.index()?)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.queue.as_ref()
    }
}

/// Registry of live monitors and their queues
pub struct MonitorRegistry {
    slots: Mutex<Slots>,
    policy: QueuePolicy,
}

impl MonitorRegistry {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            policy,
        }
    }

    /// Register a new monitor with an empty queue
    pub fn start(&self) -> Result<MonitorId, MonitorError> {
        let mut slots = self.slots.lock();

        let queue = Arc::new(EventQueue::new(self.policy));
        if slots.disconnected {
            queue.disconnect();
        }

        let index = match slots.free.pop() {
            Some(index) => index,
            None if slots.entries.len() < MAX_MONITORS => {
                slots.entries.push(Slot {
                    generation: 0,
                    queue: None,
                });
                slots.entries.len() - 1
            }
            None => return Err(MonitorError::Exhausted),
        };

        let slot = &mut slots.entries[index];
        slot.queue = Some(queue);
        let id = MonitorId::new(index, slot.generation);
        drop(slots);

        info!("Monitor {} started", id);
        Ok(id)
    }

    /// Stop a monitor, waking any blocked receiver
    pub fn stop(&self, id: MonitorId) -> Result<(), MonitorError> {
        let queue = {
            let mut slots = self.slots.lock();
            let index = id.index().ok_or(MonitorError::NotFound(id))?;
            let slot = slots
                .entries
                .get_mut(index)
                .filter(|slot| slot.generation == id.generation())
                .ok_or(MonitorError::NotFound(id))?;
            let queue = slot.queue.take().ok_or(MonitorError::NotFound(id))?;
            queue.begin_stop();

            match slot.generation.checked_add(1) {
                Some(next) => {
                    slot.generation = next;
                    slots.free.push(index);
                }
                None => debug!("Retiring monitor slot {}", index),
            }
            queue
        };

        let discarded = queue.close();
        info!("Monitor {} stopped ({} undelivered events dropped)", id, discarded);
        Ok(())
    }

    /// Look up the queue of a live monitor
    pub fn queue(&self, id: MonitorId) -> Option<Arc<EventQueue>> {
        self.slots.lock().live(id).cloned()
    }

    pub fn contains(&self, id: MonitorId) -> bool {
        self.slots.lock().live(id).is_some()
    }

    pub fn try_recv(&self, id: MonitorId) -> Result<HidEvent, TryRecvError> {
        self.queue(id).ok_or(TryRecvError::NotFound)?.try_pop()
    }

    /// Blocking receive; the registry lock is not held while waiting
    pub fn recv(&self, id: MonitorId) -> Result<HidEvent, RecvError> {
        self.queue(id).ok_or(RecvError::NotFound)?.pop()
    }

    pub fn recv_timeout(
        &self,
        id: MonitorId,
        timeout: Duration,
    ) -> Result<HidEvent, RecvTimeoutError> {
        self.queue(id)
            .ok_or(RecvTimeoutError::NotFound)?
            .pop_timeout(timeout)
    }

    /// Fan an event out to every live monitor
    ///
    /// Recipients are snapshotted under the lock; pushes happen after it is
    /// released. A queue stopped in between refuses the push and is skipped.
    /// Returns the number of queues that accepted the event.
    pub fn dispatch(&self, event: &HidEvent) -> usize {
        let recipients: Vec<Arc<EventQueue>> = self
            .slots
            .lock()
            .entries
            .iter()
            .filter_map(|slot| slot.queue.clone())
            .collect();

        let mut delivered = 0;
        for queue in recipients {
            match queue.push(event.clone()) {
                outcome if outcome.is_delivered() => {
                    if outcome == PushOutcome::DroppedOldest {
                        debug!("Queue full, dropped oldest event");
                    }
                    delivered += 1;
                }
                PushOutcome::Rejected => debug!("Queue full, rejected {}", event),
                _ => {}
            }
        }
        delivered
    }

    /// Degrade every current and future monitor to disconnected
    pub fn disconnect_all(&self) {
        let queues: Vec<Arc<EventQueue>> = {
            let mut slots = self.slots.lock();
            slots.disconnected = true;
            slots
                .entries
                .iter()
                .filter_map(|slot| slot.queue.clone())
                .collect()
        };
        for queue in &queues {
            queue.disconnect();
        }
        info!("Notification source lost, {} monitors disconnected", queues.len());
    }

    pub fn is_disconnected(&self) -> bool {
        self.slots.lock().disconnected
    }

    /// Number of live monitors
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .entries
            .iter()
            .filter(|slot| slot.queue.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new(QueuePolicy::Unbounded)
    }
}
