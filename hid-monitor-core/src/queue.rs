//! Per-monitor event queue
//!
//! Each monitor owns one queue. The watcher pushes into it, the consumer pops
//! from it either without blocking or by parking on the condition variable.
//! Closing the queue (monitor stopped) and disconnecting it (notification
//! source failed) both wake every parked consumer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::OverflowPolicy;
use crate::error::{RecvError, RecvTimeoutError, TryRecvError};
use crate::types::HidEvent;

/// Capacity policy applied to every queue of a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Grow without limit; the consumer is responsible for draining
    #[default]
    Unbounded,
    /// Hold at most `capacity` events
    Bounded {
        capacity: usize,
        overflow: OverflowPolicy,
    },
}

/// Liveness of the monitor owning a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Accepting fan-out
    Active,
    /// Stop requested, no new events accepted
    Stopping,
    /// Drained and released
    Stopped,
}

/// Result of offering one event to a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after discarding the oldest event
    DroppedOldest,
    /// Queue full under `RejectNew`
    Rejected,
    /// Queue no longer accepts events
    Closed,
}

impl PushOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PushOutcome::Queued | PushOutcome::DroppedOldest)
    }
}

struct QueueInner {
    events: VecDeque<HidEvent>,
    state: MonitorState,
    /// Notification source failed permanently
    disconnected: bool,
    /// Events discarded by the overflow policy
    dropped: u64,
}

impl QueueInner {
    fn is_closed(&self) -> bool {
        self.state != MonitorState::Active || self.disconnected
    }
}

pub struct EventQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    policy: QueuePolicy,
}

impl EventQueue {
    /// New active queue; a bounded capacity below 1 is raised to 1
    pub fn new(policy: QueuePolicy) -> Self {
        let policy = match policy {
            QueuePolicy::Bounded { capacity, overflow } => QueuePolicy::Bounded {
                capacity: capacity.max(1),
                overflow,
            },
            unbounded => unbounded,
        };
        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::new(),
                state: MonitorState::Active,
                disconnected: false,
                dropped: 0,
            }),
            ready: Condvar::new(),
            policy,
        }
    }

    /// Append an event, applying the overflow policy
    pub fn push(&self, event: HidEvent) -> PushOutcome {
        let mut inner = self.inner.lock();
        if inner.is_closed() {
            return PushOutcome::Closed;
        }

        let outcome = match self.policy {
            QueuePolicy::Bounded { capacity, overflow } if inner.events.len() >= capacity => {
                inner.dropped += 1;
                match overflow {
                    OverflowPolicy::DropOldest => {
                        inner.events.pop_front();
                        PushOutcome::DroppedOldest
                    }
                    OverflowPolicy::RejectNew => return PushOutcome::Rejected,
                }
            }
            _ => PushOutcome::Queued,
        };

        inner.events.push_back(event);
        drop(inner);
        self.ready.notify_one();
        outcome
    }

    /// Pop the head event without blocking
    ///
    /// Events queued before a source failure are still returned; the
    /// disconnect is only reported once the queue is empty.
    pub fn try_pop(&self) -> Result<HidEvent, TryRecvError> {
        let mut inner = self.inner.lock();
        if let Some(event) = inner.events.pop_front() {
            return Ok(event);
        }
        if inner.is_closed() {
            Err(TryRecvError::Disconnected)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Block until an event is available or the queue closes
    pub fn pop(&self) -> Result<HidEvent, RecvError> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.events.pop_front() {
                return Ok(event);
            }
            if inner.is_closed() {
                return Err(RecvError::Disconnected);
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Block for at most `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Result<HidEvent, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.events.pop_front() {
                return Ok(event);
            }
            if inner.is_closed() {
                return Err(RecvTimeoutError::Disconnected);
            }
            if self.ready.wait_until(&mut inner, deadline).timed_out() {
                return match inner.events.pop_front() {
                    Some(event) => Ok(event),
                    None if inner.is_closed() => Err(RecvTimeoutError::Disconnected),
                    None => Err(RecvTimeoutError::Timeout),
                };
            }
        }
    }

    /// Active -> Stopping: refuse further pushes
    pub fn begin_stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == MonitorState::Active {
            inner.state = MonitorState::Stopping;
        }
    }

    /// -> Stopped: discard undelivered events and wake every waiter
    ///
    /// Returns the number of events discarded.
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.state = MonitorState::Stopped;
        let discarded = inner.events.len();
        inner.events.clear();
        drop(inner);
        self.ready.notify_all();
        discarded
    }

    /// Mark the notification source as permanently failed
    pub fn disconnect(&self) {
        self.inner.lock().disconnected = true;
        self.ready.notify_all();
    }

    pub fn state(&self) -> MonitorState {
        self.inner.lock().state
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.lock().disconnected
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events discarded by the overflow policy so far
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventQueue")
            .field("len", &inner.events.len())
            .field("state", &inner.state)
            .field("disconnected", &inner.disconnected)
            .field("policy", &self.policy)
            .finish()
    }
}
