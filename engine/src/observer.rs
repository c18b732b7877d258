//! Sync progress notifications.
//!
//! Observers are registered explicitly and receive events in registration
//! order. Registration returns an [`ObserverHandle`] used for removal.

use crate::ObjectType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncType {
    Down,
    Up,
    CleanGhosts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    Running,
    Done,
    Failed,
}

/// Progress of a sync run, in record trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub sync_type: SyncType,
    pub status: SyncStatus,
    /// Parent object type of the target being synced
    pub object_type: ObjectType,
    pub progress: usize,
    pub total: usize,
}

impl SyncEvent {
    /// Completion in percent. An empty run is complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.progress.min(self.total) * 100 / self.total) as u8
    }
}

pub trait SyncObserver {
    fn on_sync_event(&mut self, event: &SyncEvent);
}

impl<F: FnMut(&SyncEvent)> SyncObserver for F {
    fn on_sync_event(&mut self, event: &SyncEvent) {
        self(event)
    }
}

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverHandle(u64);

#[derive(Default)]
pub struct ObserverRegistry {
    next_handle: u64,
    observers: Vec<(ObserverHandle, Box<dyn SyncObserver>)>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<O: SyncObserver + 'static>(&mut self, observer: O) -> ObserverHandle {
        let handle = ObserverHandle(self.next_handle);
        self.next_handle += 1;
        self.observers.push((handle, Box::new(observer)));
        handle
    }

    /// Unregister an observer. Returns false if the handle is unknown.
    pub fn remove(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        self.observers.len() != before
    }

    pub fn notify(&mut self, event: &SyncEvent) {
        for (_, observer) in &mut self.observers {
            observer.on_sync_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}
