//! Per-scan fan-out of progress events to subscribed observers.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::models::ProgressEvent;

const CHANNEL_CAPACITY: usize = 64;

struct Room {
    tx: broadcast::Sender<ProgressEvent>,
    latest: Option<ProgressEvent>,
}

impl Room {
    fn new() -> Self {
        Room {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
            latest: None,
        }
    }
}

/// Best-effort, at-least-once delivery to currently connected subscribers.
/// A subscriber joining mid-scan receives the cached latest event first.
/// Publishing without subscribers is fine; slow subscribers skip lagged
/// events rather than blocking publishers.
#[derive(Default)]
pub struct ProgressBus {
    rooms: Mutex<HashMap<String, Room>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        ProgressBus::default()
    }

    pub fn publish(&self, scan_id: &str, event: ProgressEvent) {
        let mut rooms = self.lock_rooms();
        let room = rooms.entry(scan_id.to_string()).or_insert_with(Room::new);
        room.latest = Some(event.clone());
        // No receivers is not an error: the scan runs regardless.
        let _ = room.tx.send(event);
    }

    /// Subscribe to a scan's events. Unsubscribing is dropping the receiver.
    pub fn subscribe(
        &self,
        scan_id: &str,
    ) -> (Option<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        let mut rooms = self.lock_rooms();
        let room = rooms.entry(scan_id.to_string()).or_insert_with(Room::new);
        (room.latest.clone(), room.tx.subscribe())
    }

    pub fn remove(&self, scan_id: &str) {
        self.lock_rooms().remove(scan_id);
    }

    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, HashMap<String, Room>> {
        match self.rooms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
