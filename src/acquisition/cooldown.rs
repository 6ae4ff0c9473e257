/*!
 * Per-media deduplication of acquisition tasks.
 *
 * At most one task per media identifier is in flight. A second event for the
 * same identifier is dropped while the first runs, and for a short cooldown
 * after it started, to absorb duplicate webhook deliveries.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use log::debug;

#[derive(Debug, Clone, Copy)]
struct Slot {
    started: Instant,
    in_flight: bool,
}

/// Shared registry of in-flight media identifiers
#[derive(Debug, Clone)]
pub struct InFlightRegistry {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    cooldown: Duration,
}

/// Held for the lifetime of one task; releases the identifier on drop
#[derive(Debug)]
pub struct InFlightGuard {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    media_id: String,
}

impl InFlightRegistry {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            cooldown,
        }
    }

    /// Claim `media_id`, or `None` if a task for it is running or started
    /// within the cooldown window
    pub fn try_acquire(&self, media_id: &str) -> Option<InFlightGuard> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let cooldown = self.cooldown;
        slots.retain(|_, slot| slot.in_flight || now.duration_since(slot.started) < cooldown);

        if let Some(slot) = slots.get(media_id) {
            debug!(
                "Dropping duplicate event for {} (in flight: {}, started {}ms ago)",
                media_id,
                slot.in_flight,
                now.duration_since(slot.started).as_millis()
            );
            return None;
        }

        slots.insert(media_id.to_string(), Slot { started: now, in_flight: true });
        Some(InFlightGuard {
            slots: self.slots.clone(),
            media_id: media_id.to_string(),
        })
    }

    pub fn is_in_flight(&self, media_id: &str) -> bool {
        self.slots.lock().get(media_id).is_some_and(|s| s.in_flight)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slots.lock().get_mut(&self.media_id) {
            slot.in_flight = false;
        }
    }
}
