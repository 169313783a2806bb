//! Short-lived "buy now" staging slots, one per browser session.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct BuyNowSlot {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(skip)]
    pub staged_at: Instant,
}

#[derive(Clone)]
pub struct BuyNowStore {
    slots: Arc<DashMap<String, BuyNowSlot>>,
    ttl: Duration,
}

impl BuyNowStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Replaces whatever the session had staged. Quantities below one are clamped to one.
    pub fn stage(&self, session_id: &str, user_id: Uuid, product_id: Uuid, quantity: i32) -> BuyNowSlot {
        let slot = BuyNowSlot {
            user_id,
            product_id,
            quantity: quantity.max(1),
            staged_at: Instant::now(),
        };
        self.slots.insert(session_id.to_string(), slot.clone());
        slot
    }

    /// Returns the live slot for this session, provided it belongs to `user_id`.
    pub fn get(&self, session_id: &str, user_id: Uuid) -> Option<BuyNowSlot> {
        let expired = match self.slots.get(session_id) {
            Some(slot) if slot.staged_at.elapsed() < self.ttl => {
                return (slot.user_id == user_id).then(|| slot.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.slots.remove(session_id);
        }
        None
    }

    /// Removes the session's slot. Returns whether one was present.
    pub fn clear(&self, session_id: &str) -> bool {
        self.slots.remove(session_id).is_some()
    }

    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.slots.retain(|_, slot| slot.staged_at.elapsed() < ttl);
    }
}
