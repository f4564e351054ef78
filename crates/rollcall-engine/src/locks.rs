use rollcall_core::Identity;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per identity, created on demand.
///
/// Every writer of an identity's embedding set (enrollment, deletion,
/// sweeping) holds that identity's guard for its whole read-decide-write
/// sequence. Different identities never contend.
#[derive(Clone, Default)]
pub struct IdentityLocks {
    slots: Arc<Mutex<HashMap<Identity, Arc<AsyncMutex<()>>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, identity: &Identity) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Slots referenced only by the map are idle.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(identity.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of identities currently locked or waited on.
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| Arc::strong_count(slot) > 1).count()
    }
}
