use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{LifecycleError, Result};

static GLOBAL: OnceLock<ConnectorSlot> = OnceLock::new();

/// Admits at most one live connector at a time.
///
/// Outside of tests the only slot is [`ConnectorSlot::global`], the one
/// behind `Connector::acquire`.
#[derive(Debug, Clone)]
pub struct ConnectorSlot {
    occupied: Arc<AtomicBool>,
}

impl ConnectorSlot {
    fn vacant() -> Self {
        Self {
            occupied: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A private slot, independent of the global one.
    #[cfg(any(test, feature = "test-util"))]
    #[doc(hidden)]
    pub fn new() -> Self {
        Self::vacant()
    }

    /// The process-wide slot.
    pub fn global() -> &'static ConnectorSlot {
        GLOBAL.get_or_init(ConnectorSlot::vacant)
    }

    /// True while a connector holds this slot.
    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }

    pub(crate) fn claim(&self) -> Result<SlotGuard> {
        self.occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LifecycleError::SingletonViolation)?;
        debug!("connector slot claimed");
        Ok(SlotGuard {
            occupied: Arc::clone(&self.occupied),
        })
    }
}

/// Frees its slot on drop.
#[derive(Debug)]
pub(crate) struct SlotGuard {
    occupied: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.occupied.store(false, Ordering::Release);
        debug!("connector slot released");
    }
}
