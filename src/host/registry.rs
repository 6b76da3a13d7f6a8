use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Id of the single popover container in a page.
pub const CONTAINER_ID: &str = "mcp-popover-container";

/// Tracks the page-wide well-known nodes and which adapter instance owns
/// the mounted control. Passed through the context instead of living on
/// `window`.
#[derive(Debug)]
pub struct InjectionRegistry {
    container_id: String,
    instances: AtomicUsize,
    owner: Mutex<Option<usize>>,
}

impl Default for InjectionRegistry {
    fn default() -> Self {
        Self::new(CONTAINER_ID)
    }
}

impl InjectionRegistry {
    pub fn new(container_id: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            instances: AtomicUsize::new(0),
            owner: Mutex::new(None),
        }
    }

    fn owner_slot(&self) -> MutexGuard<'_, Option<usize>> {
        self.owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Number handed to each adapter built against this registry, starting at 1.
    pub fn next_instance(&self) -> usize {
        self.instances.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record `instance` as the owner of the control. Fails when another
    /// instance already holds it.
    pub fn claim(&self, instance: usize) -> bool {
        let mut owner = self.owner_slot();
        match *owner {
            Some(current) if current != instance => false,
            _ => {
                *owner = Some(instance);
                true
            }
        }
    }

    pub fn release(&self, instance: usize) {
        let mut owner = self.owner_slot();
        if *owner == Some(instance) {
            *owner = None;
        }
    }

    pub fn owner(&self) -> Option<usize> {
        *self.owner_slot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_instance_owns_the_control() {
        let registry = InjectionRegistry::default();
        let first = registry.next_instance();
        let second = registry.next_instance();
        assert_eq!((first, second), (1, 2));

        assert!(registry.claim(first));
        assert!(registry.claim(first));
        assert!(!registry.claim(second));

        registry.release(second);
        assert_eq!(registry.owner(), Some(first));
        registry.release(first);
        assert!(registry.claim(second));
    }
}
