//! Per-instance serialisation of lifecycle operations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async mutex per instance identifier.
///
/// Operations on the same instance queue behind each other while distinct
/// instances proceed in parallel. Idle entries are pruned on every acquire.
#[derive(Debug, Default)]
pub struct InstanceLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one operation on an instance.
#[derive(Debug)]
pub struct InstanceGuard {
    _guard: OwnedMutexGuard<()>,
}

impl InstanceLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `instance_id`.
    pub async fn acquire(&self, instance_id: &str) -> InstanceGuard {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(
                slots
                    .entry(instance_id.to_owned())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        InstanceGuard {
            _guard: slot.lock_owned().await,
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[tokio::test]
    async fn same_instance_is_serialised() {
        let locks = Arc::new(InstanceLocks::new());
        let first = locks.acquire("789").await;
        let contender = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _second = contender.acquire("789").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .expect("task should not panic");
    }

    #[rstest]
    #[tokio::test]
    async fn distinct_instances_do_not_contend() {
        let locks = InstanceLocks::new();
        let _first = locks.acquire("a").await;
        tokio::time::timeout(Duration::from_secs(1), locks.acquire("b"))
            .await
            .expect("other instance should not block");
    }

    #[rstest]
    #[tokio::test]
    async fn idle_slots_are_pruned() {
        let locks = InstanceLocks::new();
        drop(locks.acquire("a").await);
        drop(locks.acquire("b").await);
        assert_eq!(locks.tracked().await, 1);
    }
}
