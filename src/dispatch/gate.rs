use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::cancel::CancelSignal;
use crate::error::{Cancelled, ConfigError};

/// Counting gate that caps the number of attempts in flight.
///
/// Backed by tokio's semaphore, which hands freed permits to waiters in
/// arrival order.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: u32,
}

/// One held slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct GateSlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let capacity = u32::try_from(capacity)
            .ok()
            .filter(|c| (*c as usize) <= Semaphore::MAX_PERMITS)
            .ok_or(ConfigError::ConcurrencyTooLarge(capacity as u64))?;

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity as usize - self.semaphore.available_permits()
    }

    pub async fn acquire(&self, cancel: &CancelSignal) -> Result<GateSlot, Cancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            permit = self.semaphore.clone().acquire_owned() => permit
                .map(|permit| GateSlot { _permit: permit })
                // the semaphore is never closed
                .map_err(|_| Cancelled),
        }
    }

    /// Wait until every slot has been released.
    pub async fn drain(&self) {
        if let Ok(all) = self.semaphore.acquire_many(self.capacity).await {
            drop(all);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rejects_zero_capacity() {
        assert_eq!(
            ConcurrencyGate::new(0).unwrap_err(),
            ConfigError::ZeroConcurrency
        );
    }

    #[tokio::test]
    async fn blocks_when_full_and_resumes_on_release() {
        let gate = Arc::new(ConcurrencyGate::new(2).unwrap());
        let cancel = CancelSignal::new();

        let first = gate.acquire(&cancel).await.unwrap();
        let _second = gate.acquire(&cancel).await.unwrap();
        assert_eq!(gate.in_flight(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(20), gate.acquire(&cancel)).await;
        assert!(blocked.is_err(), "third acquire must wait");

        drop(first);
        assert_eq!(gate.in_flight(), 1);
        let _third = tokio::time::timeout(Duration::from_secs(1), gate.acquire(&cancel))
            .await
            .expect("slot freed")
            .unwrap();
        assert_eq!(gate.in_flight(), 2);
    }

    #[tokio::test]
    async fn waiters_are_admitted_in_arrival_order() {
        let gate = Arc::new(ConcurrencyGate::new(1).unwrap());
        let cancel = CancelSignal::new();
        let held = gate.acquire(&cancel).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for id in 0..3 {
            let gate = gate.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let slot = gate.acquire(&cancel).await.unwrap();
                tx.send(id).unwrap();
                drop(slot);
            });
            // let each waiter enqueue before the next one starts
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(tx);
        drop(held);

        let mut order = Vec::new();
        while let Some(id) = rx.recv().await {
            order.push(id);
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn cancellation_unblocks_waiters() {
        let gate = Arc::new(ConcurrencyGate::new(1).unwrap());
        let cancel = CancelSignal::new();
        let _held = gate.acquire(&cancel).await.unwrap();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire(&cancel).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    }

    #[tokio::test]
    async fn drain_waits_for_every_slot() {
        let gate = Arc::new(ConcurrencyGate::new(3).unwrap());
        let cancel = CancelSignal::new();

        for delay in [5u64, 10, 15] {
            let slot = gate.acquire(&cancel).await.unwrap();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                drop(slot);
            });
        }

        tokio::time::timeout(Duration::from_secs(1), gate.drain())
            .await
            .expect("drained");
        assert_eq!(gate.in_flight(), 0);
    }
}
