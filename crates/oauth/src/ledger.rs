//! Shared record of authorization codes that have been (or are being)
//! exchanged, so independent callback paths agree on one outcome without
//! depending on the provider's error wording.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    dashmap::{DashMap, mapref::entry::Entry as MapEntry},
    tokio::{sync::watch, time::Instant},
    tracing::debug,
};

/// State of one code in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// An owner is exchanging the code right now.
    Pending,
    /// The code produced a session (here or on another path).
    Succeeded,
    /// The provider refused the code with this message.
    Rejected(String),
    /// The owner gave up without a provider answer; the code may still be fresh.
    Abandoned,
}

/// Result of trying to claim a code.
pub enum Claim {
    /// Caller must perform the exchange and settle the guard.
    Owner(ClaimGuard),
    Consumed,
    Rejected(String),
    /// Another path is exchanging; wait on the receiver.
    InFlight(watch::Receiver<Settlement>),
}

struct LedgerEntry {
    id: u64,
    tx: watch::Sender<Settlement>,
    created: Instant,
}

struct Inner {
    entries: DashMap<String, LedgerEntry>,
    next_id: AtomicU64,
    ttl: Duration,
}

/// Cheaply cloneable handle to the ledger.
#[derive(Clone)]
pub struct ConsumedCodeLedger {
    inner: Arc<Inner>,
}

impl ConsumedCodeLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_id: AtomicU64::new(1),
                ttl,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Current settlement for `code`, if the ledger knows it.
    pub fn state(&self, code: &str) -> Option<Settlement> {
        self.inner
            .entries
            .get(code)
            .map(|entry| entry.tx.borrow().clone())
    }

    /// Drop entries older than the TTL.
    pub fn purge_expired(&self) {
        let ttl = self.inner.ttl;
        self.inner
            .entries
            .retain(|_, entry| entry.created.elapsed() < ttl);
    }

    pub fn claim(&self, code: &str) -> Claim {
        self.purge_expired();

        match self.inner.entries.entry(code.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let current = occupied.get().tx.borrow().clone();
                match current {
                    Settlement::Pending => Claim::InFlight(occupied.get().tx.subscribe()),
                    Settlement::Succeeded => Claim::Consumed,
                    Settlement::Rejected(message) => Claim::Rejected(message),
                    Settlement::Abandoned => {
                        let entry = self.new_entry();
                        let id = entry.id;
                        occupied.insert(entry);
                        Claim::Owner(self.guard(code, id))
                    },
                }
            },
            MapEntry::Vacant(vacant) => {
                let entry = self.new_entry();
                let id = entry.id;
                vacant.insert(entry);
                Claim::Owner(self.guard(code, id))
            },
        }
    }

    /// Wait until an in-flight exchange settles. A vanished owner counts as
    /// abandoned.
    pub async fn wait(mut rx: watch::Receiver<Settlement>) -> Settlement {
        match rx.wait_for(|s| *s != Settlement::Pending).await {
            Ok(settled) => settled.clone(),
            Err(_) => Settlement::Abandoned,
        }
    }

    fn new_entry(&self) -> LedgerEntry {
        let (tx, _rx) = watch::channel(Settlement::Pending);
        LedgerEntry {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            tx,
            created: Instant::now(),
        }
    }

    fn guard(&self, code: &str, id: u64) -> ClaimGuard {
        ClaimGuard {
            ledger: self.clone(),
            code: code.to_string(),
            id,
            settled: false,
        }
    }
}

/// Ownership of one in-flight exchange. Dropping it unsettled releases the
/// code as [`Settlement::Abandoned`].
pub struct ClaimGuard {
    ledger: ConsumedCodeLedger,
    code: String,
    id: u64,
    settled: bool,
}

impl ClaimGuard {
    pub fn settle(mut self, settlement: Settlement) {
        if let Some(entry) = self.ledger.inner.entries.get(&self.code)
            && entry.id == self.id
        {
            entry.tx.send_replace(settlement);
        }
        self.settled = true;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let removed = self
            .ledger
            .inner
            .entries
            .remove_if(&self.code, |_, entry| entry.id == self.id);
        if let Some((_, entry)) = removed {
            debug!("releasing abandoned code claim");
            entry.tx.send_replace(Settlement::Abandoned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ConsumedCodeLedger {
        ConsumedCodeLedger::new(Duration::from_secs(600))
    }

    #[test]
    fn test_first_claim_owns() {
        let ledger = ledger();
        assert!(matches!(ledger.claim("c1"), Claim::Owner(_)));
    }

    #[tokio::test]
    async fn test_settled_success_is_consumed() {
        let ledger = ledger();
        let Claim::Owner(guard) = ledger.claim("c1") else {
            panic!("expected owner");
        };
        guard.settle(Settlement::Succeeded);
        assert!(matches!(ledger.claim("c1"), Claim::Consumed));
        assert_eq!(ledger.state("c1"), Some(Settlement::Succeeded));
    }

    #[tokio::test]
    async fn test_rejection_is_replayed() {
        let ledger = ledger();
        let Claim::Owner(guard) = ledger.claim("c1") else {
            panic!("expected owner");
        };
        guard.settle(Settlement::Rejected("bad verifier".into()));
        match ledger.claim("c1") {
            Claim::Rejected(msg) => assert_eq!(msg, "bad verifier"),
            _ => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn test_in_flight_waiter_sees_settlement() {
        let ledger = ledger();
        let Claim::Owner(guard) = ledger.claim("c1") else {
            panic!("expected owner");
        };
        let Claim::InFlight(rx) = ledger.claim("c1") else {
            panic!("expected in-flight");
        };
        let waiter = tokio::spawn(ConsumedCodeLedger::wait(rx));
        guard.settle(Settlement::Succeeded);
        assert_eq!(waiter.await.unwrap(), Settlement::Succeeded);
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_code() {
        let ledger = ledger();
        let Claim::Owner(guard) = ledger.claim("c1") else {
            panic!("expected owner");
        };
        let Claim::InFlight(rx) = ledger.claim("c1") else {
            panic!("expected in-flight");
        };
        drop(guard);
        assert_eq!(ConsumedCodeLedger::wait(rx).await, Settlement::Abandoned);
        assert!(ledger.is_empty());
        assert!(matches!(ledger.claim("c1"), Claim::Owner(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let ledger = ConsumedCodeLedger::new(Duration::from_secs(10));
        let Claim::Owner(guard) = ledger.claim("c1") else {
            panic!("expected owner");
        };
        guard.settle(Settlement::Succeeded);
        tokio::time::advance(Duration::from_secs(11)).await;
        ledger.purge_expired();
        assert!(ledger.is_empty());
    }
}
