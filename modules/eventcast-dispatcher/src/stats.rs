use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-stream reaction counters. Updated concurrently by reaction tasks.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    ignored: AtomicU64,
    invalid: AtomicU64,
    unresolved: AtomicU64,
    no_address: AtomicU64,
    delivered: AtomicU64,
    delivery_failed: AtomicU64,
    reactions_panicked: AtomicU64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        record_received => received,
        record_ignored => ignored,
        record_invalid => invalid,
        record_unresolved => unresolved,
        record_delivered => delivered,
        record_delivery_failed => delivery_failed,
        record_panic => reactions_panicked,
    }

    pub fn record_no_address(&self, count: u64) {
        self.no_address.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            no_address: self.no_address.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
            reactions_panicked: self.reactions_panicked.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `DispatchStats`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Change events seen on the feed, of any type.
    pub received: u64,
    /// Changes that were not insertions.
    pub ignored: u64,
    /// Insertions rejected for missing or malformed references.
    pub invalid: u64,
    /// Reactions skipped because a referenced entity could not be resolved.
    pub unresolved: u64,
    /// Recipients skipped for having no push address.
    pub no_address: u64,
    pub delivered: u64,
    pub delivery_failed: u64,
    pub reactions_panicked: u64,
}

impl std::ops::Add for StatsSnapshot {
    type Output = StatsSnapshot;

    fn add(self, rhs: StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received + rhs.received,
            ignored: self.ignored + rhs.ignored,
            invalid: self.invalid + rhs.invalid,
            unresolved: self.unresolved + rhs.unresolved,
            no_address: self.no_address + rhs.no_address,
            delivered: self.delivered + rhs.delivered,
            delivery_failed: self.delivery_failed + rhs.delivery_failed,
            reactions_panicked: self.reactions_panicked + rhs.reactions_panicked,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} ignored={} invalid={} unresolved={} no_address={} delivered={} delivery_failed={} panicked={}",
            self.received,
            self.ignored,
            self.invalid,
            self.unresolved,
            self.no_address,
            self.delivered,
            self.delivery_failed,
            self.reactions_panicked,
        )
    }
}
