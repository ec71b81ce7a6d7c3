//! Cap on the number of columnar partitions materialised at the same time.
//!
//! Every unit of work that holds a whole partition in memory (converting one raw entry,
//! resampling one converted file, running the cascade of a period) takes a
//! [`BufferPermit`] first. The permit is released on drop. The pipeline is sequential,
//! so with the default cap of one a second concurrent acquisition is a bug and is
//! reported as [`AisError::BudgetExhausted`] instead of silently doubling memory use.
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::ais_errors::AisError;

#[derive(Debug)]
pub struct InFlightBudget {
    cap: usize,
    in_flight: AtomicUsize,
}

impl InFlightBudget {
    pub fn new(cap: usize) -> Self {
        InFlightBudget {
            cap: cap.max(1),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Take one slot, failing when `cap` slots are already held.
    pub fn acquire(&self, label: &str) -> Result<BufferPermit<'_>, AisError> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.cap).then_some(n + 1)
            })
            .map_err(|_| AisError::BudgetExhausted { cap: self.cap })?;
        trace!(label, in_flight = self.in_flight(), "buffer permit acquired");
        Ok(BufferPermit { budget: self })
    }
}

pub struct BufferPermit<'a> {
    budget: &'a InFlightBudget,
}

impl Drop for BufferPermit<'_> {
    fn drop(&mut self) {
        self.budget.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
