use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::StoreError;

/// A fixed pool of connection slots. Acquisition never waits.
pub(crate) struct Permits {
    max: usize,
    in_use: AtomicUsize,
}

pub(crate) struct Permit<'a> {
    permits: &'a Permits,
}

impl Permits {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            in_use: AtomicUsize::new(0),
        }
    }

    pub(crate) fn max(&self) -> usize {
        self.max
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    pub(crate) fn acquire(&self) -> Result<Permit<'_>, StoreError> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .map_err(|_| StoreError::Busy(self.max))?;
        Ok(Permit { permits: self })
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.permits.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
