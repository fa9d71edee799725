use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub completed: Arc<AtomicU64>,
    pub points_awarded: Arc<AtomicU64>,

    // rejection reasons
    pub already_completed: Arc<AtomicU64>,
    pub not_found: Arc<AtomicU64>,
    pub rejected: Arc<AtomicU64>,
    pub internal: Arc<AtomicU64>,
}

impl Counters {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}
