use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One mutex per monitor id.
///
/// Evaluation, resolve/dismiss and insight attachment for the same monitor
/// take this lock so their read-modify-write cycles never interleave.
/// Different monitors proceed in parallel.
#[derive(Default)]
pub struct MonitorLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MonitorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock handle of `monitor_id`, creating it on first use.
    pub fn handle(&self, monitor_id: &str) -> Arc<Mutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(monitor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
