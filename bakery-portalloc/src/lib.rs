//! Finds free loopback TCP ports inside a configured range, excluding a
//! caller-supplied reservation set (spec §4.2).
//!
//! Two-layer exclusion is intentional: the reservation set protects against
//! TOCTOU races with other local processes (the caller reserves the port the
//! instant it is returned, before binding it for real), and the runtime bind
//! probe protects against stale reservations (a port recorded as allocated
//! by a since-crashed process is still bindable and will be skipped only by
//! the live probe once it is actually free). Skipping either layer defeats
//! the other's purpose.

use bakery_core::error::BakeryError;
use std::collections::HashSet;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub struct PortAllocator {
    range_start: u16,
    range_end: u16,
    /// Serializes the candidate-selection loop so two racing callers can
    /// never walk the range concurrently and pick the same port.
    lock: Mutex<()>,
}

impl PortAllocator {
    pub fn new(range_start: u16, range_end: u16) -> Self {
        Self {
            range_start,
            range_end,
            lock: Mutex::new(()),
        }
    }

    /// Return `count` distinct free ports in `[range_start, range_end]`,
    /// none present in `reserved`, each passing a runtime bind-and-release
    /// probe on the loopback interface. Ascending order within the range.
    pub async fn allocate_many(
        &self,
        count: usize,
        reserved: &[u16],
    ) -> Result<Vec<u16>, BakeryError> {
        if count == 0 {
            return Err(BakeryError::InvalidArgument(
                "port count must be a positive integer".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;

        let mut excluded: HashSet<u16> = reserved.iter().copied().collect();
        let mut found = Vec::with_capacity(count);

        for candidate in self.range_start..=self.range_end {
            if found.len() == count {
                break;
            }
            if excluded.contains(&candidate) {
                continue;
            }
            if probe_bindable(candidate).await {
                excluded.insert(candidate);
                found.push(candidate);
            }
        }

        if found.len() < count {
            return Err(BakeryError::ExhaustedRange(format!(
                "Unable to allocate {count} free ports in configured range"
            )));
        }

        Ok(found)
    }
}

/// Transient bind-and-release probe on `127.0.0.1:port`. The listener is
/// dropped (releasing the socket) before this function returns.
async fn probe_bindable(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(_) => false,
    }
}
