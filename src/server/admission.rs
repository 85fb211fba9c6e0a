//! Per-IP admission control.
//!
//! Gates connections before any session state exists. Each accepted
//! connection holds an [`AdmissionGuard`]; the slot is given back in `Drop`,
//! so the decrement happens exactly once on every exit path.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Per-source-address connection counter with a fixed cap.
///
/// Uses a synchronous mutex: all operations are O(1) map lookups and the
/// guard must be able to release from `Drop`, which cannot await.
pub struct AdmissionControl {
    cap: usize,
    counts: Mutex<HashMap<IpAddr, usize>>,
}

impl AdmissionControl {
    /// Create an admission controller allowing `cap` connections per IP.
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            cap,
            counts: Mutex::new(HashMap::new()),
        })
    }

    /// Try to admit a connection from `ip`. Returns `None` without touching
    /// any state when the address is at its cap; otherwise increments the
    /// count and returns a guard that releases the slot on drop.
    pub fn try_admit(self: &Arc<Self>, ip: IpAddr) -> Option<AdmissionGuard> {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(ip).or_insert(0);
        if *count >= self.cap {
            return None;
        }
        *count += 1;
        Some(AdmissionGuard {
            control: Arc::clone(self),
            ip,
        })
    }

    /// Current connection count for `ip`, or `None` once the entry is gone.
    pub fn active_connections(&self, ip: IpAddr) -> Option<usize> {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(&ip).copied()
    }

    fn release(&self, ip: IpAddr) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = counts.get_mut(&ip) {
            *count = count.saturating_sub(1);
            // Zero-count entries are removed to keep memory bounded.
            if *count == 0 {
                counts.remove(&ip);
            }
        }
    }
}

/// Holds one admitted connection slot; releasing is tied to scope exit.
pub struct AdmissionGuard {
    control: Arc<AdmissionControl>,
    ip: IpAddr,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.control.release(self.ip);
    }
}
