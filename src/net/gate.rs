//! Shared connectivity gate.
//!
//! On the device the uplink is usually a phone reached over Bluetooth PAN;
//! bringing it up costs seconds and battery, so it stays down until someone
//! needs it. Every consumer opens the gate under its own caller name and
//! closes it when done; the uplink is only brought down once the last
//! caller has left. A caller that keeps failing gets locked out instead of
//! draining the battery with retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Consecutive failures before a caller is locked out.
const ERROR_LIMIT: u32 = 15;

/// Outcome of an `open` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// The uplink is up and this caller holds a claim on it.
    Success,
    /// Bringing the uplink up failed.
    Failed,
    /// This caller exceeded its failure budget and is locked out.
    Locked,
    /// The uplink is up but has no route out.
    NetUnreachable,
    /// The gate is inside a block window after a hard failure.
    Blocked,
}

/// How the gate actually raises and lowers the uplink.
pub trait UplinkControl: Send + Sync {
    fn bring_up(&self) -> GateStatus;
    fn bring_down(&self);
    /// Bandwidth-constrained uplinks get serialised tile batches.
    fn is_bluetooth(&self) -> bool {
        false
    }
}

/// Uplink that is always there, for wired/wifi setups and tests.
pub struct AlwaysUp;

impl UplinkControl for AlwaysUp {
    fn bring_up(&self) -> GateStatus {
        GateStatus::Success
    }

    fn bring_down(&self) {}
}

struct GateInner {
    /// Callers currently holding the uplink open.
    callers: HashMap<String, bool>,
    /// Consecutive failures per caller.
    error_counts: HashMap<String, u32>,
    blocked_until: Option<Instant>,
}

pub struct ConnectivityGate {
    uplink: Arc<dyn UplinkControl>,
    inner: Mutex<GateInner>,
}

impl ConnectivityGate {
    pub fn new(uplink: Arc<dyn UplinkControl>) -> Self {
        Self {
            uplink,
            inner: Mutex::new(GateInner {
                callers: HashMap::new(),
                error_counts: HashMap::new(),
                blocked_until: None,
            }),
        }
    }

    pub fn is_bluetooth(&self) -> bool {
        self.uplink.is_bluetooth()
    }

    /// Claim the uplink for `caller`, bringing it up if needed.
    pub fn open(&self, caller: &str) -> GateStatus {
        let mut inner = self.inner.lock();
        if let Some(until) = inner.blocked_until {
            if Instant::now() < until {
                return GateStatus::Blocked;
            }
            inner.blocked_until = None;
        }
        let errors = *inner.error_counts.get(caller).unwrap_or(&0);
        if errors >= ERROR_LIMIT {
            return GateStatus::Locked;
        }
        let status = if inner.callers.values().any(|up| *up) {
            GateStatus::Success
        } else {
            self.uplink.bring_up()
        };
        match status {
            GateStatus::Success => {
                inner.callers.insert(caller.to_string(), true);
                inner.error_counts.insert(caller.to_string(), 0);
            }
            _ => {
                let count = inner.error_counts.entry(caller.to_string()).or_insert(0);
                *count += 1;
                if *count >= ERROR_LIMIT {
                    warn!(caller, "uplink caller locked out");
                }
            }
        }
        status
    }

    /// Release `caller`'s claim; the last one out lowers the uplink.
    pub fn close(&self, caller: &str) {
        let mut inner = self.inner.lock();
        inner.callers.remove(caller);
        if !inner.callers.values().any(|up| *up) {
            self.uplink.bring_down();
        }
    }

    /// Refuse opens for `window` after a hard connect failure.
    pub fn arm_block(&self, window: Duration) {
        let mut inner = self.inner.lock();
        inner.blocked_until = Some(Instant::now() + window);
        info!(window_secs = window.as_secs(), "network gate blocked");
    }

    pub fn is_blocked(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.blocked_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                inner.blocked_until = None;
                false
            }
            None => false,
        }
    }

    /// Clear a caller's failure budget, for manual retry from the UI.
    pub fn unlock(&self, caller: &str) {
        self.inner.lock().error_counts.remove(caller);
    }
}
