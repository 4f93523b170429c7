//! Fixed-window admission control, keyed by client identity and route class
//!
//! Each (identity, route class) pair carries one atomic counter slot per
//! configured quota (a minute window and an hour window by default). On every
//! request all slots for the matched class are advanced; the request is
//! admitted only if none of them was already at its limit. Rejection is
//! ordinary control flow, not an error.
//!
//! State is memory-resident and per-process. Horizontally scaled instances do
//! not share counters.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering::Relaxed};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which limit set applies to a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// `/{key}` directory lookups, the strictest class.
    Redirect,
    /// The `/` home route.
    Home,
    /// sitemap/robots/ads routes.
    Static,
}

/// A single fixed-window quota: at most `limit` requests per `window_secs`.
#[derive(Debug, Clone, Copy)]
pub struct RateQuota {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateQuota {
    pub const fn per_minute(limit: u32) -> Self {
        Self { limit, window_secs: 60 }
    }

    pub const fn per_hour(limit: u32) -> Self {
        Self { limit, window_secs: 3600 }
    }
}

/// Configured quotas per route class.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub redirect: Vec<RateQuota>,
    pub home: Vec<RateQuota>,
    pub r#static: Vec<RateQuota>,
}

impl Default for RateLimits {
    fn default() -> Self {
        // Mirrors the historical deployment: 8/minute + 50/hour everywhere,
        // tighter on directory lookups, looser on the home route.
        Self {
            redirect: vec![RateQuota::per_minute(5), RateQuota::per_hour(50)],
            home: vec![RateQuota::per_minute(30), RateQuota::per_hour(50)],
            r#static: vec![RateQuota::per_minute(8), RateQuota::per_hour(50)],
        }
    }
}

/// One counter per quota for a given (identity, class).
struct WindowSlot {
    window_start: AtomicU64,
    count: AtomicU32,
}

struct Entry {
    slots: Vec<WindowSlot>,
    last_seen: AtomicU64,
}

/// Admission decision for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Limited,
}

/// Every this many admission checks, idle entries are swept from the map.
const SWEEP_EVERY: u64 = 1024;

pub struct RateLimiter {
    limits: RateLimits,
    counters: DashMap<(String, RouteClass), Entry>,
    /// Admission checks since startup, drives the periodic sweep.
    checks: AtomicU64,
    /// Entries idle longer than this are removed by the sweep.
    eviction_grace_secs: u64,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            counters: DashMap::new(),
            checks: AtomicU64::new(0),
            eviction_grace_secs: 2 * 3600,
        }
    }

    fn quotas(&self, class: RouteClass) -> &[RateQuota] {
        match class {
            RouteClass::Redirect => &self.limits.redirect,
            RouteClass::Home => &self.limits.home,
            RouteClass::Static => &self.limits.r#static,
        }
    }

    /// Admit or reject a request arriving now.
    pub fn check(&self, identity: &str, class: RouteClass) -> Admission {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(identity, class, now)
    }

    /// Admit or reject at an explicit clock reading (seconds since epoch).
    pub fn check_at(&self, identity: &str, class: RouteClass, now: u64) -> Admission {
        let quotas = self.quotas(class);
        if quotas.is_empty() {
            return Admission::Admitted;
        }

        // Sweep idle entries every SWEEP_EVERY checks. Identities that stop
        // sending traffic (one-shot scanners, mostly) would otherwise pin
        // their counters for the process lifetime.
        if self.checks.fetch_add(1, Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }

        let key = (identity.to_string(), class);

        let entry = self.counters.entry(key).or_insert_with(|| Entry {
            slots: quotas
                .iter()
                .map(|q| WindowSlot {
                    window_start: AtomicU64::new(window_floor(now, q.window_secs)),
                    count: AtomicU32::new(0),
                })
                .collect(),
            last_seen: AtomicU64::new(now),
        });
        entry.last_seen.store(now, Relaxed);

        let mut admitted = true;
        for (slot, quota) in entry.slots.iter().zip(quotas) {
            let window = window_floor(now, quota.window_secs);
            if slot.window_start.load(Relaxed) != window {
                slot.window_start.store(window, Relaxed);
                slot.count.store(0, Relaxed);
            }
            let prev = slot.count.fetch_add(1, Relaxed);
            if prev >= quota.limit {
                admitted = false;
            }
        }

        if admitted {
            Admission::Admitted
        } else {
            Admission::Limited
        }
    }

    /// Drop every entry idle for longer than the grace period.
    fn sweep(&self, now: u64) {
        self.counters.retain(|_, entry| {
            now.saturating_sub(entry.last_seen.load(Relaxed)) <= self.eviction_grace_secs
        });
    }

    /// Number of (identity, class) entries currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.counters.len()
    }
}

fn window_floor(now: u64, window_secs: u64) -> u64 {
    (now / window_secs) * window_secs
}
