//! Abuse filter: scanner-bait classifier plus dynamic IP blocklist
//!
//! Short codes ending in file extensions commonly probed by vulnerability
//! scanners (`backup.sql`, `.env`, ...) are never real keys. The first such
//! request gets the caller's identity inserted into a process-wide blocklist;
//! every later request from that identity is refused outright, for the
//! remainder of the process lifetime. There is no expiry and no unblock path.

use dashmap::DashSet;
use std::collections::HashSet;

/// Extensions probed by scanners. Matched case-insensitively against the
/// final dot-suffix of the requested code.
const FORBIDDEN_EXTENSIONS: &[&str] = &[
    "sql", "zip", "env", "php", "asp", "aspx", "jsp", "bak", "gz", "rar", "7z", "ini", "yml",
    "config",
];

/// Shared abuse-filter state, constructed once at startup.
pub struct AbuseGuard {
    forbidden: HashSet<&'static str>,
    blocklist: DashSet<String>,
}

impl AbuseGuard {
    pub fn new() -> Self {
        Self {
            forbidden: FORBIDDEN_EXTENSIONS.iter().copied().collect(),
            blocklist: DashSet::new(),
        }
    }

    /// Whether a requested short code looks like a scanner probe.
    ///
    /// Classification is by the final dot-extension, lowercased, so
    /// `dump.SQL` matches just like `dump.sql`.
    pub fn is_forbidden_code(&self, code: &str) -> bool {
        let Some((_, ext)) = code.rsplit_once('.') else {
            return false;
        };
        if ext.is_empty() {
            return false;
        }
        self.forbidden.contains(ext.to_ascii_lowercase().as_str())
    }

    /// Add an identity to the blocklist.
    pub fn block(&self, identity: &str) {
        if self.blocklist.insert(identity.to_string()) {
            tracing::info!(identity = %identity, "blocklisted client");
        }
    }

    pub fn is_blocked(&self, identity: &str) -> bool {
        self.blocklist.contains(identity)
    }

    /// Number of blocklisted identities. Grows without bound by design.
    pub fn blocked_count(&self) -> usize {
        self.blocklist.len()
    }
}

impl Default for AbuseGuard {
    fn default() -> Self {
        Self::new()
    }
}
