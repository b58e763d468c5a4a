//! The local scope table and its advisory sweep.

use crate::scope::ScopePattern;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// A grant as this device remembers it: domain, path prefix, local expiry.
#[derive(Debug, Clone)]
pub struct ClientScope {
    pub domain: String,
    pub path_prefix: ScopePattern,
    pub expires_at: DateTime<Utc>,
}

/// Per-device table of remembered scopes, keyed by domain.
#[derive(Debug, Default)]
pub struct ScopeCache {
    scopes: HashMap<String, ClientScope>,
}

impl ScopeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember an approved grant. The duration is trusted as returned by
    /// the server; the cache never polls to confirm the grant stayed alive.
    pub fn insert(
        &mut self,
        domain: &str,
        scope: ScopePattern,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) {
        self.scopes.insert(
            domain.to_string(),
            ClientScope {
                domain: domain.to_string(),
                path_prefix: scope,
                expires_at: now + Duration::minutes(i64::from(duration_minutes)),
            },
        );
    }

    /// Whether a navigation to `path_and_query` on `domain` may proceed:
    /// a live scope must exist and its pattern must match the path.
    /// The expiry check runs inline too; the sweep is only advisory.
    pub fn check(&self, domain: &str, path_and_query: &str, now: DateTime<Utc>) -> bool {
        match self.scopes.get(domain) {
            Some(scope) => now < scope.expires_at && scope.path_prefix.matches(path_and_query),
            None => false,
        }
    }

    pub fn get(&self, domain: &str) -> Option<&ClientScope> {
        self.scopes.get(domain)
    }

    /// Drop expired scopes. Advisory only: the authoritative re-block
    /// already happened server-side; this just keeps the table small.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.scopes.len();
        self.scopes.retain(|_, scope| now < scope.expires_at);
        before - self.scopes.len()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
