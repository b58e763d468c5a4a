//! Grant records and the registry error taxonomy.

use crate::scope::ScopePattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A live, time-boxed exception permitting a domain to resolve.
///
/// At most one exists per domain; a new grant replaces the old one rather
/// than stacking. Live iff `now < expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Identity used to match expiry timers against the current entry.
    pub id: Uuid,

    /// The conditional domain this grant uncovers (canonical form).
    pub domain: String,

    /// Path-prefix scope recorded with the grant. DNS cannot enforce this;
    /// device agents do.
    pub scope: ScopePattern,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Device the approval was attributed to.
    pub device_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// The reason the user gave when requesting access.
    pub reason: String,
}

impl AccessGrant {
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Failures on the grant path that the caller must see.
#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    /// The domain is not in the conditional set (always-blocked and
    /// unmanaged domains land here too). Rejected locally.
    #[error("Domain {0:?} is not eligible for a grant")]
    InvalidDomain(String),

    /// The blocklist write or resolver signal failed. The grant was NOT
    /// enacted; the user must be told they do not have access.
    #[error("Blocklist update failed: {0}")]
    StoreWriteFailed(#[source] anyhow::Error),
}
