//! Wire types for the JSON-line service protocol.

use crate::history::RequestRecord;
use crate::registry::AccessGrant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request from a client, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ServiceRequest {
    /// "May I access this URL?" The main operation.
    RequestAccess {
        url: String,
        reason: String,
        /// Explicit device override. Normally absent: the device is
        /// resolved from the connection's peer address so one device
        /// cannot have its approvals attributed to another.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_ip: Option<String>,
    },
    /// Live grants and force-blocked devices.
    Status,
    /// Immediately re-block one domain.
    Revoke { domain: String },
    /// Immediately re-block everything.
    RevokeAll,
    /// Today's request records, newest first.
    History,
    /// Revoke a device's grants and deny all its future requests.
    /// Invoked by location automations.
    ForceBlock { device_ip: String },
    /// Clear a device's force-block flag.
    ForceUnblock { device_ip: String },
    Health,
}

/// A response to a client, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceResponse {
    Access(AccessOutcome),
    Status {
        active: Vec<GrantStatus>,
        force_blocked_devices: Vec<String>,
    },
    Revoked {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
    },
    History {
        requests: Vec<RequestRecord>,
    },
    Ok,
    Error {
        message: String,
    },
}

/// Outcome of a request-access operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessOutcome {
    pub approved: bool,
    /// Granted path scope; absent means unrestricted (or denied).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub message: String,
    pub domain: String,
}

impl AccessOutcome {
    pub fn denied(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            approved: false,
            scope: None,
            duration_minutes: None,
            message: message.into(),
            domain: domain.into(),
        }
    }
}

/// One live grant as reported by the status operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantStatus {
    pub domain: String,
    pub device_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_secs: i64,
    pub reason: String,
}

impl GrantStatus {
    pub fn from_grant(grant: &AccessGrant, now: DateTime<Utc>) -> Self {
        Self {
            domain: grant.domain.clone(),
            device_ip: grant.device_ip.clone(),
            device_name: grant.device_name.clone(),
            scope: grant.scope.as_str().map(|s| s.to_string()),
            created_at: grant.created_at,
            expires_at: grant.expires_at,
            remaining_secs: grant.remaining_secs(now),
            reason: grant.reason.clone(),
        }
    }
}
