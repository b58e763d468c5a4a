//! The request record type.

use crate::scope::ScopePattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One past decision, as written to the JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,

    pub device_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    pub url: String,
    pub domain: String,
    pub reason: String,

    /// Room at decision time, None when the lookup was unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    pub approved: bool,

    /// Granted scope; unrestricted (null) for denials.
    pub scope: ScopePattern,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,

    /// The gatekeeper's message shown to the user.
    pub message: String,

    /// 1-based position of this request among the device's requests today.
    pub request_number_today: u32,
}
