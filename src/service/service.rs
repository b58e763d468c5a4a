//! The orchestrator: one inbound access request, end to end.
//!
//! Per request: resolve the device, short-circuit force-blocked devices
//! and always-blocked domains without a reasoning call, gather context
//! (degrading on failure), consult the gatekeeper, and on approval drive
//! the registry. Every decision is recorded before the caller hears it;
//! a caller that disconnects mid-request still gets logged.

use crate::config::Config;
use crate::context::RoomProvider;
use crate::gatekeeper::{DecisionContext, DecisionProvider, Verdict};
use crate::history::{RequestLog, RequestRecord};
use crate::registry::{GrantError, GrantRegistry};
use crate::scope::{split_url, ScopePattern};
use crate::service::protocol::{AccessOutcome, GrantStatus, ServiceRequest, ServiceResponse};
use chrono::{Local, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// How many of the device's past requests the gatekeeper gets to see.
const RECENT_HISTORY_LIMIT: usize = 5;

/// Hard timeout for the room lookup. A slow location provider must not
/// stall decisions; it just becomes "room unavailable".
const ROOM_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GrantService {
    config: Arc<Config>,
    registry: Arc<GrantRegistry>,
    gatekeeper: Arc<dyn DecisionProvider>,
    rooms: Arc<dyn RoomProvider>,
    history: Arc<RequestLog>,
    /// Sticky deny-all flags set by the force-block operation.
    force_blocked: Mutex<HashSet<String>>,
}

impl GrantService {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<GrantRegistry>,
        gatekeeper: Arc<dyn DecisionProvider>,
        rooms: Arc<dyn RoomProvider>,
        history: Arc<RequestLog>,
    ) -> Self {
        Self {
            config,
            registry,
            gatekeeper,
            rooms,
            history,
            force_blocked: Mutex::new(HashSet::new()),
        }
    }

    /// Dispatch one protocol request. `peer_ip` is the connection's source
    /// address, used as the device identity unless explicitly overridden.
    pub async fn handle(&self, request: ServiceRequest, peer_ip: &str) -> ServiceResponse {
        match request {
            ServiceRequest::RequestAccess {
                url,
                reason,
                device_ip,
            } => {
                let device_ip = device_ip.unwrap_or_else(|| peer_ip.to_string());
                ServiceResponse::Access(self.request_access(&url, &reason, &device_ip).await)
            }
            ServiceRequest::Status => self.status().await,
            ServiceRequest::Revoke { domain } => match self.registry.revoke(&domain).await {
                Ok(()) => ServiceResponse::Revoked {
                    domain: Some(domain),
                },
                Err(e) => ServiceResponse::Error {
                    message: format!("Revoke failed: {:#}", e),
                },
            },
            ServiceRequest::RevokeAll => match self.registry.revoke_all().await {
                Ok(()) => ServiceResponse::Revoked { domain: None },
                Err(e) => ServiceResponse::Error {
                    message: format!("Revoke failed: {:#}", e),
                },
            },
            ServiceRequest::History => match self.history.today() {
                Ok(requests) => ServiceResponse::History { requests },
                Err(e) => ServiceResponse::Error {
                    message: format!("History read failed: {:#}", e),
                },
            },
            ServiceRequest::ForceBlock { device_ip } => self.force_block(&device_ip).await,
            ServiceRequest::ForceUnblock { device_ip } => {
                self.force_blocked.lock().await.remove(&device_ip);
                tracing::info!(device = %device_ip, "Force-block cleared");
                ServiceResponse::Ok
            }
            ServiceRequest::Health => ServiceResponse::Ok,
        }
    }

    /// The main flow: Received -> ContextGathered -> Decided -> Granted|Denied.
    /// One pass, no retry state.
    async fn request_access(&self, url: &str, reason: &str, device_ip: &str) -> AccessOutcome {
        let domain = match split_url(url) {
            Some((host, _)) => host,
            None => {
                // No hostname to report; the domain field stays empty
                // rather than echoing the unparseable input.
                return AccessOutcome::denied("", "Could not parse that URL.");
            }
        };

        // Short-circuit denials that never reach the gatekeeper.
        if self.force_blocked.lock().await.contains(device_ip) {
            return AccessOutcome::denied(
                &domain,
                "Your device is currently force-blocked (location restriction). Access denied.",
            );
        }

        let domains = self.config.domain_sets();
        let conditional = match domains.resolve_conditional(&domain) {
            Some(d) => d.to_string(),
            None => {
                let message = if domains.is_always_blocked(&domain) {
                    "This domain is permanently blocked. No exceptions."
                } else {
                    "This domain is not in the managed blocklist."
                };
                return AccessOutcome::denied(&domain, message);
            }
        };

        // Gather context concurrently; each lookup degrades independently.
        let device = self.config.devices.get(device_ip);
        let (room, request_count, recent) = tokio::join!(
            async {
                tokio::time::timeout(ROOM_LOOKUP_TIMEOUT, self.rooms.device_room(device_ip))
                    .await
                    .unwrap_or(None)
            },
            async { self.history.today_count(device_ip).unwrap_or(0) },
            async {
                self.history
                    .recent(device_ip, RECENT_HISTORY_LIMIT)
                    .unwrap_or_default()
            },
        );

        let context = DecisionContext {
            url: url.to_string(),
            reason: reason.to_string(),
            device_name: device.map(|d| d.name.clone()),
            device_kind: device.and_then(|d| d.kind.clone()),
            room: room.clone(),
            request_count_today: request_count,
            recent,
            now: Local::now(),
        };

        let mut verdict = self.gatekeeper.decide(&context).await;

        if verdict.approved {
            match self
                .registry
                .grant(
                    &conditional,
                    verdict.scope.clone(),
                    verdict.duration_minutes,
                    device_ip,
                    context.device_name.clone(),
                    reason,
                )
                .await
            {
                Ok(_) => {}
                Err(GrantError::StoreWriteFailed(e)) => {
                    tracing::error!(domain = %conditional, error = %e, "Grant not enacted");
                    verdict = Verdict::deny(format!(
                        "Approved, but the blocklist update failed so access was NOT \
                         enabled. Please try again. ({})",
                        verdict.message
                    ));
                }
                Err(GrantError::InvalidDomain(d)) => {
                    verdict = Verdict::deny(format!("Domain {:?} is not eligible.", d));
                }
            }
        }

        let record = RequestRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            device_ip: device_ip.to_string(),
            device_name: context.device_name.clone(),
            url: url.to_string(),
            domain: domain.clone(),
            reason: reason.to_string(),
            room,
            approved: verdict.approved,
            scope: if verdict.approved {
                verdict.scope.clone()
            } else {
                ScopePattern::unrestricted()
            },
            duration_minutes: verdict.approved.then_some(verdict.duration_minutes),
            message: verdict.message.clone(),
            request_number_today: request_count + 1,
        };
        if let Err(e) = self.history.append(&record) {
            tracing::error!(error = %e, "Failed to write request record");
        }

        AccessOutcome {
            approved: verdict.approved,
            scope: if verdict.approved {
                verdict.scope.as_str().map(|s| s.to_string())
            } else {
                None
            },
            duration_minutes: verdict.approved.then_some(verdict.duration_minutes),
            message: verdict.message,
            domain,
        }
    }

    async fn status(&self) -> ServiceResponse {
        let now = Utc::now();
        let active = self
            .registry
            .active()
            .await
            .iter()
            .map(|g| GrantStatus::from_grant(g, now))
            .collect();
        let mut force_blocked: Vec<String> =
            self.force_blocked.lock().await.iter().cloned().collect();
        force_blocked.sort();
        ServiceResponse::Status {
            active,
            force_blocked_devices: force_blocked,
        }
    }

    async fn force_block(&self, device_ip: &str) -> ServiceResponse {
        self.force_blocked
            .lock()
            .await
            .insert(device_ip.to_string());
        match self.registry.revoke_device(device_ip).await {
            Ok(revoked) => {
                tracing::info!(device = %device_ip, ?revoked, "Device force-blocked");
                ServiceResponse::Ok
            }
            Err(e) => ServiceResponse::Error {
                message: format!("Force-block set, but revoking grants failed: {:#}", e),
            },
        }
    }
}
