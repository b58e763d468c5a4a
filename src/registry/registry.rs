//! The registry itself: grant/revoke/expire under a single writer lock.

use crate::blocklist::BlocklistStore;
use crate::config::DomainSets;
use crate::registry::{AccessGrant, GrantError};
use crate::scope::ScopePattern;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A grant plus its scheduled expiry task.
struct GrantEntry {
    grant: AccessGrant,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    /// Keyed by canonical conditional domain.
    grants: HashMap<String, GrantEntry>,
}

/// Authoritative table of active grants and sole writer of the store.
pub struct GrantRegistry {
    domains: DomainSets,
    store: BlocklistStore,
    inner: Mutex<Inner>,
}

impl GrantRegistry {
    pub fn new(domains: DomainSets, store: BlocklistStore) -> Arc<Self> {
        Arc::new(Self {
            domains,
            store,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Apply the full blocked set. Called once at startup: no grant survives
    /// a restart, so this is always a full re-block.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        let inner = self.inner.lock().await;
        self.store.apply(&self.blocked_set(&inner)).await?;
        tracing::info!(
            domains = self.domains.all().len(),
            "Blocklist initialized, all managed domains blocked"
        );
        Ok(())
    }

    /// Create a grant, replacing any live grant for the same domain.
    ///
    /// The store apply happens synchronously before returning: the caller
    /// only sees success once the domain actually resolves. On a store
    /// failure the new grant is rolled back and the prior state re-applied
    /// best-effort.
    pub async fn grant(
        self: &Arc<Self>,
        domain: &str,
        scope: ScopePattern,
        duration_minutes: u32,
        device_ip: &str,
        device_name: Option<String>,
        reason: &str,
    ) -> Result<AccessGrant, GrantError> {
        let canonical = self
            .domains
            .resolve_conditional(domain)
            .ok_or_else(|| GrantError::InvalidDomain(domain.to_string()))?
            .to_string();

        let now = Utc::now();
        let grant = AccessGrant {
            id: Uuid::new_v4(),
            domain: canonical.clone(),
            scope,
            created_at: now,
            expires_at: now + ChronoDuration::minutes(i64::from(duration_minutes)),
            device_ip: device_ip.to_string(),
            device_name,
            reason: reason.to_string(),
        };

        let mut inner = self.inner.lock().await;

        // Replace: the superseded grant's timer must not fire later.
        let previous = inner.grants.remove(&canonical);
        if let Some(prev) = &previous {
            if let Some(timer) = &prev.timer {
                timer.abort();
            }
            tracing::info!(
                domain = %canonical,
                "Replacing existing grant (was for {})",
                prev.grant.device_ip
            );
        }

        inner.grants.insert(
            canonical.clone(),
            GrantEntry {
                grant: grant.clone(),
                timer: None,
            },
        );

        if let Err(e) = self.store.apply(&self.blocked_set(&inner)).await {
            // Not enacted. Restore the previous entry with a fresh expiry
            // timer (its original one was aborted above); its domain stays
            // unblocked on disk from the last good apply.
            inner.grants.remove(&canonical);
            if let Some(mut prev) = previous {
                let remaining = (prev.grant.expires_at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                prev.timer =
                    Some(self.spawn_expiry(canonical.clone(), prev.grant.id, remaining));
                inner.grants.insert(canonical.clone(), prev);
            }
            return Err(GrantError::StoreWriteFailed(e));
        }

        let timer = self.spawn_expiry(
            canonical.clone(),
            grant.id,
            Duration::from_secs(u64::from(duration_minutes) * 60),
        );
        if let Some(entry) = inner.grants.get_mut(&canonical) {
            entry.timer = Some(timer);
        }

        tracing::info!(
            domain = %canonical,
            device = %grant.device_ip,
            minutes = duration_minutes,
            scope = %grant.scope,
            "Domain unblocked"
        );
        Ok(grant)
    }

    /// Immediately re-block a domain, regardless of remaining grant time.
    /// Idempotent: revoking an already-blocked domain is a no-op success.
    pub async fn revoke(&self, domain: &str) -> anyhow::Result<()> {
        let canonical = match self.domains.resolve_conditional(domain) {
            Some(d) => d.to_string(),
            None => domain.to_ascii_lowercase(),
        };

        let mut inner = self.inner.lock().await;
        match inner.grants.remove(&canonical) {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                self.store.apply(&self.blocked_set(&inner)).await?;
                tracing::info!(domain = %canonical, "Grant revoked, domain re-blocked");
            }
            None => {
                tracing::debug!(domain = %canonical, "Revoke on already-blocked domain, no-op");
            }
        }
        Ok(())
    }

    /// Revoke every live grant. Used at shutdown and by `revoke-all`.
    pub async fn revoke_all(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        for (_, entry) in inner.grants.drain() {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
        self.store.apply(&self.blocked_set(&inner)).await?;
        tracing::info!("All grants revoked, full blocklist restored");
        Ok(())
    }

    /// Revoke every grant attributed to a device. Part of force-block.
    pub async fn revoke_device(&self, device_ip: &str) -> anyhow::Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let domains: Vec<String> = inner
            .grants
            .iter()
            .filter(|(_, e)| e.grant.device_ip == device_ip)
            .map(|(d, _)| d.clone())
            .collect();

        if domains.is_empty() {
            return Ok(domains);
        }

        for domain in &domains {
            if let Some(entry) = inner.grants.remove(domain) {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
            }
        }
        self.store.apply(&self.blocked_set(&inner)).await?;
        tracing::info!(device = %device_ip, ?domains, "Device grants revoked");
        Ok(domains)
    }

    /// Snapshot of live grants, for the status operation.
    pub async fn active(&self) -> Vec<AccessGrant> {
        let inner = self.inner.lock().await;
        let mut grants: Vec<AccessGrant> =
            inner.grants.values().map(|e| e.grant.clone()).collect();
        grants.sort_by(|a, b| a.domain.cmp(&b.domain));
        grants
    }

    /// Whether a live grant exists for the (possibly variant) host.
    pub async fn is_unblocked(&self, host: &str) -> bool {
        let canonical = match self.domains.resolve_conditional(host) {
            Some(d) => d.to_string(),
            None => return false,
        };
        self.inner.lock().await.grants.contains_key(&canonical)
    }

    /// Scheduled re-block. Fires from the grant's timer task.
    ///
    /// The grant id guards against supersession: if a newer grant replaced
    /// this one after the timer was scheduled, the ids differ and the late
    /// timer is a silent no-op rather than an incorrect re-block.
    async fn expire(&self, domain: &str, grant_id: Uuid) {
        let mut inner = self.inner.lock().await;
        match inner.grants.get(domain) {
            Some(entry) if entry.grant.id == grant_id => {}
            _ => {
                tracing::debug!(domain, "Stale expiry for superseded grant, ignored");
                return;
            }
        }

        inner.grants.remove(domain);
        match self.store.apply(&self.blocked_set(&inner)).await {
            Ok(()) => tracing::info!(domain, "Grant expired, domain re-blocked"),
            // No caller to report to. The entry stays removed so the next
            // mutation re-derives and re-applies the correct state.
            Err(e) => tracing::error!(domain, error = %e, "Re-block after expiry failed"),
        }
    }

    fn spawn_expiry(
        self: &Arc<Self>,
        domain: String,
        grant_id: Uuid,
        after: Duration,
    ) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(registry) = registry.upgrade() {
                registry.expire(&domain, grant_id).await;
            }
        })
    }

    /// Derive the blocked set: all managed domains minus those with a live
    /// grant (and their managed www-variants).
    fn blocked_set(&self, inner: &Inner) -> BTreeSet<String> {
        let mut blocked = self.domains.all();
        for domain in inner.grants.keys() {
            blocked.remove(domain);
            if let Some(variant) = self.domains.related(domain) {
                blocked.remove(&variant);
            }
        }
        blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::RecordingReload;
    use tempfile::TempDir;

    fn make_registry(tmp: &TempDir) -> (Arc<GrantRegistry>, std::path::PathBuf) {
        let path = tmp.path().join("blocked_hosts");
        let domains = DomainSets::new(
            &[
                "reddit.com".to_string(),
                "www.reddit.com".to_string(),
                "news.ycombinator.com".to_string(),
            ],
            &["tiktok.com".to_string()],
        );
        let store = BlocklistStore::new(&path, Arc::new(RecordingReload::new()));
        (GrantRegistry::new(domains, store), path)
    }

    fn hosts(path: &std::path::Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_grant_rejects_non_conditional_domains() {
        let tmp = TempDir::new().unwrap();
        let (registry, _) = make_registry(&tmp);

        for domain in ["tiktok.com", "unmanaged.example"] {
            let err = registry
                .grant(domain, ScopePattern::unrestricted(), 30, "10.0.0.2", None, "x")
                .await
                .unwrap_err();
            assert!(matches!(err, GrantError::InvalidDomain(_)));
        }
    }

    #[tokio::test]
    async fn test_grant_unblocks_domain_and_www_variant() {
        let tmp = TempDir::new().unwrap();
        let (registry, path) = make_registry(&tmp);
        registry.initialize().await.unwrap();
        assert!(hosts(&path).contains("0.0.0.0 reddit.com"));

        registry
            .grant("www.reddit.com", ScopePattern::unrestricted(), 30, "10.0.0.2", None, "x")
            .await
            .unwrap();

        let content = hosts(&path);
        assert!(!content.contains("0.0.0.0 reddit.com\n"));
        assert!(!content.contains("0.0.0.0 www.reddit.com\n"));
        assert!(content.contains("0.0.0.0 tiktok.com"));
        assert!(registry.is_unblocked("reddit.com").await);
        assert!(registry.is_unblocked("www.reddit.com").await);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (registry, path) = make_registry(&tmp);
        registry.initialize().await.unwrap();

        registry
            .grant("reddit.com", ScopePattern::unrestricted(), 30, "10.0.0.2", None, "x")
            .await
            .unwrap();
        registry.revoke("reddit.com").await.unwrap();
        assert!(hosts(&path).contains("0.0.0.0 reddit.com"));

        // Already blocked: still a success
        registry.revoke("reddit.com").await.unwrap();
        assert!(!registry.is_unblocked("reddit.com").await);
    }

    #[tokio::test]
    async fn test_second_grant_replaces_first() {
        let tmp = TempDir::new().unwrap();
        let (registry, _) = make_registry(&tmp);
        registry.initialize().await.unwrap();

        let first = registry
            .grant("reddit.com", ScopePattern::parse(Some("/r/esp32/*")), 10, "10.0.0.2", None, "a")
            .await
            .unwrap();
        let second = registry
            .grant("reddit.com", ScopePattern::parse(Some("/r/rust/*")), 45, "10.0.0.3", None, "b")
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        let active = registry.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].scope.as_str(), Some("/r/rust/*"));
        assert_eq!(active[0].device_ip, "10.0.0.3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_reblocks_automatically() {
        let tmp = TempDir::new().unwrap();
        let (registry, path) = make_registry(&tmp);
        registry.initialize().await.unwrap();

        registry
            .grant("reddit.com", ScopePattern::unrestricted(), 30, "10.0.0.2", None, "x")
            .await
            .unwrap();
        assert!(!hosts(&path).contains("0.0.0.0 reddit.com\n"));

        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        assert!(registry.is_unblocked("reddit.com").await);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert!(!registry.is_unblocked("reddit.com").await);
        assert!(hosts(&path).contains("0.0.0.0 reddit.com\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_expiry_does_not_reblock_newer_grant() {
        let tmp = TempDir::new().unwrap();
        let (registry, path) = make_registry(&tmp);
        registry.initialize().await.unwrap();

        // Grant A expires at T+10min
        registry
            .grant("reddit.com", ScopePattern::unrestricted(), 10, "10.0.0.2", None, "a")
            .await
            .unwrap();

        // Before T1, grant B replaces it, expiring at T+5+45min
        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        registry
            .grant("reddit.com", ScopePattern::unrestricted(), 45, "10.0.0.2", None, "b")
            .await
            .unwrap();

        // Past grant A's original deadline: B must still be live
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert!(registry.is_unblocked("reddit.com").await);
        assert!(!hosts(&path).contains("0.0.0.0 reddit.com\n"));

        // Past B's deadline: blocked again
        tokio::time::sleep(Duration::from_secs(45 * 60)).await;
        assert!(!registry.is_unblocked("reddit.com").await);
        assert!(hosts(&path).contains("0.0.0.0 reddit.com\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_replacement_restores_previous_grant_with_expiry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blocked_hosts");
        let domains = DomainSets::new(&["reddit.com".to_string()], &[]);
        let signal = Arc::new(RecordingReload::new());
        let store = BlocklistStore::new(&path, signal.clone());
        let registry = GrantRegistry::new(domains, store);
        registry.initialize().await.unwrap();

        let first = registry
            .grant("reddit.com", ScopePattern::unrestricted(), 10, "10.0.0.2", None, "a")
            .await
            .unwrap();

        // Replacement attempt fails at the store
        signal.set_failing(true);
        let err = registry
            .grant("reddit.com", ScopePattern::unrestricted(), 45, "10.0.0.3", None, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::StoreWriteFailed(_)));
        signal.set_failing(false);

        // The first grant survives, with its identity intact
        let active = registry.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
        assert!(registry.is_unblocked("reddit.com").await);

        // And it must still expire on its original schedule
        tokio::time::sleep(Duration::from_secs(11 * 60)).await;
        assert!(!registry.is_unblocked("reddit.com").await);
        assert!(hosts(&path).contains("0.0.0.0 reddit.com\n"));
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_grant() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blocked_hosts");
        let domains = DomainSets::new(&["reddit.com".to_string()], &[]);
        let signal = Arc::new(RecordingReload::new());
        let store = BlocklistStore::new(&path, signal.clone());
        let registry = GrantRegistry::new(domains, store);
        registry.initialize().await.unwrap();

        signal.set_failing(true);
        let err = registry
            .grant("reddit.com", ScopePattern::unrestricted(), 30, "10.0.0.2", None, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::StoreWriteFailed(_)));
        assert!(!registry.is_unblocked("reddit.com").await);
        assert!(registry.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_device_removes_only_that_devices_grants() {
        let tmp = TempDir::new().unwrap();
        let (registry, _) = make_registry(&tmp);
        registry.initialize().await.unwrap();

        registry
            .grant("reddit.com", ScopePattern::unrestricted(), 30, "10.0.0.2", None, "x")
            .await
            .unwrap();
        registry
            .grant("news.ycombinator.com", ScopePattern::unrestricted(), 30, "10.0.0.3", None, "y")
            .await
            .unwrap();

        let revoked = registry.revoke_device("10.0.0.2").await.unwrap();
        assert_eq!(revoked, vec!["reddit.com".to_string()]);
        assert!(!registry.is_unblocked("reddit.com").await);
        assert!(registry.is_unblocked("news.ycombinator.com").await);
    }
}
