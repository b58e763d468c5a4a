//! Hosts-file rendering and atomic application.

use crate::blocklist::ReloadSignal;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HOSTS_HEADER: &str = "# Managed by gatewarden - do not edit by hand\n";

/// Writes the blocked-domain set to the dnsmasq hosts file.
pub struct BlocklistStore {
    hosts_path: PathBuf,
    signal: Arc<dyn ReloadSignal>,
}

impl BlocklistStore {
    pub fn new(hosts_path: impl AsRef<Path>, signal: Arc<dyn ReloadSignal>) -> Self {
        Self {
            hosts_path: hosts_path.as_ref().to_path_buf(),
            signal,
        }
    }

    /// Render the hosts-format content for a blocked set.
    ///
    /// Pure and deterministic: fixed header, one `0.0.0.0 domain` directive
    /// per blocked domain, lexicographic order. The same set always renders
    /// to the same bytes so tests and diffs are stable.
    pub fn render(blocked: &BTreeSet<String>) -> String {
        let mut out = String::from(HOSTS_HEADER);
        for domain in blocked {
            out.push_str("0.0.0.0 ");
            out.push_str(domain);
            out.push('\n');
        }
        out
    }

    /// Write the rendered set atomically and signal the resolver.
    ///
    /// The file is written to a temp file in the same directory and renamed
    /// into place, so the reloading daemon never sees a partial file. Any
    /// write or signal failure propagates to the caller; the requested state
    /// is not considered applied until both steps succeed.
    pub async fn apply(&self, blocked: &BTreeSet<String>) -> Result<()> {
        let content = Self::render(blocked);
        self.write_atomic(&content).with_context(|| {
            format!(
                "Failed to write blocklist: {}",
                self.hosts_path.display()
            )
        })?;

        self.signal
            .reload()
            .await
            .context("Blocklist written but resolver reload failed")?;

        tracing::info!(domains = blocked.len(), "Applied blocklist");
        Ok(())
    }

    fn write_atomic(&self, content: &str) -> Result<()> {
        let dir = self
            .hosts_path
            .parent()
            .context("Hosts path has no parent directory")?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.hosts_path)
            .map_err(|e| e.error)
            .context("Failed to move blocklist into place")?;
        Ok(())
    }

    pub fn hosts_path(&self) -> &Path {
        &self.hosts_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::RecordingReload;
    use tempfile::TempDir;

    fn set(domains: &[&str]) -> BTreeSet<String> {
        domains.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_render_is_sorted_and_deterministic() {
        let blocked = set(&["zzz.example", "aaa.example", "mmm.example"]);
        let rendered = BlocklistStore::render(&blocked);
        assert_eq!(
            rendered,
            "# Managed by gatewarden - do not edit by hand\n\
             0.0.0.0 aaa.example\n\
             0.0.0.0 mmm.example\n\
             0.0.0.0 zzz.example\n"
        );
        assert_eq!(rendered, BlocklistStore::render(&blocked));
    }

    #[test]
    fn test_render_empty_set() {
        let rendered = BlocklistStore::render(&BTreeSet::new());
        assert_eq!(rendered, HOSTS_HEADER);
    }

    #[tokio::test]
    async fn test_apply_writes_file_and_signals() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blocked_hosts");
        let signal = Arc::new(RecordingReload::new());
        let store = BlocklistStore::new(&path, signal.clone());

        store.apply(&set(&["reddit.com"])).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("0.0.0.0 reddit.com"));
        assert_eq!(signal.reload_count(), 1);

        // A second apply replaces the file wholesale
        store.apply(&set(&["tiktok.com"])).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("reddit.com"));
        assert!(content.contains("0.0.0.0 tiktok.com"));
        assert_eq!(signal.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_apply_surfaces_signal_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blocked_hosts");
        let signal = Arc::new(RecordingReload::new());
        signal.set_failing(true);
        let store = BlocklistStore::new(&path, signal.clone());

        let err = store.apply(&set(&["reddit.com"])).await.unwrap_err();
        assert!(err.to_string().contains("resolver reload failed"));
        assert_eq!(signal.reload_count(), 0);
    }
}
