//! YAML configuration for the gatewarden daemon.
//!
//! One file describes everything the daemon needs: the managed domain sets,
//! the dnsmasq hosts file it owns, the device map, the reasoning provider,
//! and the Home Assistant connection for room lookups.
//!
//! Secrets (`anthropic.api_key`, `homeassistant.token`) can be overridden
//! with the `ANTHROPIC_API_KEY` and `HA_TOKEN` environment variables so the
//! file itself can be checked in without them.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub dnsmasq: DnsmasqConfig,
    pub domains: DomainConfig,
    #[serde(default)]
    pub devices: HashMap<String, DeviceConfig>,
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub homeassistant: Option<HomeAssistantConfig>,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8377
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsmasqConfig {
    /// The hosts-format file gatewarden owns, e.g. /etc/dnsmasq.d/blocked_hosts
    pub blocked_hosts_path: PathBuf,
    /// Command run after every successful write to make the resolver reload.
    /// An empty list disables signaling (dry runs).
    #[serde(default = "default_reload_command")]
    pub reload_command: Vec<String>,
}

fn default_reload_command() -> Vec<String> {
    vec!["pkill".into(), "-HUP".into(), "dnsmasq".into()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    /// Blocked by default, eligible for temporary grants.
    pub conditional: Vec<String>,
    /// Never eligible for a grant.
    #[serde(default)]
    pub always_blocked: Vec<String>,
}

/// Per-device entry keyed by IP address in the `devices` map.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    /// Home Assistant entity that reports the device's current room.
    #[serde(default)]
    pub room_entity: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeAssistantConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_ha_timeout")]
    pub timeout_secs: u64,
}

fn default_ha_timeout() -> u64 {
    10
}

/// Relax-window schedule, fed verbatim into the decision prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub relax_windows: HashMap<String, RelaxWindow>,
    #[serde(default)]
    pub relax_rooms: Vec<String>,
}

/// A daily time window, "HH:MM" to "HH:MM".
#[derive(Debug, Clone, Deserialize)]
pub struct RelaxWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryConfig {
    /// Directory for the JSONL request log. Defaults to ~/.gatewarden/history
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse a YAML config string, apply env overrides, and validate.
    pub fn parse(yaml: &str) -> Result<Self> {
        let mut config: Config =
            serde_yaml::from_str(yaml).context("Invalid YAML syntax in config file")?;

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            config.anthropic.api_key = key;
        }
        if let Ok(token) = std::env::var("HA_TOKEN") {
            if let Some(ha) = config.homeassistant.as_mut() {
                ha.token = token;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.domains.conditional.is_empty() {
            bail!("Config must list at least one conditional domain");
        }
        for d in self
            .domains
            .conditional
            .iter()
            .chain(self.domains.always_blocked.iter())
        {
            if d.trim().is_empty() || d.contains('/') || d.contains(' ') {
                bail!("Invalid domain in config: {:?}", d);
            }
        }
        let overlap: Vec<&String> = self
            .domains
            .conditional
            .iter()
            .filter(|d| self.domains.always_blocked.contains(d))
            .collect();
        if !overlap.is_empty() {
            bail!(
                "Domains listed as both conditional and always_blocked: {:?}",
                overlap
            );
        }
        Ok(())
    }

    /// Resolved history directory.
    pub fn history_dir(&self) -> Result<PathBuf> {
        match &self.history.dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let home = dirs::home_dir().context("Could not determine home directory")?;
                Ok(home.join(".gatewarden").join("history"))
            }
        }
    }

    /// Build the immutable domain-set view used by the registry and service.
    pub fn domain_sets(&self) -> DomainSets {
        DomainSets::new(&self.domains.conditional, &self.domains.always_blocked)
    }
}

/// The two managed domain sets, frozen at startup.
///
/// Lookups fold www-variants: a request for `www.reddit.com` resolves to a
/// conditional entry `reddit.com` and vice versa, and a grant for either
/// also uncovers the other when both are managed.
#[derive(Debug, Clone)]
pub struct DomainSets {
    conditional: BTreeSet<String>,
    always_blocked: BTreeSet<String>,
}

impl DomainSets {
    pub fn new(conditional: &[String], always_blocked: &[String]) -> Self {
        Self {
            conditional: conditional.iter().map(|d| d.to_ascii_lowercase()).collect(),
            always_blocked: always_blocked
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Every managed domain, blocked unless a live grant says otherwise.
    pub fn all(&self) -> BTreeSet<String> {
        self.conditional
            .union(&self.always_blocked)
            .cloned()
            .collect()
    }

    pub fn conditional(&self) -> &BTreeSet<String> {
        &self.conditional
    }

    /// Map a requested host to its conditional entry, folding www-variants.
    /// Returns None for always-blocked and unmanaged hosts.
    pub fn resolve_conditional(&self, host: &str) -> Option<&str> {
        let host = host.to_ascii_lowercase();
        if let Some(d) = self.conditional.get(host.as_str()) {
            return Some(d);
        }
        for variant in www_variants(&host) {
            if let Some(d) = self.conditional.get(variant.as_str()) {
                return Some(d);
            }
        }
        None
    }

    pub fn is_always_blocked(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.always_blocked.contains(host.as_str()) {
            return true;
        }
        www_variants(&host)
            .into_iter()
            .any(|v| self.always_blocked.contains(v.as_str()))
    }

    /// The managed www/non-www sibling of a domain, if there is one.
    pub fn related(&self, domain: &str) -> Option<String> {
        let all = self.all();
        www_variants(domain)
            .into_iter()
            .find(|v| all.contains(v.as_str()))
    }
}

fn www_variants(domain: &str) -> Vec<String> {
    match domain.strip_prefix("www.") {
        Some(base) => vec![base.to_string()],
        None => vec![format!("www.{}", domain)],
    }
}
