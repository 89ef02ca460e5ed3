use std::path::PathBuf;
use std::time::Duration;

use portal_core::sla::DEFAULT_REFRESH;
use portal_locale::MarketCode;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_MAX_DRAFTS: usize = 256;
pub const DEFAULT_DRAFT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Runtime settings, read from `PORTAL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub workspace_root: PathBuf,
    pub fixtures_dir: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub default_market: MarketCode,
    pub locales_path: Option<PathBuf>,
    pub sla_refresh: Duration,
    /// Shift fixture timestamps so the recorded snapshot reads as "now".
    pub rebase_fixtures: bool,
    pub max_drafts: usize,
    /// Idle time after which an unsubmitted draft is dropped.
    pub draft_ttl: Duration,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace_root = lookup("PORTAL_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let fixtures_dir = lookup("PORTAL_FIXTURES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("fixtures"));
        let default_market = match lookup("PORTAL_DEFAULT_MARKET") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(%err, "ignoring PORTAL_DEFAULT_MARKET");
                MarketCode::Us
            }),
            None => MarketCode::Us,
        };
        Self {
            fixtures_dir,
            bind_addr: lookup("PORTAL_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port: lookup("PORTAL_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            default_market,
            locales_path: lookup("PORTAL_LOCALES_PATH").map(PathBuf::from),
            sla_refresh: lookup("PORTAL_SLA_REFRESH_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REFRESH),
            rebase_fixtures: lookup("PORTAL_REBASE_FIXTURES")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(true),
            max_drafts: lookup("PORTAL_MAX_DRAFTS")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_DRAFTS),
            draft_ttl: lookup("PORTAL_DRAFT_TTL_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DRAFT_TTL),
            workspace_root,
        }
    }

    /// Defaults rooted at `workspace_root`, ignoring the environment.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self::from_lookup(|key| {
            (key == "PORTAL_WORKSPACE_ROOT").then(|| workspace_root.display().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_environment() {
        let config = PortalConfig::from_lookup(|_| None);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.fixtures_dir, PathBuf::from("./fixtures"));
        assert_eq!(config.default_market, MarketCode::Us);
        assert_eq!(config.sla_refresh, Duration::from_secs(60));
        assert!(config.rebase_fixtures);
        assert_eq!(config.locales_path, None);
        assert_eq!(config.max_drafts, DEFAULT_MAX_DRAFTS);
        assert_eq!(config.draft_ttl, DEFAULT_DRAFT_TTL);
    }

    #[test]
    fn overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("PORTAL_WORKSPACE_ROOT", "/srv/portal"),
            ("PORTAL_WEB_PORT", "not-a-port"),
            ("PORTAL_DEFAULT_MARKET", "de"),
            ("PORTAL_SLA_REFRESH_SECS", "0"),
            ("PORTAL_REBASE_FIXTURES", "false"),
            ("PORTAL_MAX_DRAFTS", "0"),
            ("PORTAL_DRAFT_TTL_SECS", "600"),
        ]
        .into_iter()
        .collect();
        let config = PortalConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.fixtures_dir, PathBuf::from("/srv/portal/fixtures"));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.default_market, MarketCode::De);
        assert_eq!(config.sla_refresh, DEFAULT_REFRESH);
        assert!(!config.rebase_fixtures);
        assert_eq!(config.max_drafts, DEFAULT_MAX_DRAFTS);
        assert_eq!(config.draft_ttl, Duration::from_secs(600));
    }
}
