//! Supervisor configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tunnel_warden_dns::DnsConfig;

#[cfg(windows)]
const DEFAULT_BINARY: &str = "openvpn/openvpn.exe";
#[cfg(not(windows))]
const DEFAULT_BINARY: &str = "openvpn/openvpn";

#[cfg(windows)]
const DEFAULT_HELPER: &str = "openvpn.daemon.exe";
#[cfg(not(windows))]
const DEFAULT_HELPER: &str = "openvpn.daemon";

#[cfg(windows)]
const DEFAULT_ADAPTER_PREFIX: &str = "TAP-Windows";
#[cfg(not(windows))]
const DEFAULT_ADAPTER_PREFIX: &str = "tap";

/// Extension of tunnel configuration files.
pub const CONFIG_EXTENSION: &str = "ovpn";

/// Paths, process names and delays used by the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory holding tunnel configuration files.
    pub config_dir: PathBuf,
    /// Append-only log file for process output and lifecycle lines.
    pub log_file: PathBuf,
    /// VPN client executable.
    pub binary: PathBuf,
    /// Auxiliary service process terminated by name around start and stop.
    pub helper_process: String,
    /// Name prefix of virtual tunnel adapters.
    pub adapter_prefix: String,
    /// Delay between process exit and adapter inspection.
    pub adapter_settle_delay: Duration,
    /// Delay between interrupt and the liveness check.
    pub liveness_delay: Duration,
    /// How long exit reporting waits for output relays to drain.
    pub relay_drain_timeout: Duration,
    /// Dynamic-DNS provider settings.
    pub dns: DnsConfig,
}

impl SupervisorConfig {
    /// Lay out the default files under `home`.
    #[must_use]
    pub fn new(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Self {
            config_dir: home.join("vpn-configs"),
            log_file: home.join("logs").join("vpn-log.txt"),
            binary: home.join(DEFAULT_BINARY),
            helper_process: DEFAULT_HELPER.to_string(),
            adapter_prefix: DEFAULT_ADAPTER_PREFIX.to_string(),
            adapter_settle_delay: Duration::from_secs(1),
            liveness_delay: Duration::from_secs(2),
            relay_drain_timeout: Duration::from_secs(2),
            dns: DnsConfig::default(),
        }
    }

    /// Build from `TUNNEL_WARDEN_*` and `DUCKDNS_*` environment variables.
    ///
    /// `TUNNEL_WARDEN_HOME` defaults to the working directory; every other
    /// path defaults relative to it.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let home = var("TUNNEL_WARDEN_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::new(&home);
        if let Some(dir) = var("TUNNEL_WARDEN_CONFIG_DIR") {
            config.config_dir = PathBuf::from(dir);
        }
        if let Some(file) = var("TUNNEL_WARDEN_LOG_FILE") {
            config.log_file = PathBuf::from(file);
        }
        if let Some(binary) = var("TUNNEL_WARDEN_BINARY") {
            config.binary = PathBuf::from(binary);
        }
        if let Some(helper) = var("TUNNEL_WARDEN_HELPER") {
            config.helper_process = helper;
        }
        if let Some(prefix) = var("TUNNEL_WARDEN_ADAPTER_PREFIX") {
            config.adapter_prefix = prefix;
        }
        config.dns = DnsConfig::from_env();
        config
    }

    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.log_file = file.into();
        self
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_helper_process(mut self, name: impl Into<String>) -> Self {
        self.helper_process = name.into();
        self
    }

    #[must_use]
    pub fn with_adapter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.adapter_prefix = prefix.into();
        self
    }

    /// Override the settle and liveness delays.
    #[must_use]
    pub const fn with_delays(mut self, adapter_settle: Duration, liveness: Duration) -> Self {
        self.adapter_settle_delay = adapter_settle;
        self.liveness_delay = liveness;
        self
    }

    #[must_use]
    pub const fn with_relay_drain_timeout(mut self, timeout: Duration) -> Self {
        self.relay_drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_dns(mut self, dns: DnsConfig) -> Self {
        self.dns = dns;
        self
    }

    /// Process name of the VPN client, used to clear stray instances.
    #[must_use]
    pub fn binary_process_name(&self) -> Option<String> {
        self.binary
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Resolve a configuration identifier to a path inside the config dir.
    ///
    /// Identifiers that are not a plain file name resolve to `None`.
    #[must_use]
    pub fn config_path(&self, config_id: &str) -> Option<PathBuf> {
        let plain = Path::new(config_id)
            .file_name()
            .is_some_and(|name| name == config_id);
        plain.then(|| self.config_dir.join(config_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_live_under_home() {
        let config = SupervisorConfig::new("/srv/vpn");
        assert_eq!(config.config_dir, PathBuf::from("/srv/vpn/vpn-configs"));
        assert_eq!(config.log_file, PathBuf::from("/srv/vpn/logs/vpn-log.txt"));
        assert!(config.binary.starts_with("/srv/vpn/openvpn"));
        assert_eq!(config.adapter_settle_delay, Duration::from_secs(1));
        assert_eq!(config.liveness_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_binary_process_name() {
        let config = SupervisorConfig::new("/srv").with_binary("/opt/bin/openvpn");
        assert_eq!(config.binary_process_name().as_deref(), Some("openvpn"));
    }

    #[test]
    fn test_config_path_rejects_traversal() {
        let config = SupervisorConfig::new("/srv");
        assert_eq!(
            config.config_path("home.ovpn"),
            Some(PathBuf::from("/srv/vpn-configs/home.ovpn"))
        );
        assert_eq!(config.config_path("../secret.ovpn"), None);
        assert_eq!(config.config_path("a/b.ovpn"), None);
        assert_eq!(config.config_path(""), None);
        assert_eq!(config.config_path(".."), None);
    }
}
