//! One-shot dynamic-DNS update.
//!
//! Run with: cargo run -p tunnel-warden-daemon --bin update-dns
//!
//! Reads `DUCKDNS_DOMAIN` and `DUCKDNS_TOKEN`; exits non-zero unless the
//! provider answers `OK`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunnel_warden_core::DnsSync;
use tunnel_warden_dns::{DnsConfig, DnsSyncGate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let gate = DnsSyncGate::new(DnsConfig::from_env());
    gate.sync_and_check().await?;
    tracing::info!(endpoint = %gate.config().endpoint, "Dynamic DNS updated");
    Ok(())
}
