//! Dynamic-DNS pre-flight gate.
//!
//! Provides:
//! - `DnsConfig` - Provider endpoint, domain and token
//! - `DnsSyncGate` - One update call reduced to go/no-go

pub mod gate;

pub use gate::{DEFAULT_ENDPOINT, DnsConfig, DnsSyncGate, SUCCESS_TOKEN};
