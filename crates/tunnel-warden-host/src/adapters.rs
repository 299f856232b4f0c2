//! Virtual tunnel adapter inspection.

use std::{collections::BTreeSet, sync::Arc};

use tunnel_warden_core::{AdapterSource, Verdict};

/// Interface enumeration backed by the OS.
#[derive(Debug, Default, Clone)]
pub struct HostAdapters;

impl AdapterSource for HostAdapters {
    fn interface_names(&self) -> std::io::Result<Vec<String>> {
        // One entry per address; collapse to one per interface.
        let names: BTreeSet<String> = get_if_addrs::get_if_addrs()?
            .into_iter()
            .map(|iface| iface.name)
            .collect();
        Ok(names.into_iter().collect())
    }
}

/// Counts interfaces whose name starts with the tunnel adapter prefix.
#[derive(Clone)]
pub struct AdapterInspector {
    source: Arc<dyn AdapterSource>,
    prefix: String,
}

impl AdapterInspector {
    /// Create an inspector over the given source.
    #[must_use]
    pub fn new(source: Arc<dyn AdapterSource>, prefix: impl Into<String>) -> Self {
        Self {
            source,
            prefix: prefix.into(),
        }
    }

    /// Inspector over the host's real interfaces.
    #[must_use]
    pub fn host(prefix: impl Into<String>) -> Self {
        Self::new(Arc::new(HostAdapters), prefix)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Take a snapshot and classify it.
    ///
    /// An enumeration failure counts as an empty snapshot.
    #[must_use]
    pub fn inspect(&self) -> Verdict {
        let names = match self.source.interface_names() {
            Ok(names) => names,
            Err(e) => {
                tracing::error!("Failed to enumerate network interfaces: {e}");
                Vec::new()
            }
        };
        classify(&names, &self.prefix)
    }
}

/// Classify interface names against a tunnel adapter prefix.
#[must_use]
pub fn classify(names: &[String], prefix: &str) -> Verdict {
    let matching: BTreeSet<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| name.starts_with(prefix))
        .collect();

    if matching.len() > 1 {
        Verdict::MultipleActive {
            count: matching.len(),
            adapters: matching.into_iter().map(str::to_string).collect(),
        }
    } else {
        Verdict::Nominal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAdapters(std::io::Result<Vec<String>>);

    impl AdapterSource for FixedAdapters {
        fn interface_names(&self) -> std::io::Result<Vec<String>> {
            match &self.0 {
                Ok(names) => Ok(names.clone()),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_single_adapter_is_nominal() {
        let verdict = classify(&names(&["lo", "eth0", "TAP-Windows Adapter V9"]), "TAP-Windows");
        assert_eq!(verdict, Verdict::Nominal);
    }

    #[test]
    fn test_no_adapter_is_nominal() {
        assert_eq!(classify(&names(&["lo", "eth0"]), "tap"), Verdict::Nominal);
    }

    #[test]
    fn test_two_adapters_are_multiple_active() {
        let verdict = classify(&names(&["tap0", "eth0", "tap1"]), "tap");
        assert_eq!(
            verdict,
            Verdict::MultipleActive {
                count: 2,
                adapters: names(&["tap0", "tap1"]),
            }
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert_eq!(classify(&names(&["TAP0", "TAP1"]), "tap"), Verdict::Nominal);
    }

    #[test]
    fn test_duplicate_names_count_once() {
        assert_eq!(classify(&names(&["tap0", "tap0"]), "tap"), Verdict::Nominal);
    }

    #[test]
    fn test_inspect_uses_source() {
        let inspector = AdapterInspector::new(
            Arc::new(FixedAdapters(Ok(names(&["tap0", "tap1", "tap2"])))),
            "tap",
        );
        assert_eq!(inspector.prefix(), "tap");
        assert!(matches!(
            inspector.inspect(),
            Verdict::MultipleActive { count: 3, .. }
        ));
    }

    #[test]
    fn test_enumeration_failure_is_nominal() {
        let inspector = AdapterInspector::new(
            Arc::new(FixedAdapters(Err(std::io::Error::other("denied")))),
            "tap",
        );
        assert_eq!(inspector.inspect(), Verdict::Nominal);
    }

    #[test]
    fn test_host_enumeration_succeeds() {
        let names = HostAdapters.interface_names().unwrap();
        let unique: BTreeSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
