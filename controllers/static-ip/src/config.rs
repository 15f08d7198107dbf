//! Controller configuration from environment variables.

use crate::error::ControllerError;
use ipam::IpamType;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings of the controller
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch, all namespaces when unset
    pub watch_namespace: Option<String>,

    /// IPAM backend used for every allocation
    pub ipam_type: IpamType,

    /// Resync interval after a successful reconcile
    pub sync_period: Duration,

    /// Requeue delay while a pool or claim is pending
    pub pending_requeue: Duration,

    /// Concurrent reconciles per watched kind
    pub max_concurrent_reconciles: u16,

    /// Quiet period before a burst of events is reconciled
    pub debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            ipam_type: IpamType::Metal3io,
            sync_period: Duration::from_secs(600),
            pending_requeue: Duration::from_secs(30),
            max_concurrent_reconciles: 2,
            debounce: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`; unset and empty variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let ipam_type = match get("IPAM_TYPE") {
            Some(value) => IpamType::from_str(&value)
                .map_err(|e| ControllerError::InvalidConfig(format!("IPAM_TYPE: {e}")))?,
            None => defaults.ipam_type,
        };

        let max_concurrent_reconciles = parse(&get, "MAX_CONCURRENT_RECONCILES")?
            .unwrap_or(defaults.max_concurrent_reconciles);
        if max_concurrent_reconciles == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            watch_namespace: get("WATCH_NAMESPACE"),
            ipam_type,
            sync_period: parse_secs(&get, "SYNC_PERIOD_SECS")?.unwrap_or(defaults.sync_period),
            pending_requeue: parse_secs(&get, "PENDING_REQUEUE_SECS")?
                .unwrap_or(defaults.pending_requeue),
            max_concurrent_reconciles,
            debounce: parse_secs(&get, "DEBOUNCE_SECS")?.unwrap_or(defaults.debounce),
        })
    }
}

fn parse<T, G>(get: &G, name: &str) -> Result<Option<T>, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|value| {
            value.parse::<T>().map_err(|e| {
                ControllerError::InvalidConfig(format!("{name}={value}: {e}"))
            })
        })
        .transpose()
}

fn parse_secs<G>(get: &G, name: &str) -> Result<Option<Duration>, ControllerError>
where
    G: Fn(&str) -> Option<String>,
{
    match parse::<u64, G>(get, name)? {
        Some(0) => Err(ControllerError::InvalidConfig(format!("{name} must be positive"))),
        other => Ok(other.map(Duration::from_secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert!(config.watch_namespace.is_none());
        assert_eq!(config.ipam_type, IpamType::Metal3io);
        assert_eq!(config.sync_period, Duration::from_secs(600));
        assert_eq!(config.pending_requeue, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_reconciles, 2);
        assert_eq!(config.debounce, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("WATCH_NAMESPACE", "capi-system"),
            ("IPAM_TYPE", "metal3io"),
            ("SYNC_PERIOD_SECS", "120"),
            ("PENDING_REQUEUE_SECS", "15"),
            ("MAX_CONCURRENT_RECONCILES", "8"),
        ])
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("capi-system"));
        assert_eq!(config.sync_period, Duration::from_secs(120));
        assert_eq!(config.pending_requeue, Duration::from_secs(15));
        assert_eq!(config.max_concurrent_reconciles, 8);
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = config(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_invalid_values() {
        for vars in [
            [("IPAM_TYPE", "infoblox")],
            [("SYNC_PERIOD_SECS", "ten")],
            [("PENDING_REQUEUE_SECS", "0")],
            [("MAX_CONCURRENT_RECONCILES", "0")],
            [("MAX_CONCURRENT_RECONCILES", "-1")],
        ] {
            assert!(
                matches!(config(&vars), Err(ControllerError::InvalidConfig(_))),
                "{vars:?} should be rejected"
            );
        }
    }
}
