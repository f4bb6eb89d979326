//! Process-wide configuration, loaded once via `figment` the way the
//! reference catalog binary builds its `DynAppConfig`: serialized defaults
//! merged with an environment provider, split on `__`.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub static CONFIG: LazyLock<AppConfig> = LazyLock::new(get_config);

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct AppConfig {
    pub placement: PlacementConfig,
    pub refresh: RefreshConfig,
    pub coalesce: CoalesceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            placement: PlacementConfig::default(),
            refresh: RefreshConfig::default(),
            coalesce: CoalesceConfig::default(),
        }
    }
}

/// Tunables driving [`crate::placement`]'s block classification and replica targets.
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct PlacementConfig {
    /// Target number of good replicas per fragment.
    pub optimal_replicas: usize,
    /// Heartbeat age past which a node's blocks are considered gone for good.
    pub long_gone_threshold_secs: u64,
    /// Heartbeat age past which a node's blocks are considered gone, but still
    /// within the grace period that withholds them from removal.
    pub short_gone_threshold_secs: u64,
    /// `building` age past which an unfinished block is abandoned.
    pub long_build_threshold_secs: u64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            optimal_replicas: 3,
            long_gone_threshold_secs: 3 * 24 * 60 * 60,
            short_gone_threshold_secs: 20 * 60,
            long_build_threshold_secs: 5 * 60,
        }
    }
}

/// Tunables driving [`crate::manager`]'s `Warm`/`Refreshing`/`Loading` age thresholds.
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct RefreshConfig {
    pub start_refresh_threshold_secs: u64,
    pub force_refresh_threshold_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            start_refresh_threshold_secs: 10 * 60,
            force_refresh_threshold_secs: 60 * 60,
        }
    }
}

/// Tunables driving `make_changes_in_background`'s coalescing timer.
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct CoalesceConfig {
    pub interval_secs: u64,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self { interval_secs: 3 }
    }
}

fn get_config() -> AppConfig {
    let defaults = figment::providers::Serialized::defaults(AppConfig::default());

    #[cfg(not(test))]
    let prefixes = &["STORECTL__"];
    #[cfg(test)]
    let prefixes = &["STORECTL_TEST__"];

    let mut config = figment::Figment::from(defaults);
    for prefix in prefixes {
        let env = figment::providers::Env::prefixed(prefix).split("__");
        config = config.merge(env);
    }

    match config.extract::<AppConfig>() {
        Ok(c) => c,
        Err(e) => panic!("Failed to extract storectl-core config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_optimal_replicas_is_three() {
        figment::Jail::expect_with(|_jail| {
            let config = get_config();
            assert_eq!(config.placement.optimal_replicas, 3);
            Ok(())
        });
    }

    #[test]
    fn env_var_overrides_default() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STORECTL_TEST__PLACEMENT__OPTIMAL_REPLICAS", "5");
            let config = get_config();
            assert_eq!(config.placement.optimal_replicas, 5);
            Ok(())
        });
    }
}
