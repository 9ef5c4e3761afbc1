//! Sizing configuration for the state store's memory pools (§10.3).
//!
//! Loaded the same way the teacher's renderer loads its settings (`config::Config::builder()`
//! layering defaults, an optional file, then environment) but with a much smaller surface: this
//! crate has no feature flags that would change documented semantics, only capacity hints.

use config::{Config, ConfigError, Environment, File};

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    pub default_pool_capacity_hint: usize,
    pub max_tracked_pools: usize,
}

impl Default for ReplayConfig {
    fn default() -> ReplayConfig {
        ReplayConfig {
            default_pool_capacity_hint: 64 * 1024,
            max_tracked_pools: 256,
        }
    }
}

impl ReplayConfig {
    /// Layers `replay.toml` (if present) and `REPLAY_*` environment variables over the defaults.
    pub fn load() -> Result<ReplayConfig, ConfigError> {
        let mut cfg = Config::new();
        cfg.set_default("default_pool_capacity_hint", 64 * 1024_i64)?;
        cfg.set_default("max_tracked_pools", 256_i64)?;
        cfg.merge(File::with_name("replay.toml").required(false))?;
        cfg.merge(Environment::with_prefix("REPLAY"))?;

        Ok(ReplayConfig {
            default_pool_capacity_hint: cfg.get_int("default_pool_capacity_hint")? as usize,
            max_tracked_pools: cfg.get_int("max_tracked_pools")? as usize,
        })
    }
}
