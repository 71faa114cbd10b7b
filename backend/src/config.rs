use std::env;
use std::path::PathBuf;

use draw_core::{SeedConfig, SeedStrategy};
use serde::de::{value, IntoDeserializer};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SEED_RETRIES: usize = 3;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub admin_password: String,
    pub persist_path: Option<PathBuf>,
    /// Extra whole-draw attempts after an exhausted search.
    pub seed_retries: usize,
    pub seed: SeedConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            admin_password: "changeme".to_string(),
            persist_path: None,
            seed_retries: DEFAULT_SEED_RETRIES,
            seed: SeedConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let seed = SeedConfig {
            max_tier_attempts: parse_var("SEED_TIER_ATTEMPTS")
                .unwrap_or(defaults.seed.max_tier_attempts),
            max_shuffle_attempts: parse_var("SEED_SHUFFLE_ATTEMPTS")
                .unwrap_or(defaults.seed.max_shuffle_attempts),
            strategy: env::var("SEED_STRATEGY")
                .ok()
                .map(|raw| {
                    parse_strategy(&raw).unwrap_or_else(|err| {
                        warn!("unknown SEED_STRATEGY {raw:?}: {err}");
                        SeedStrategy::default()
                    })
                })
                .unwrap_or_default(),
        };

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            persist_path: env::var("PERSIST_PATH").ok().map(PathBuf::from),
            seed_retries: parse_var("SEED_RETRIES").unwrap_or(defaults.seed_retries),
            seed,
        }
    }
}

fn parse_var(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_strategy(raw: &str) -> Result<SeedStrategy, value::Error> {
    let de: value::StrDeserializer<'_, value::Error> = raw.trim().into_deserializer();
    SeedStrategy::deserialize(de)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_are_snake_case() {
        assert_eq!(parse_strategy("rotation"), Ok(SeedStrategy::Rotation));
        assert_eq!(parse_strategy(" rejection "), Ok(SeedStrategy::Rejection));
        assert!(parse_strategy("Rotation").is_err());
        assert!(parse_strategy("cyclic").is_err());
    }
}
