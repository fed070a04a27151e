//! Server configuration from environment variables.

use std::time::Duration;

use tracing::warn;

const DEFAULT_PORT: u16 = 3030;
/// Empty rooms idle longer than this are destroyed by the sweep.
const DEFAULT_MAX_IDLE_SECS: u64 = 30 * 60;
/// How often the sweep runs.
const DEFAULT_SWEEP_SECS: u64 = 5 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub max_idle: Duration,
    pub sweep_every: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            max_idle: Duration::from_secs(env_parse("SKETCHROOM_IDLE_SECS", DEFAULT_MAX_IDLE_SECS)),
            sweep_every: Duration::from_secs(env_parse("SKETCHROOM_SWEEP_SECS", DEFAULT_SWEEP_SECS)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_idle: Duration::from_secs(DEFAULT_MAX_IDLE_SECS),
            sweep_every: Duration::from_secs(DEFAULT_SWEEP_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("ignoring unparseable {key}={raw:?}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sweep_policy() {
        let config = Config::default();
        assert_eq!(config.max_idle, Duration::from_secs(1800));
        assert_eq!(config.sweep_every, Duration::from_secs(300));
    }
}
