use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// How much work one database transaction covers during a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchIsolation {
    /// One transaction for the whole batch. A critical failure on any
    /// subscription rolls back every write made by the batch.
    #[default]
    SingleTransaction,
    /// Each subscription is re-read, settled and recorded in its own
    /// transaction. A critical failure rolls back only that subscription
    /// and stops the batch; earlier subscriptions stay committed.
    PerSubscription,
}

impl std::str::FromStr for BatchIsolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" | "single_transaction" => Ok(Self::SingleTransaction),
            "per-subscription" | "per_subscription" => Ok(Self::PerSubscription),
            other => Err(format!("unknown isolation '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub isolation: BatchIsolation,
    /// Fixed seed for backoff jitter. `None` seeds from OS entropy.
    pub jitter_seed: Option<u64>,
}

impl EngineConfig {
    /// Load from `<config_dir>/engine.json`.
    /// In tests, use EngineConfig::default_test().
    pub fn load(config_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{config_dir}/engine.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let r = &self.retry;
        if r.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if r.base_delay_ms > r.max_delay_ms {
            anyhow::bail!("retry.base_delay_ms exceeds retry.max_delay_ms");
        }
        if !(r.jitter_min > 0.0 && r.jitter_min <= r.jitter_max) {
            anyhow::bail!("retry jitter range [{}, {}] is invalid", r.jitter_min, r.jitter_max);
        }
        Ok(())
    }

    /// Production retry policy with a fixed jitter seed, for use in tests.
    pub fn default_test() -> Self {
        Self {
            retry: RetryPolicy::default(),
            isolation: BatchIsolation::SingleTransaction,
            jitter_seed: Some(0x5EED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "isolation": "per_subscription" }"#).unwrap();
        assert_eq!(cfg.isolation, BatchIsolation::PerSubscription);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.jitter_seed, None);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut cfg = EngineConfig::default_test();
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load("/definitely/not/here").unwrap_err();
        assert!(err.to_string().contains("engine.json"));
    }
}
