//! Engine configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::{CoreError, Percent};
use domain_claims::WritePolicy;

/// Tunables for the evaluation engine.
///
/// Every field has a default, so a partially specified source deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Firings allowed per rule in the knowledge base before a batch aborts
    pub cycles_per_rule: usize,
    /// Absolute firing ceiling; overrides `cycles_per_rule` when set
    pub max_cycles: Option<usize>,
    /// Default evaluation deadline when the request carries none
    pub evaluation_timeout_ms: Option<u64>,
    /// Upper bound for writes to `CoveragePercent`
    pub coverage_percent_ceiling: Decimal,
    /// Recorded on decision audits when the request names no processor
    pub processed_by: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycles_per_rule: 10,
            max_cycles: None,
            evaluation_timeout_ms: None,
            coverage_percent_ceiling: Decimal::ONE_HUNDRED,
            processed_by: "system".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = Some(max_cycles);
        self
    }

    pub fn with_cycles_per_rule(mut self, cycles_per_rule: usize) -> Self {
        self.cycles_per_rule = cycles_per_rule;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout_ms = Some(timeout.as_millis().min(u64::MAX as u128) as u64);
        self
    }

    pub fn with_coverage_ceiling(mut self, ceiling: Decimal) -> Self {
        self.coverage_percent_ceiling = ceiling;
        self
    }

    /// Maximum number of firings in one batch over `rule_count` rules.
    ///
    /// Never less than one, so a single non-retracting rule can still fire.
    pub fn cycle_ceiling(&self, rule_count: usize) -> usize {
        self.max_cycles
            .unwrap_or_else(|| rule_count.saturating_mul(self.cycles_per_rule))
            .max(1)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy {
            coverage_percent_ceiling: Percent::new(self.coverage_percent_ceiling),
        }
    }

    /// Rejects settings the engine cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cycles_per_rule == 0 && self.max_cycles.is_none() {
            return Err(CoreError::configuration(
                "cycles_per_rule",
                "must be positive when max_cycles is unset",
            ));
        }
        if self.coverage_percent_ceiling <= Decimal::ZERO
            || self.coverage_percent_ceiling > Decimal::ONE_HUNDRED
        {
            return Err(CoreError::configuration(
                "coverage_percent_ceiling",
                format!("must be in (0, 100], got {}", self.coverage_percent_ceiling),
            ));
        }
        if self.processed_by.trim().is_empty() {
            return Err(CoreError::configuration("processed_by", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ceiling_scales_with_rule_count() {
        let config = EngineConfig::default();
        assert_eq!(config.cycle_ceiling(3), 30);
        assert_eq!(config.cycle_ceiling(0), 1);
        assert_eq!(config.clone().with_max_cycles(5).cycle_ceiling(100), 5);
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_cycles": 7}"#).unwrap();
        assert_eq!(config.max_cycles, Some(7));
        assert_eq!(config.cycles_per_rule, 10);
        assert_eq!(config.coverage_percent_ceiling, dec!(100));
        assert_eq!(config.processed_by, "system");
    }

    #[test]
    fn test_validate_rejects_out_of_range_ceiling() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::default().with_coverage_ceiling(dec!(120)).validate().is_err());
        assert!(EngineConfig::default().with_cycles_per_rule(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_cycles_per_rule(0)
            .with_max_cycles(3)
            .validate()
            .is_ok());
    }
}
