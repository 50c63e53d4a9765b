//! Billing policy configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Billing policy knobs
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Transport retry budget for synchronous charges; every attempt
    /// reuses the same idempotency key
    #[serde(default = "default_max_charge_attempts")]
    pub max_charge_attempts: u32,

    /// How often the expiry sweep runs, in seconds
    #[serde(default = "default_sweep_interval")]
    pub expire_sweep_interval_secs: u64,

    /// How long processed webhook deliveries are kept before the sweep
    /// prunes them
    #[serde(default = "default_webhook_retention_days")]
    pub webhook_retention_days: u32,
}

impl BillingConfig {
    /// Get the sweep cadence as Duration
    pub fn expire_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expire_sweep_interval_secs)
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_charge_attempts == 0 || self.max_charge_attempts > 10 {
            return Err(ValidationError::InvalidChargeAttempts);
        }
        if self.expire_sweep_interval_secs < 60 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if self.webhook_retention_days == 0 {
            return Err(ValidationError::InvalidWebhookRetention);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            max_charge_attempts: default_max_charge_attempts(),
            expire_sweep_interval_secs: default_sweep_interval(),
            webhook_retention_days: default_webhook_retention_days(),
        }
    }
}

fn default_max_charge_attempts() -> u32 {
    3
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_webhook_retention_days() -> u32 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_config_defaults() {
        let config = BillingConfig::default();
        assert_eq!(config.max_charge_attempts, 3);
        assert_eq!(config.expire_sweep_interval_secs, 3600);
    }

    #[test]
    fn sweep_interval_converts_to_duration() {
        let config = BillingConfig {
            expire_sweep_interval_secs: 600,
            ..Default::default()
        };
        assert_eq!(config.expire_sweep_interval(), Duration::from_secs(600));
    }

    #[test]
    fn validation_rejects_zero_charge_attempts() {
        let config = BillingConfig {
            max_charge_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_excessive_charge_attempts() {
        let config = BillingConfig {
            max_charge_attempts: 50,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_hot_sweep_loop() {
        let config = BillingConfig {
            expire_sweep_interval_secs: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_webhook_retention() {
        let config = BillingConfig {
            webhook_retention_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_accepts_defaults() {
        assert!(BillingConfig::default().validate().is_ok());
    }
}
