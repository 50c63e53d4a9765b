//! Payment gateway configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Payment gateway configuration (Mercado Pago)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// API access token; `TEST-` prefixed tokens hit the sandbox
    pub access_token: String,

    /// Shared secret the provider signs webhook deliveries with
    pub webhook_secret: String,

    /// Provider API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    /// Check if using sandbox credentials
    pub fn is_test_mode(&self) -> bool {
        self.access_token.starts_with("TEST-")
    }

    /// Get the request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate gateway configuration
    ///
    /// Production additionally requires an HTTPS base URL, so a staging
    /// proxy misconfiguration cannot leak the bearer token in clear text.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.access_token.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_ACCESS_TOKEN"));
        }
        if self.webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_WEBHOOK_SECRET"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if *environment == Environment::Production && !self.base_url.starts_with("https://") {
            return Err(ValidationError::GatewayMustBeHttps);
        }
        if self.timeout_secs == 0 || self.timeout_secs > 60 {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.mercadopago.com".to_string()
}

fn default_timeout() -> u64 {
    10
}
