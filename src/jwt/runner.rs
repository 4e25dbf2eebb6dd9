//! JWT Runner (spec §4.6): adapts [`Authenticator`] to the [`crate::runner::Runner`]
//! contract. `failOnError` governs whether a validation failure propagates or is swallowed
//! after the failure metadata has already been applied.

use crate::error::RunnerError;
use crate::jwt::authenticator::{Authenticator, AuthenticatorConfig};
use crate::jwt::jwks::JwksClient;
use crate::jwt::validator::{Validator, ValidatorConfig};
use crate::message::Message;
use crate::runner::{Runner, StopSignal};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration;

/// `JwtRunnerConfig` construction input (spec §6 "JWT config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtRunnerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_token_metadata_key")]
    pub token_metadata_key: String,
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
    pub jwks_url: Option<String>,
    #[serde(default = "default_refresh_interval", with = "duration")]
    pub jwks_refresh_interval: Duration,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    #[serde(default)]
    pub required_claims: Vec<String>,
    #[serde(default = "default_claim_prefix")]
    pub claim_prefix: String,
    #[serde(default = "default_fail_on_error")]
    pub fail_on_error: bool,
    #[serde(default = "default_allowed_algorithms")]
    pub allowed_algorithms: Vec<String>,
    #[serde(default = "default_clock_skew", with = "duration")]
    pub clock_skew: Duration,
}

fn default_token_metadata_key() -> String {
    "authorization".to_string()
}
fn default_token_prefix() -> String {
    "Bearer ".to_string()
}
fn default_refresh_interval() -> Duration {
    Duration::from_secs(3600)
}
fn default_claim_prefix() -> String {
    "jwt_".to_string()
}
fn default_fail_on_error() -> bool {
    true
}
fn default_allowed_algorithms() -> Vec<String> {
    vec![
        "RS256".into(),
        "RS384".into(),
        "RS512".into(),
        "ES256".into(),
        "ES384".into(),
        "ES512".into(),
    ]
}
fn default_clock_skew() -> Duration {
    Duration::from_secs(60)
}

pub struct JwtRunner {
    authenticator: Authenticator,
    fail_on_error: bool,
    stop: StopSignal,
}

impl JwtRunner {
    /// Construct from validated configuration. Fails if `enabled` but `jwksUrl`/`issuer`/
    /// `audience` are missing, or if the JWKS client's initial fetch fails (spec §4.4/§4.5).
    pub fn new(config: JwtRunnerConfig) -> Result<Self, RunnerError> {
        const COMPONENT: &str = "jwt_runner";
        if !config.enabled {
            return Err(RunnerError::config_invalid(COMPONENT, "jwt runner constructed while disabled"));
        }
        let jwks_url = config
            .jwks_url
            .ok_or_else(|| RunnerError::config_invalid(COMPONENT, "jwksUrl is required when enabled"))?;
        let issuer = config
            .issuer
            .ok_or_else(|| RunnerError::config_invalid(COMPONENT, "issuer is required when enabled"))?;
        let audience = config
            .audience
            .ok_or_else(|| RunnerError::config_invalid(COMPONENT, "audience is required when enabled"))?;

        let jwks = JwksClient::new(jwks_url, config.jwks_refresh_interval)?;

        let validator_config = ValidatorConfig {
            issuer,
            audience,
            allowed_algorithms: config.allowed_algorithms,
            clock_skew: config.clock_skew,
            token_prefix: config.token_prefix,
            required_claims: config.required_claims,
        };

        let authenticator_config = AuthenticatorConfig {
            token_metadata_key: config.token_metadata_key,
            claim_prefix: config.claim_prefix,
        };

        Ok(JwtRunner {
            authenticator: Authenticator::new(authenticator_config, Validator::new(validator_config, jwks)),
            fail_on_error: config.fail_on_error,
            stop: StopSignal::new(),
        })
    }
}

impl Runner for JwtRunner {
    fn process(&self, msg: &mut Message) -> Result<(), RunnerError> {
        const COMPONENT: &str = "jwt_runner";
        if self.stop.is_stopped() {
            return Err(RunnerError::stopped(COMPONENT));
        }
        match self.authenticator.authenticate(msg) {
            Ok(()) => Ok(()),
            Err(e) if self.fail_on_error => Err(e),
            Err(_) => Ok(()),
        }
    }

    fn close(&self) -> Result<(), RunnerError> {
        self.authenticator.close();
        self.stop.close();
        Ok(())
    }
}
