//! Validator (spec §4.5): end-to-end JWT verification — prefix trim, header parse,
//! algorithm allow-list, kid lookup with rotation retry, signature check, then standard
//! claim validation with clock-skew tolerance.

use crate::error::RunnerError;
use crate::jwt::jwks::JwksClient;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const COMPONENT: &str = "jwt.validator";

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub issuer: String,
    pub audience: String,
    pub allowed_algorithms: Vec<String>,
    pub clock_skew: Duration,
    pub token_prefix: String,
    pub required_claims: Vec<String>,
}

pub struct Validator {
    config: ValidatorConfig,
    jwks: JwksClient,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn alg_from_str(alg: &str) -> Option<jsonwebtoken::Algorithm> {
    use jsonwebtoken::Algorithm::*;
    Some(match alg {
        "HS256" => HS256,
        "HS384" => HS384,
        "HS512" => HS512,
        "RS256" => RS256,
        "RS384" => RS384,
        "RS512" => RS512,
        "ES256" => ES256,
        "ES384" => ES384,
        "PS256" => PS256,
        "PS384" => PS384,
        "PS512" => PS512,
        _ => return None,
    })
}

impl Validator {
    pub fn new(config: ValidatorConfig, jwks: JwksClient) -> Self {
        Validator { config, jwks }
    }

    /// Verify `raw_token` end-to-end per spec §4.5; returns the decoded claim mapping.
    pub fn validate(&self, raw_token: &str) -> Result<Value, RunnerError> {
        let trimmed = raw_token
            .strip_prefix(self.config.token_prefix.as_str())
            .unwrap_or(raw_token)
            .trim();
        if trimmed.is_empty() {
            return Err(RunnerError::auth_failed(COMPONENT, "token empty"));
        }

        let header = jsonwebtoken::decode_header(trimmed)
            .map_err(|e| RunnerError::auth_failed(COMPONENT, format!("malformed header: {e}")))?;
        let header_alg = format!("{:?}", header.alg);
        if !self.config.allowed_algorithms.iter().any(|a| a == &header_alg) {
            return Err(RunnerError::auth_failed(
                COMPONENT,
                format!("unexpected signing method '{header_alg}'"),
            ));
        }

        let kid = header
            .kid
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RunnerError::auth_failed(COMPONENT, "missing 'kid' in token header"))?;

        let key = match self.jwks.get_key(&kid) {
            Ok(k) => k,
            Err(_) => {
                debug!(kid = %kid, "validator: key miss, triggering refresh");
                self.jwks.refresh()?;
                self.jwks.get_key(&kid)?
            }
        };

        let alg = alg_from_str(&header_alg)
            .ok_or_else(|| RunnerError::auth_failed(COMPONENT, format!("unsupported algorithm '{header_alg}'")))?;

        // Disable jsonwebtoken's own claim checks; the spec's clock-skew semantics are
        // applied manually below so boundary behavior is exact.
        let mut validation = jsonwebtoken::Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let decoded: jsonwebtoken::TokenData<Value> = jsonwebtoken::decode(trimmed, &key, &validation)
            .map_err(|e| RunnerError::auth_failed(COMPONENT, format!("signature verification failed: {e}")))?;
        let claims = decoded.claims;

        self.check_standard_claims(&claims)?;
        for name in &self.config.required_claims {
            if claims.get(name).is_none() {
                return Err(RunnerError::auth_failed(
                    COMPONENT,
                    format!("missing required claim '{name}'"),
                ));
            }
        }

        Ok(claims)
    }

    /// Stop the underlying JWKS background refresher. Idempotent.
    pub fn close(&self) {
        self.jwks.close();
    }

    fn check_standard_claims(&self, claims: &Value) -> Result<(), RunnerError> {
        let skew = self.config.clock_skew.as_secs() as i64;
        let now = now_secs();

        let iss = claims.get("iss").and_then(|v| v.as_str());
        if iss != Some(self.config.issuer.as_str()) {
            return Err(RunnerError::auth_failed(COMPONENT, "issuer mismatch"));
        }

        let audience_matches = match claims.get("aud") {
            Some(Value::String(a)) => a == &self.config.audience,
            Some(Value::Array(items)) => items
                .iter()
                .any(|v| v.as_str() == Some(self.config.audience.as_str())),
            _ => false,
        };
        if !audience_matches {
            return Err(RunnerError::auth_failed(COMPONENT, "audience mismatch"));
        }

        let exp = claims
            .get("exp")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| RunnerError::auth_failed(COMPONENT, "missing 'exp' claim"))?;
        if now > exp + skew {
            return Err(RunnerError::auth_failed(COMPONENT, "expired"));
        }

        if let Some(nbf) = claims.get("nbf").and_then(|v| v.as_i64()) {
            if now < nbf - skew {
                return Err(RunnerError::auth_failed(COMPONENT, "token not yet valid"));
            }
        }

        if let Some(iat) = claims.get("iat").and_then(|v| v.as_i64()) {
            if now < iat - skew {
                return Err(RunnerError::auth_failed(COMPONENT, "token issued in the future"));
            }
        }

        Ok(())
    }
}
