//! Authenticator (spec §4.6): reads a token from message metadata, validates it, and
//! enriches metadata with stringified claims under a configurable prefix.

use crate::error::RunnerError;
use crate::jwt::validator::Validator;
use crate::message::Message;
use serde_json::Value;

const COMPONENT: &str = "jwt.authenticator";

#[derive(Debug, Clone)]
pub struct AuthenticatorConfig {
    pub token_metadata_key: String,
    pub claim_prefix: String,
}

pub struct Authenticator {
    config: AuthenticatorConfig,
    validator: Validator,
}

/// Stringify a claim value per the rendering table in spec §4.6. Objects are skipped
/// (return `None`); arrays flatten nested arrays and comma-join the stringified elements.
fn stringify_claim(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(stringify_claim).collect();
            Some(parts.join(","))
        }
        Value::Object(_) => None,
        Value::Null => None,
    }
}

impl Authenticator {
    pub fn new(config: AuthenticatorConfig, validator: Validator) -> Self {
        Authenticator { config, validator }
    }

    /// Stop the underlying JWKS background refresher. Idempotent.
    pub fn close(&self) {
        self.validator.close();
    }

    /// Validate the token found at `metadata[tokenMetadataKey]` and enrich `msg.metadata`
    /// in place. Returns the validator's error (if any) so callers can decide whether to
    /// propagate it (JWT Runner's `failOnError`).
    pub fn authenticate(&self, msg: &mut Message) -> Result<(), RunnerError> {
        let prefix = &self.config.claim_prefix;
        let token = match msg.metadata.get(&self.config.token_metadata_key) {
            Some(t) => t.clone(),
            None => {
                let err = RunnerError::auth_failed(COMPONENT, "token metadata key not present");
                msg.metadata.insert(format!("{prefix}verified"), "false".to_string());
                msg.metadata.insert(format!("{prefix}error"), err.message.clone());
                return Err(err);
            }
        };

        match self.validator.validate(&token) {
            Ok(claims) => {
                msg.metadata.insert(format!("{prefix}verified"), "true".to_string());
                if let Value::Object(map) = &claims {
                    for (name, value) in map {
                        if let Some(rendered) = stringify_claim(value) {
                            msg.metadata.insert(format!("{prefix}{name}"), rendered);
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                msg.metadata.insert(format!("{prefix}verified"), "false".to_string());
                msg.metadata.insert(format!("{prefix}error"), e.message.clone());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stringify_claim;
    use serde_json::json;

    #[test]
    fn arrays_comma_join_and_flatten() {
        assert_eq!(
            stringify_claim(&json!(["admin", "user", "developer"])).unwrap(),
            "admin,user,developer"
        );
        assert_eq!(stringify_claim(&json!([["a", "b"], "c"])).unwrap(), "a,b,c");
    }

    #[test]
    fn objects_are_skipped() {
        assert_eq!(stringify_claim(&json!({"a": 1})), None);
    }

    #[test]
    fn booleans_render_as_true_false() {
        assert_eq!(stringify_claim(&json!(true)).unwrap(), "true");
    }
}
