//! Extract handler (spec §4.3.6): pull one or more fields out of a structured payload by
//! dot-separated path, writing each into the payload (JSON re-encode) or a metadata key.

use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler};
use crate::message::Message;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const COMPONENT: &str = "format.extract";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Data,
    Metadata,
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Data
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractField {
    pub path: String,
    #[serde(default)]
    pub destination: Destination,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractOptions {
    pub format: SourceFormat,
    pub fields: Vec<ExtractField>,
}

fn decode(format: SourceFormat, bytes: &[u8]) -> Result<Value, RunnerError> {
    match format {
        SourceFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("json decode: {e}"))),
        SourceFormat::Yaml => serde_yaml::from_slice(bytes)
            .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("yaml decode: {e}"))),
    }
}

/// Dot-separated path, each segment indexing into a mapping. Traversal into a non-mapping
/// value is an error; a missing key is `Ok(None)` (non-fatal per §4.3.6).
fn navigate<'a>(value: &'a Value, path: &str) -> Result<Option<&'a Value>, RunnerError> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => current = v,
                None => return Ok(None),
            },
            other => {
                return Err(RunnerError::parse_failed(
                    COMPONENT,
                    format!("path segment '{segment}' traverses into non-mapping value {other:?}"),
                ));
            }
        }
    }
    Ok(Some(current))
}

fn value_to_metadata_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct ExtractHandler;

impl OperationHandler for ExtractHandler {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: ExtractOptions = parse_options(COMPONENT, &op.options)?;
        if opts.fields.is_empty() {
            return Err(RunnerError::validation_failed(COMPONENT, "fields must be non-empty"));
        }
        for field in &opts.fields {
            if field.path.trim().is_empty() {
                return Err(RunnerError::validation_failed(COMPONENT, "field path must be non-empty"));
            }
            if field.destination == Destination::Metadata && field.key.is_none() {
                return Err(RunnerError::validation_failed(
                    COMPONENT,
                    "destination=metadata requires key",
                ));
            }
        }
        Ok(())
    }

    fn execute(&self, _ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: ExtractOptions = parse_options(COMPONENT, &op.options)?;
        let root = decode(opts.format, &msg.data)?;
        let mut last_data_value: Option<Value> = None;

        for field in &opts.fields {
            let found = match navigate(&root, &field.path)? {
                Some(v) => v,
                None => {
                    warn!(path = %field.path, "extract: field not found, skipping");
                    continue;
                }
            };
            match field.destination {
                Destination::Metadata => {
                    let key = field.key.as_ref().expect("validated at construction");
                    msg.metadata.insert(key.clone(), value_to_metadata_string(found));
                }
                Destination::Data => {
                    last_data_value = Some(found.clone());
                }
            }
        }

        if let Some(value) = last_data_value {
            msg.data = serde_json::to_vec(&value)
                .map_err(|e| RunnerError::internal(COMPONENT, format!("json encode: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{InputSource, OutputTarget};
    use serde_json::json;

    fn op(options: serde_json::Value) -> FormatOperation {
        FormatOperation {
            op_type: "extract".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options,
        }
    }

    fn ctx() -> ExecContext {
        ExecContext {
            deadline: std::time::Instant::now() + std::time::Duration::from_secs(5),
        }
    }

    #[test]
    fn extracts_nested_field_into_data() {
        let handler = ExtractHandler;
        let operation = op(json!({
            "format": "json",
            "fields": [{ "path": "user.name" }]
        }));
        let mut msg = Message::new(b"1".to_vec())
            .with_data(br#"{"user":{"name":"Ada"}}"#.to_vec());
        handler.execute(&ctx(), &mut msg, &operation).unwrap();
        assert_eq!(msg.data, br#""Ada""#.to_vec());
    }

    #[test]
    fn extracts_into_metadata_key() {
        let handler = ExtractHandler;
        let operation = op(json!({
            "format": "json",
            "fields": [{ "path": "count", "destination": "metadata", "key": "count" }]
        }));
        let mut msg = Message::new(b"1".to_vec()).with_data(br#"{"count":3}"#.to_vec());
        handler.execute(&ctx(), &mut msg, &operation).unwrap();
        assert_eq!(msg.metadata.get("count"), Some(&"3".to_string()));
    }

    #[test]
    fn missing_path_is_skipped_not_fatal() {
        let handler = ExtractHandler;
        let operation = op(json!({
            "format": "json",
            "fields": [{ "path": "missing.field" }]
        }));
        let mut msg = Message::new(b"1".to_vec()).with_data(br#"{}"#.to_vec());
        handler.execute(&ctx(), &mut msg, &operation).unwrap();
        assert_eq!(msg.data, br#"{}"#.to_vec());
    }

    #[test]
    fn metadata_destination_without_key_fails_validation() {
        let handler = ExtractHandler;
        let operation = op(json!({
            "format": "json",
            "fields": [{ "path": "a", "destination": "metadata" }]
        }));
        assert!(handler.validate(&operation).is_err());
    }

    #[test]
    fn last_field_targeting_data_wins() {
        let handler = ExtractHandler;
        let operation = op(json!({
            "format": "json",
            "fields": [{ "path": "a" }, { "path": "b" }]
        }));
        let mut msg = Message::new(b"1".to_vec()).with_data(br#"{"a":1,"b":2}"#.to_vec());
        handler.execute(&ctx(), &mut msg, &operation).unwrap();
        assert_eq!(msg.data, b"2".to_vec());
    }
}
