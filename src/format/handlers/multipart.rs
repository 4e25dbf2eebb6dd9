//! Multipart compose handler (spec §4.3.5): build [`crate::message::Part`]s from data,
//! metadata, filesystem, or an inline template.

use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler};
use crate::message::{Message, Part};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;

const COMPONENT: &str = "format.multipart";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Data,
    Metadata,
    Filesystem,
    Template,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaFormat {
    Json,
    Yaml,
    Text,
}

impl Default for MetaFormat {
    fn default() -> Self {
        MetaFormat::Json
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartConfig {
    pub name: String,
    pub source: Source,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub format: MetaFormat,
    #[serde(default, rename = "contentType")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultipartOptions {
    pub parts: Vec<PartConfig>,
    #[serde(default, rename = "clearExisting")]
    pub clear_existing: bool,
}

fn serialize_metadata(metadata: &HashMap<String, String>, keys: &[String], format: MetaFormat) -> Result<Vec<u8>, RunnerError> {
    let selected: Vec<(&String, &String)> = if keys.is_empty() {
        metadata.iter().collect()
    } else {
        keys.iter().filter_map(|k| metadata.get(k).map(|v| (k, v))).collect()
    };
    match format {
        MetaFormat::Json => {
            let map: serde_json::Map<String, Value> = selected
                .into_iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            serde_json::to_vec(&Value::Object(map))
                .map_err(|e| RunnerError::internal(COMPONENT, e.to_string()))
        }
        MetaFormat::Yaml => {
            let map: serde_yaml::Mapping = selected
                .into_iter()
                .map(|(k, v)| (serde_yaml::Value::from(k.clone()), serde_yaml::Value::from(v.clone())))
                .collect();
            serde_yaml::to_string(&serde_yaml::Value::Mapping(map))
                .map(|s| s.into_bytes())
                .map_err(|e| RunnerError::internal(COMPONENT, e.to_string()))
        }
        MetaFormat::Text => {
            let mut out = String::new();
            for (k, v) in selected {
                out.push_str(k);
                out.push('=');
                out.push_str(v);
                out.push('\n');
            }
            Ok(out.into_bytes())
        }
    }
}

fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>, RunnerError> {
    let mut encoder = flate2::read::GzEncoder::new(data, flate2::Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .map_err(|e| RunnerError::internal(COMPONENT, format!("gzip compress: {e}")))?;
    Ok(out)
}

pub struct MultipartHandler;

impl MultipartHandler {
    fn build_part(&self, msg: &Message, cfg: &PartConfig) -> Result<Option<Part>, RunnerError> {
        let mut data = match cfg.source {
            Source::Data => msg.data.clone(),
            Source::Metadata => serialize_metadata(&msg.metadata, &cfg.keys, cfg.format)?,
            Source::Filesystem => {
                let path = cfg.path.as_deref().ok_or_else(|| {
                    RunnerError::config_invalid(COMPONENT, "source=filesystem requires path")
                })?;
                let fs = msg.filesystem().ok_or_else(|| {
                    RunnerError::input_unavailable(COMPONENT, "no filesystem attached to message")
                })?;
                fs.read(path)
                    .map_err(|e| RunnerError::input_unavailable(COMPONENT, e.to_string()))?
            }
            Source::Template => {
                let template = cfg.template.as_deref().ok_or_else(|| {
                    RunnerError::config_invalid(COMPONENT, "source=template requires a template string")
                })?;
                let ctx_value = serde_json::json!({
                    "metadata": msg.metadata,
                    "data": String::from_utf8_lossy(&msg.data),
                });
                let mut env = minijinja::Environment::new();
                env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
                env.render_str(template, &ctx_value)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))?
                    .into_bytes()
            }
        };
        if cfg.compress {
            data = gzip_bytes(&data)?;
        }
        let mut part = Part::new(cfg.name.clone(), data);
        part.filename = cfg.filename.clone();
        part.content_type = cfg.content_type.clone();
        part.headers = cfg.headers.clone();
        Ok(Some(part))
    }
}

impl OperationHandler for MultipartHandler {
    fn name(&self) -> &'static str {
        "multipart"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: MultipartOptions = parse_options(COMPONENT, &op.options)?;
        for part in &opts.parts {
            if part.name.is_empty() {
                return Err(RunnerError::validation_failed(COMPONENT, "part name is required"));
            }
            match part.source {
                Source::Filesystem if part.path.is_none() => {
                    return Err(RunnerError::validation_failed(
                        COMPONENT,
                        "source=filesystem requires path",
                    ));
                }
                Source::Template if part.template.as_deref().unwrap_or("").is_empty() => {
                    return Err(RunnerError::validation_failed(
                        COMPONENT,
                        "source=template requires a non-empty template string",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn execute(&self, _ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: MultipartOptions = parse_options(COMPONENT, &op.options)?;
        if opts.clear_existing {
            msg.parts.clear();
        }
        for cfg in &opts.parts {
            match self.build_part(msg, cfg) {
                Ok(Some(part)) => msg.parts.push(part),
                Ok(None) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
