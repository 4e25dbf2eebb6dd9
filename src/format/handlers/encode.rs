//! Encode handler (spec §4.3.3): base64 / base64url / hex / URL percent-encoding, with
//! `urlencoding` providing the `url` variant — the same crate `brrtrouter`'s security
//! providers pull in for query-string work.

use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler};
use crate::message::Message;
use base64::Engine as _;
use serde::Deserialize;

const COMPONENT: &str = "format.encode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Base64,
    Base64url,
    Hex,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Encode,
    Decode,
}

impl Default for Op {
    fn default() -> Self {
        Op::Encode
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodeOptions {
    pub encoding: Encoding,
    #[serde(default)]
    pub operation: Op,
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn from_hex(s: &str) -> Result<Vec<u8>, RunnerError> {
    if s.len() % 2 != 0 {
        return Err(RunnerError::parse_failed(COMPONENT, "odd-length hex string"));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char)
            .to_digit(16)
            .ok_or_else(|| RunnerError::parse_failed(COMPONENT, "invalid hex digit"))?;
        let lo = (chunk[1] as char)
            .to_digit(16)
            .ok_or_else(|| RunnerError::parse_failed(COMPONENT, "invalid hex digit"))?;
        out.push(((hi << 4) | lo) as u8);
    }
    Ok(out)
}

pub struct EncodeHandler;

impl OperationHandler for EncodeHandler {
    fn name(&self) -> &'static str {
        "encode"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        parse_options::<EncodeOptions>(COMPONENT, &op.options)?;
        Ok(())
    }

    fn execute(&self, _ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: EncodeOptions = parse_options(COMPONENT, &op.options)?;
        msg.data = match (opts.encoding, opts.operation) {
            (Encoding::Base64, Op::Encode) => base64::engine::general_purpose::STANDARD
                .encode(&msg.data)
                .into_bytes(),
            (Encoding::Base64, Op::Decode) => {
                base64::engine::general_purpose::STANDARD
                    .decode(&msg.data)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))?
            }
            (Encoding::Base64url, Op::Encode) => base64::engine::general_purpose::URL_SAFE
                .encode(&msg.data)
                .into_bytes(),
            (Encoding::Base64url, Op::Decode) => base64::engine::general_purpose::URL_SAFE
                .decode(&msg.data)
                .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))?,
            (Encoding::Hex, Op::Encode) => to_hex(&msg.data).into_bytes(),
            (Encoding::Hex, Op::Decode) => {
                let s = std::str::from_utf8(&msg.data)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))?;
                from_hex(s)?
            }
            (Encoding::Url, Op::Encode) => {
                let s = std::str::from_utf8(&msg.data)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))?;
                urlencoding::encode(s).into_owned().into_bytes()
            }
            (Encoding::Url, Op::Decode) => {
                let s = std::str::from_utf8(&msg.data)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))?;
                urlencoding::decode(s)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, e.to_string()))?
                    .into_owned()
                    .into_bytes()
            }
        };
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
            op_type: "encode".into(),
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
    fn base64_encode_matches_scenario_4() {
        let handler = EncodeHandler;
        let operation = op(json!({ "encoding": "base64", "operation": "encode" }));
        let mut msg = Message::new(b"1".to_vec()).with_data(b"hello".to_vec());
        handler.execute(&ctx(), &mut msg, &operation).unwrap();
        assert_eq!(msg.data, b"aGVsbG8=".to_vec());
    }

    #[test]
    fn round_trips_for_every_encoding() {
        let handler = EncodeHandler;
        let payload = b"round trip \xF0\x9F\x9A\x80 bytes".to_vec();
        for encoding in ["base64", "base64url", "hex", "url"] {
            let enc_op = op(json!({ "encoding": encoding, "operation": "encode" }));
            let mut msg = Message::new(b"1".to_vec()).with_data(payload.clone());
            handler.execute(&ctx(), &mut msg, &enc_op).unwrap();
            let dec_op = op(json!({ "encoding": encoding, "operation": "decode" }));
            handler.execute(&ctx(), &mut msg, &dec_op).unwrap();
            assert_eq!(msg.data, payload, "round trip failed for {encoding}");
        }
    }
}
