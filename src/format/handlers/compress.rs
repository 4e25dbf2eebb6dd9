//! Compress handler (spec §4.3.4): gzip via `flate2`, zstd via the `zstd` crate, with the
//! `level` → encoder-tier mapping spec'd for zstd and pass-through validation for gzip.

use crate::error::RunnerError;
use crate::format::{parse_options, ExecContext, FormatOperation, OperationHandler};
use crate::message::Message;
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use serde::Deserialize;
use std::io::Read;

const COMPONENT: &str = "format.compress";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Gzip,
    Zstd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Compress,
    Decompress,
}

impl Default for Op {
    fn default() -> Self {
        Op::Compress
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompressOptions {
    pub algorithm: Algorithm,
    #[serde(default)]
    pub operation: Op,
    #[serde(default = "default_level")]
    pub level: i32,
}

fn default_level() -> i32 {
    6
}

/// `-1` → Fastest; `1..3` → Fastest; `4..6` → Default; `7..9` → BetterCompression;
/// anything else → Default. Matches the tiers `zstd::Encoder` actually honors.
fn zstd_level_for(level: i32) -> i32 {
    match level {
        -1 => 1,
        1..=3 => 1,
        4..=6 => 3,
        7..=9 => 9,
        _ => 3,
    }
}

pub struct CompressHandler;

impl OperationHandler for CompressHandler {
    fn name(&self) -> &'static str {
        "compress"
    }

    fn validate(&self, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: CompressOptions = parse_options(COMPONENT, &op.options)?;
        if !(-1..=9).contains(&opts.level) {
            return Err(RunnerError::validation_failed(
                COMPONENT,
                format!("level {} out of range [-1, 9]", opts.level),
            ));
        }
        Ok(())
    }

    fn execute(&self, _ctx: &ExecContext, msg: &mut Message, op: &FormatOperation) -> Result<(), RunnerError> {
        let opts: CompressOptions = parse_options(COMPONENT, &op.options)?;
        msg.data = match (opts.algorithm, opts.operation) {
            (Algorithm::Gzip, Op::Compress) => {
                let gzip_level = if opts.level == -1 {
                    Compression::default()
                } else {
                    Compression::new(opts.level as u32)
                };
                let mut encoder = GzEncoder::new(&msg.data[..], gzip_level);
                let mut out = Vec::new();
                encoder
                    .read_to_end(&mut out)
                    .map_err(|e| RunnerError::internal(COMPONENT, format!("gzip compress: {e}")))?;
                out
            }
            (Algorithm::Gzip, Op::Decompress) => {
                let mut decoder = GzDecoder::new(&msg.data[..]);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("gzip decompress: {e}")))?;
                out
            }
            (Algorithm::Zstd, Op::Compress) => {
                zstd::encode_all(&msg.data[..], zstd_level_for(opts.level))
                    .map_err(|e| RunnerError::internal(COMPONENT, format!("zstd compress: {e}")))?
            }
            (Algorithm::Zstd, Op::Decompress) => zstd::decode_all(&msg.data[..])
                .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("zstd decompress: {e}")))?,
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
            op_type: "compress".into(),
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
    fn zstd_round_trip_shrinks_repetitive_payload() {
        let handler = CompressHandler;
        let original = "This is a test string that repeats. "
            .repeat(36_000 / 37)
            .into_bytes();
        let compress_op = op(json!({ "algorithm": "zstd", "operation": "compress" }));
        let mut msg = Message::new(b"1".to_vec()).with_data(original.clone());
        handler.execute(&ctx(), &mut msg, &compress_op).unwrap();
        assert!(msg.data.len() < original.len());
        let decompress_op = op(json!({ "algorithm": "zstd", "operation": "decompress" }));
        handler.execute(&ctx(), &mut msg, &decompress_op).unwrap();
        assert_eq!(msg.data, original);
    }

    #[test]
    fn gzip_round_trip() {
        let handler = CompressHandler;
        let original = b"gzip round trip payload".to_vec();
        let compress_op = op(json!({ "algorithm": "gzip", "operation": "compress", "level": 9 }));
        let mut msg = Message::new(b"1".to_vec()).with_data(original.clone());
        handler.execute(&ctx(), &mut msg, &compress_op).unwrap();
        let decompress_op = op(json!({ "algorithm": "gzip", "operation": "decompress" }));
        handler.execute(&ctx(), &mut msg, &decompress_op).unwrap();
        assert_eq!(msg.data, original);
    }

    #[test]
    fn level_out_of_range_fails_validation() {
        let handler = CompressHandler;
        let operation = op(json!({ "algorithm": "gzip", "level": 42 }));
        assert!(handler.validate(&operation).is_err());
    }
}
