//! End-to-end scenarios (spec §8 "Concrete end-to-end scenarios") plus the universal
//! invariants that only make sense exercised against a fully wired runner chain rather
//! than a single handler in isolation.

use flowrunner::error::ErrorKind;
use flowrunner::format::{FormatOperation, FormatRunnerConfig, InputSource, OutputTarget};
use flowrunner::jwt::{JwtRunner, JwtRunnerConfig};
use flowrunner::message::Message;
use flowrunner::runner::Runner;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use std::sync::mpsc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// 2048-bit RSA test key pair, not used anywhere outside this test file.
const TEST_RSA_PRIVATE_PEM: &str = include_str!("fixtures/test_rsa_private.pem");
const TEST_KID: &str = "test-signing-key";
const TEST_RSA_N: &str = "t_qvl9n5aV8-SjLJ1ziAmFGj70DkXvOioC7ZvezLESAS1ijVfLshaRMrh1FWcQrnEtiJCInhHlwr99sNytwKfmU0P50HNGe_sElcnfFq3z7v1pDgV8Vpu8nUM9R5yI7FVHfHEQl6bs2xFZdzfB8-Ktv0dFPJBdGRbhHAJCgMIjztWn2P0LjAOe3WT2uQ-3iRzOP1T88dv3_vmJljydnXuQ9mkhAhVWmuBKa5syII29Ivo0ApCXznbR2XNWuyUUPx2my8SRJcgcOZcj-lKr_L7Mw_T2hJfKMJnz4maS60Q6Nt0GDYPvuPDAPLL5g2CLHoV4lmL_ffXrAkelUo2v1vsQ";
const TEST_RSA_E: &str = "AQAB";

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn sign_rs256(claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_RSA_PRIVATE_PEM.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Starts a mock JWKS endpoint serving a single RSA signing key, returning the URL and a
/// sender that shuts the background thread down.
fn start_mock_jwks() -> (String, mpsc::Sender<()>) {
    let body = format!(
        r#"{{"keys":[{{"kty":"RSA","use":"sig","kid":"{TEST_KID}","alg":"RS256","n":"{TEST_RSA_N}","e":"{TEST_RSA_E}"}}]}}"#
    );
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let url = format!("http://{addr}/jwks.json");
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || loop {
        if rx.try_recv().is_ok() {
            break;
        }
        if let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(100)) {
            let _ = request.respond(tiny_http::Response::from_string(body.clone()));
        }
    });
    (url, tx)
}

fn jwt_config(jwks_url: String, fail_on_error: bool) -> JwtRunnerConfig {
    JwtRunnerConfig {
        enabled: true,
        token_metadata_key: "authorization".into(),
        token_prefix: "Bearer ".into(),
        jwks_url: Some(jwks_url),
        jwks_refresh_interval: Duration::from_secs(3600),
        issuer: Some("https://test.example.com".into()),
        audience: Some("test-audience".into()),
        required_claims: vec![],
        claim_prefix: "jwt_".into(),
        fail_on_error,
        allowed_algorithms: vec!["RS256".into()],
        clock_skew: Duration::from_secs(60),
    }
}

/// Scenario 1: JWT happy path.
#[test]
fn scenario_jwt_happy_path() {
    let (url, stop) = start_mock_jwks();
    let runner = JwtRunner::new(jwt_config(url, true)).unwrap();

    let now = now_secs();
    let token = sign_rs256(&json!({
        "iss": "https://test.example.com",
        "aud": "test-audience",
        "sub": "test-user",
        "email": "test@example.com",
        "role": "admin",
        "exp": now + 3600,
        "iat": now,
    }));

    let mut msg = Message::new(b"1".to_vec())
        .with_metadata("authorization", format!("Bearer {token}"))
        .with_metadata("other", "value");

    runner.process(&mut msg).unwrap();

    assert_eq!(msg.metadata["jwt_verified"], "true");
    assert_eq!(msg.metadata["jwt_sub"], "test-user");
    assert_eq!(msg.metadata["jwt_email"], "test@example.com");
    assert_eq!(msg.metadata["other"], "value");

    runner.close().unwrap();
    let _ = stop.send(());
}

/// Scenario 2: JWT array claim renders as a comma-joined string.
#[test]
fn scenario_jwt_array_claim() {
    let (url, stop) = start_mock_jwks();
    let runner = JwtRunner::new(jwt_config(url, true)).unwrap();

    let now = now_secs();
    let token = sign_rs256(&json!({
        "iss": "https://test.example.com",
        "aud": "test-audience",
        "roles": ["admin", "user", "developer"],
        "exp": now + 3600,
    }));

    let mut msg = Message::new(b"1".to_vec()).with_metadata("authorization", format!("Bearer {token}"));
    runner.process(&mut msg).unwrap();

    assert_eq!(msg.metadata["jwt_roles"], "admin,user,developer");

    runner.close().unwrap();
    let _ = stop.send(());
}

/// Scenario 3: expired token with `failOnError = false` doesn't fail the runner; it's
/// recorded in metadata instead.
#[test]
fn scenario_jwt_expired_fail_on_error_false() {
    let (url, stop) = start_mock_jwks();
    let mut cfg = jwt_config(url, false);
    cfg.clock_skew = Duration::from_secs(1);
    let runner = JwtRunner::new(cfg).unwrap();

    let now = now_secs();
    let token = sign_rs256(&json!({
        "iss": "https://test.example.com",
        "aud": "test-audience",
        "exp": now - 3600,
    }));

    let mut msg = Message::new(b"1".to_vec()).with_metadata("authorization", format!("Bearer {token}"));
    runner.process(&mut msg).unwrap();

    assert_eq!(msg.metadata["jwt_verified"], "false");
    assert!(!msg.metadata["jwt_error"].is_empty());

    runner.close().unwrap();
    let _ = stop.send(());
}

/// Scenario 4: format encode.
#[test]
fn scenario_format_encode() {
    let cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "encode".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options: json!({"encoding": "base64", "operation": "encode"}),
        }],
        timeout: Duration::from_secs(5),
        verbose: false,
    };
    let runner = flowrunner::format::FormatRunner::new(cfg).unwrap();
    let mut msg = Message::new(b"1".to_vec()).with_data(b"hello".to_vec());
    runner.process(&mut msg).unwrap();
    assert_eq!(msg.data, b"aGVsbG8=".to_vec());
}

/// Scenario 5: template rendering against metadata.
#[test]
fn scenario_format_template_with_metadata() {
    let cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "template".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options: json!({"template": "Name: {{ metadata.name }}", "maxTemplateSize": 1024}),
        }],
        timeout: Duration::from_secs(5),
        verbose: false,
    };
    let runner = flowrunner::format::FormatRunner::new(cfg).unwrap();
    let mut msg = Message::new(b"1".to_vec())
        .with_data(b"test".to_vec())
        .with_metadata("name", "John");
    runner.process(&mut msg).unwrap();
    assert_eq!(msg.data, b"Name: John".to_vec());
}

/// Scenario 6: zstd compress/decompress round-trip with a strictly smaller compressed size.
#[test]
fn scenario_zstd_round_trip() {
    let payload: Vec<u8> = "This is a test string that repeats. "
        .bytes()
        .cycle()
        .take(36_000)
        .collect();

    let compress_cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "compress".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options: json!({"algorithm": "zstd", "operation": "compress"}),
        }],
        timeout: Duration::from_secs(5),
        verbose: false,
    };
    let compressor = flowrunner::format::FormatRunner::new(compress_cfg).unwrap();
    let mut msg = Message::new(b"1".to_vec()).with_data(payload.clone());
    compressor.process(&mut msg).unwrap();
    assert!(msg.data.len() < payload.len());

    let decompress_cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "compress".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options: json!({"algorithm": "zstd", "operation": "decompress"}),
        }],
        timeout: Duration::from_secs(5),
        verbose: false,
    };
    let decompressor = flowrunner::format::FormatRunner::new(decompress_cfg).unwrap();
    decompressor.process(&mut msg).unwrap();
    assert_eq!(msg.data, payload);
}

/// Scenario 7: json -> yaml serialize, alphabetical keys, round-trips to the same object.
#[test]
fn scenario_serialize_json_to_yaml() {
    let cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "serialize".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options: json!({"from": "json", "to": "yaml"}),
        }],
        timeout: Duration::from_secs(5),
        verbose: false,
    };
    let runner = flowrunner::format::FormatRunner::new(cfg).unwrap();
    let mut msg = Message::new(b"1".to_vec()).with_data(br#"{"name":"John","age":30}"#.to_vec());
    runner.process(&mut msg).unwrap();

    let rendered = String::from_utf8(msg.data.clone()).unwrap();
    assert!(rendered.trim_start().starts_with("age:"));
    assert!(rendered.contains("name:"));

    let parsed: serde_json::Value = serde_yaml::from_str(&rendered).unwrap();
    assert_eq!(parsed, json!({"name": "John", "age": 30}));
}

/// Scenario 8: newline split into three named parts.
#[test]
fn scenario_split_newline() {
    let cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "split".into(),
            input: InputSource::Data,
            output: OutputTarget::Parts,
            options: json!({"delimiter": "\n", "maxParts": 100}),
        }],
        timeout: Duration::from_secs(5),
        verbose: false,
    };
    let runner = flowrunner::format::FormatRunner::new(cfg).unwrap();
    let mut msg = Message::new(b"1".to_vec()).with_data(b"line1\nline2\nline3".to_vec());
    runner.process(&mut msg).unwrap();

    assert_eq!(msg.parts.len(), 3);
    assert_eq!(msg.parts[0].name, "part0");
    assert_eq!(msg.parts[0].data, b"line1");
    assert_eq!(msg.parts[1].name, "part1");
    assert_eq!(msg.parts[1].data, b"line2");
    assert_eq!(msg.parts[2].name, "part2");
    assert_eq!(msg.parts[2].data, b"line3");
}

/// Universal invariant: two concurrent `Close` calls both succeed, and a subsequent
/// `Process` fails `Stopped`.
#[test]
fn concurrent_close_calls_both_succeed() {
    let cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "encode".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options: json!({"encoding": "base64", "operation": "encode"}),
        }],
        timeout: Duration::from_secs(5),
        verbose: false,
    };
    let runner = std::sync::Arc::new(flowrunner::format::FormatRunner::new(cfg).unwrap());

    let r1 = runner.clone();
    let r2 = runner.clone();
    let t1 = std::thread::spawn(move || r1.close());
    let t2 = std::thread::spawn(move || r2.close());
    assert!(t1.join().unwrap().is_ok());
    assert!(t2.join().unwrap().is_ok());

    let mut msg = Message::new(b"1".to_vec()).with_data(b"hello".to_vec());
    let err = runner.process(&mut msg).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Stopped);
}

/// Universal invariant: `Process` returns within `T + epsilon` for a chain that never
/// itself blocks past the deadline.
#[test]
fn format_runner_respects_timeout_budget() {
    let cfg = FormatRunnerConfig {
        operations: vec![FormatOperation {
            op_type: "encode".into(),
            input: InputSource::Data,
            output: OutputTarget::Data,
            options: json!({"encoding": "base64", "operation": "encode"}),
        }],
        timeout: Duration::from_millis(500),
        verbose: false,
    };
    let runner = flowrunner::format::FormatRunner::new(cfg).unwrap();
    let mut msg = Message::new(b"1".to_vec()).with_data(b"hello".to_vec());

    let started = std::time::Instant::now();
    runner.process(&mut msg).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}
