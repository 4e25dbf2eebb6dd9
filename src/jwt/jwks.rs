//! JWKS client (spec §4.4): synchronous initial fetch, kid-indexed key cache, periodic
//! background refresh. Cache replacement is lock-free via [`arc_swap::ArcSwap`], the same
//! atomic-cache-pointer-swap idiom `brrtrouter`'s `JwksBearerProvider` uses a mutex for —
//! here backed by `arc-swap` so readers never block the refresher.

use crate::error::RunnerError;
use arc_swap::ArcSwap;
use base64::Engine as _;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "jwt.jwks";

/// kid-indexed decoding key cache, fully replaced on each successful refresh.
type KeyMap = HashMap<String, jsonwebtoken::DecodingKey>;

fn fetch_and_parse(url: &str) -> Result<KeyMap, RunnerError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| RunnerError::internal(COMPONENT, format!("building http client: {e}")))?;
    let body = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .map_err(|e| RunnerError::timeout(COMPONENT, format!("fetching jwks: {e}")))?;
    parse_jwks(&body)
}

/// Parse a JWKS document body. Only `use = "sig"` entries are admitted; unsupported
/// `kty`/`alg` combinations are logged and skipped (spec §4.4 "Parse rules").
fn parse_jwks(body: &str) -> Result<KeyMap, RunnerError> {
    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| RunnerError::parse_failed(COMPONENT, format!("jwks body is not json: {e}")))?;
    let keys = parsed
        .get("keys")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RunnerError::parse_failed(COMPONENT, "jwks document missing 'keys' array"))?;

    let mut map = KeyMap::new();
    for key in keys {
        let usage = key.get("use").and_then(|v| v.as_str()).unwrap_or("sig");
        if usage != "sig" {
            continue;
        }
        let kid = match key.get("kid").and_then(|v| v.as_str()) {
            Some(k) => k.to_string(),
            None => continue,
        };
        let kty = key.get("kty").and_then(|v| v.as_str()).unwrap_or("");
        let alg = key.get("alg").and_then(|v| v.as_str()).unwrap_or("");

        let decoding_key = match kty {
            "oct" => key
                .get("k")
                .and_then(|v| v.as_str())
                .and_then(|k| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(k).ok())
                .map(|secret| jsonwebtoken::DecodingKey::from_secret(&secret)),
            "RSA" => {
                let n = key.get("n").and_then(|v| v.as_str());
                let e = key.get("e").and_then(|v| v.as_str());
                match (n, e) {
                    (Some(n), Some(e)) => jsonwebtoken::DecodingKey::from_rsa_components(n, e).ok(),
                    _ => None,
                }
            }
            "EC" => {
                let x = key.get("x").and_then(|v| v.as_str());
                let y = key.get("y").and_then(|v| v.as_str());
                match (x, y) {
                    (Some(x), Some(y)) => jsonwebtoken::DecodingKey::from_ec_components(x, y).ok(),
                    _ => None,
                }
            }
            other => {
                debug!(kty = other, alg, "jwks: skipping unsupported key type");
                None
            }
        };

        match decoding_key {
            Some(dk) => {
                map.insert(kid, dk);
            }
            None => warn!(kid = %kid, kty, alg, "jwks: failed to build decoding key, skipping"),
        }
    }
    Ok(map)
}

/// Fetches a JWKS document, maintains a kid-indexed key cache, and keeps it fresh with a
/// background refresher thread.
pub struct JwksClient {
    url: String,
    cache: Arc<ArcSwap<KeyMap>>,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
}

impl JwksClient {
    /// Synchronous initial fetch; fails construction if the fetch or parse fails.
    pub fn new(url: impl Into<String>, refresh_interval: Duration) -> Result<Self, RunnerError> {
        let url = url.into();
        let initial = fetch_and_parse(&url)?;
        let cache = Arc::new(ArcSwap::from_pointee(initial));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let url = url.clone();
            let cache = Arc::clone(&cache);
            let stop = Arc::clone(&stop);
            // Sleep in short, stop-responsive increments but only actually refresh once
            // refresh_interval has elapsed, so close() reacts within the tick rather than
            // the full interval even when refresh_interval is minutes or hours.
            let tick = refresh_interval.min(Duration::from_secs(1)).max(Duration::from_millis(50));
            std::thread::spawn(move || {
                let mut since_last_refresh = Duration::ZERO;
                while !stop.load(Ordering::Acquire) {
                    std::thread::sleep(tick);
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    since_last_refresh += tick;
                    if since_last_refresh < refresh_interval {
                        continue;
                    }
                    since_last_refresh = Duration::ZERO;
                    match fetch_and_parse(&url) {
                        Ok(fresh) => cache.store(Arc::new(fresh)),
                        Err(e) => warn!(error = %e, "jwks background refresh failed, keeping stale cache"),
                    }
                }
            })
        };

        Ok(JwksClient {
            url,
            cache,
            refresh_handle: Mutex::new(Some(handle)),
            stop,
        })
    }

    /// Constant-time lookup against the current cache.
    pub fn get_key(&self, kid: &str) -> Result<jsonwebtoken::DecodingKey, RunnerError> {
        self.cache
            .load()
            .get(kid)
            .cloned()
            .ok_or_else(|| RunnerError::auth_failed(COMPONENT, format!("key not found for kid '{kid}'")))
    }

    /// Synchronous manual refresh, used during key-rotation retry.
    pub fn refresh(&self) -> Result<(), RunnerError> {
        let fresh = fetch_and_parse(&self.url)?;
        self.cache.store(Arc::new(fresh));
        Ok(())
    }

    /// Stops the background refresher. Idempotent.
    pub fn close(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut guard) = self.refresh_handle.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for JwksClient {
    fn drop(&mut self) {
        self.close();
    }
}
