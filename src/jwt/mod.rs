//! # JWT Authenticator
//!
//! A JWKS-backed token validator with background key refresh, key-rotation-aware retry,
//! algorithm allow-listing, standard-claim validation with clock-skew tolerance, and claim
//! enrichment into message metadata (spec §4.4–§4.6).
//!
//! Dependency order (leaves first): [`jwks::JwksClient`] → [`validator::Validator`] →
//! [`authenticator::Authenticator`] → [`runner::JwtRunner`].

pub mod authenticator;
pub mod jwks;
pub mod runner;
pub mod validator;

pub use authenticator::{Authenticator, AuthenticatorConfig};
pub use jwks::JwksClient;
pub use runner::{JwtRunner, JwtRunnerConfig};
pub use validator::{Validator, ValidatorConfig};
