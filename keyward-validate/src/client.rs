//! HTTP client for the validation server.
//!
//! Requests to `POST /api/v1/validate` carry an HMAC-SHA256 signature
//! over canonical request fields; responses are signed the same way and
//! verified in constant time before anything in them is trusted. A
//! response claiming `valid: true` with a bad signature is rejected
//! outright.

use crate::error::{ValidationError, ValidationResult};
use keyward_crypto::{sign_canonical, verify_canonical};
use keyward_types::{ValidationRequest, ValidationResponse};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Validation endpoint path.
pub const VALIDATE_PATH: &str = "/api/v1/validate";

/// Server connection configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the licensing server.
    pub base_url: String,
    /// Shared API key for request/response HMACs.
    pub api_key: Vec<u8>,
    /// Per-request timeout. A timeout is treated as a network failure.
    pub timeout: Duration,
}

impl ServerConfig {
    /// Creates a config with the default 30s timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<Vec<u8>>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Signed wire form of a validation request.
#[derive(Debug, Serialize, Deserialize)]
struct SignedRequest {
    #[serde(flatten)]
    request: ValidationRequest,
    /// HMAC over (license_key, fingerprint, product_id, timestamp).
    signature: String,
}

/// Client for the validation endpoint.
pub struct ServerClient {
    config: ServerConfig,
    http: reqwest::Client,
}

impl ServerClient {
    /// Creates a client.
    pub fn new(config: ServerConfig) -> ValidationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ValidationError::Network(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Sends a signed validation request and verifies the response
    /// signature before returning it.
    pub async fn validate(&self, request: &ValidationRequest) -> ValidationResult<ValidationResponse> {
        let timestamp = request.timestamp.to_rfc3339();
        let signature = sign_canonical(
            &self.config.api_key,
            &[
                &request.license_key,
                &request.hardware_fingerprint,
                &request.product_id,
                &timestamp,
            ],
        )?;

        let url = format!("{}{}", self.config.base_url, VALIDATE_PATH);
        debug!(%url, key = %request.license_key, "validating online");

        let signed = SignedRequest {
            request: request.clone(),
            signature,
        };

        let response = self
            .http
            .post(&url)
            .json(&signed)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            return Err(ValidationError::Network(format!(
                "server returned {}",
                response.status()
            )));
        }

        let body: ValidationResponse = response
            .json()
            .await
            .map_err(classify_reqwest_error)?;

        self.verify_response(request, &body)?;
        Ok(body)
    }

    /// Verifies the response HMAC. The canonical fields bind the
    /// response to this request's license key so a signed response for
    /// one license cannot be replayed for another.
    fn verify_response(
        &self,
        request: &ValidationRequest,
        response: &ValidationResponse,
    ) -> ValidationResult<()> {
        let Some(signature) = &response.signature else {
            warn!("server response missing signature");
            return Err(ValidationError::ResponseSignature);
        };

        let valid_str = if response.valid { "true" } else { "false" };
        let next = response.next_validation.to_rfc3339();
        verify_canonical(
            &self.config.api_key,
            &[valid_str, &request.license_key, &next],
            signature,
        )
        .map_err(|_| {
            warn!("server response signature mismatch");
            ValidationError::ResponseSignature
        })
    }
}

/// Computes the response signature the way the server does. Used by
/// tests and tooling that stand in for the licensing server.
pub fn sign_response(
    api_key: &[u8],
    license_key: &str,
    response: &ValidationResponse,
) -> ValidationResult<String> {
    let valid_str = if response.valid { "true" } else { "false" };
    let next = response.next_validation.to_rfc3339();
    sign_canonical(api_key, &[valid_str, license_key, &next])
        .map_err(ValidationError::Crypto)
}

fn classify_reqwest_error(e: reqwest::Error) -> ValidationError {
    if e.is_timeout() {
        ValidationError::Timeout
    } else {
        ValidationError::Network(e.to_string())
    }
}
