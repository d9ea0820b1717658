use std::sync::Arc;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub relay_app_id: String,
    pub relay_app_certificate: String,
    pub call_link_base_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            relay_app_id: "test-relay-app-id".to_string(),
            relay_app_certificate: "test-relay-certificate-long-enough-for-hmac".to_string(),
            call_link_base_url: "https://telecare.test".to_string(),
        }
    }
}

impl TestConfig {
    /// Config with no relay credentials and no link base URL.
    pub fn unconfigured() -> Self {
        Self {
            relay_app_id: String::new(),
            relay_app_certificate: String::new(),
            call_link_base_url: String::new(),
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            relay_app_id: self.relay_app_id.clone(),
            relay_app_certificate: self.relay_app_certificate.clone(),
            call_link_base_url: self.call_link_base_url.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub role: String,
}

impl TestUser {
    pub fn new(role: &str) -> Self {
        Self {
            id: format!("{}-{}", role, Uuid::new_v4().simple()),
            role: role.to_string(),
        }
    }

    pub fn doctor() -> Self {
        Self::new("doctor")
    }

    pub fn patient() -> Self {
        Self::new("patient")
    }
}

pub struct RelayTokenTestUtils;

impl RelayTokenTestUtils {
    /// Decode the claims segment without checking the signature.
    pub fn decode_claims(token: &str) -> Option<Value> {
        let claims_b64 = token.split('.').nth(1)?;
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(claims_b64).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn decode_header(token: &str) -> Option<Value> {
        let header_b64 = token.split('.').next()?;
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(header_b64).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Sign arbitrary claims for `channel` the way the relay expects, so tests
    /// can hand-craft tokens the issuer never produced.
    pub fn create_token(
        app_id: &str,
        certificate: &str,
        channel: &str,
        uid: &str,
        ttl_seconds: i64,
    ) -> String {
        let now = Utc::now().timestamp();

        let header = json!({
            "alg": "HS256",
            "typ": "JWT",
            "kid": app_id
        });

        let claims = json!({
            "iss": app_id,
            "channel": channel,
            "uid": uid,
            "role": "publisher",
            "iat": now,
            "exp": now + ttl_seconds
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let claims_encoded = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());

        let signing_input = format!("{}.{}", header_encoded, claims_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(certificate.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(config: &TestConfig, channel: &str, uid: &str) -> String {
        Self::create_token(
            &config.relay_app_id,
            &config.relay_app_certificate,
            channel,
            uid,
            -60,
        )
    }

    pub fn create_invalid_signature_token(config: &TestConfig, channel: &str, uid: &str) -> String {
        Self::create_token(&config.relay_app_id, "wrong-certificate", channel, uid, 3600)
    }
}
