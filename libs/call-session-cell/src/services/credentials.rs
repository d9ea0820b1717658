// libs/call-session-cell/src/services/credentials.rs
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

use crate::error::CallSessionError;
use crate::models::{IssuedCredential, RelayTokenClaims, TokenRole};
use crate::services::clock::Clock;
use crate::services::registry::{hex_encode, random_bytes};

type HmacSha256 = Hmac<Sha256>;

pub const MAX_IDENTITY_LEN: usize = 255;
pub const MAX_TOKEN_TTL_SECONDS: u32 = 86_400;

struct SigningMaterial {
    app_id: String,
    certificate: String,
}

enum SigningState {
    Configured(SigningMaterial),
    Unconfigured { missing: &'static str },
}

/// Issues HS256-signed capabilities the media relay accepts for a single
/// channel, participant and role.
pub struct RelayTokenIssuer {
    signing: SigningState,
    default_ttl_seconds: u32,
    clock: Arc<dyn Clock>,
}

impl RelayTokenIssuer {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let signing = if config.relay_app_id.is_empty() {
            SigningState::Unconfigured { missing: "RELAY_APP_ID" }
        } else if config.relay_app_certificate.is_empty() {
            SigningState::Unconfigured {
                missing: "RELAY_APP_CERTIFICATE",
            }
        } else {
            SigningState::Configured(SigningMaterial {
                app_id: config.relay_app_id.clone(),
                certificate: config.relay_app_certificate.clone(),
            })
        };

        if let SigningState::Unconfigured { missing } = &signing {
            warn!("Relay token issuer starting unconfigured: {} is not set", missing);
        }

        Self {
            signing,
            default_ttl_seconds: config.relay_token_ttl_seconds,
            clock,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.signing, SigningState::Configured(_))
    }

    pub fn ensure_configured(&self) -> Result<(), CallSessionError> {
        self.material().map(|_| ())
    }

    /// Issue a token for `identity` on `channel`.
    ///
    /// A missing or blank identity gets a random guest label. `ttl_seconds`
    /// falls back to the configured default and must be between one second
    /// and one day.
    pub fn issue(
        &self,
        channel: &str,
        identity: Option<&str>,
        role: TokenRole,
        ttl_seconds: Option<u32>,
    ) -> Result<IssuedCredential, CallSessionError> {
        let material = self.material()?;

        let channel = channel.trim();
        if channel.is_empty() {
            return Err(CallSessionError::invalid("channel_name is required"));
        }

        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        if ttl == 0 || ttl > MAX_TOKEN_TTL_SECONDS {
            return Err(CallSessionError::invalid(format!(
                "expire_seconds must be between 1 and {}",
                MAX_TOKEN_TTL_SECONDS
            )));
        }

        let uid = match identity.and_then(sanitize_identity) {
            Some(uid) => uid,
            None => guest_label()?,
        };

        let issued_at = self.clock.now().timestamp();
        let claims = RelayTokenClaims {
            iss: material.app_id.clone(),
            channel: channel.to_string(),
            uid,
            role,
            iat: issued_at,
            exp: issued_at + i64::from(ttl),
        };

        let token = sign(material, &claims)?;
        debug!(
            "Issued {:?} relay token for {} on channel {}",
            role, claims.uid, claims.channel
        );

        Ok(IssuedCredential {
            token,
            uid: claims.uid,
            channel: claims.channel,
            role,
            expire_at: claims.exp,
        })
    }

    /// Check a token the way the relay does: signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<RelayTokenClaims, CallSessionError> {
        let material = self.material()?;

        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
            return Err(CallSessionError::invalid("Invalid token format"));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| CallSessionError::invalid("Invalid signature encoding"))?;

        let mut mac = HmacSha256::new_from_slice(material.certificate.as_bytes())
            .map_err(|e| CallSessionError::internal(format!("Failed to create HMAC: {}", e)))?;
        mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());
        if mac.verify_slice(&signature).is_err() {
            debug!("Relay token signature verification failed");
            return Err(CallSessionError::invalid("Invalid token signature"));
        }

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| CallSessionError::invalid("Invalid claims encoding"))?;
        let claims: RelayTokenClaims = serde_json::from_slice(&claims_json)
            .map_err(|_| CallSessionError::invalid("Invalid claims format"))?;

        if claims.iss != material.app_id {
            return Err(CallSessionError::invalid("Token issued for another application"));
        }

        let now = self.clock.now().timestamp();
        if claims.exp < now {
            debug!("Relay token expired at {} (now: {})", claims.exp, now);
            return Err(CallSessionError::invalid("Token expired"));
        }

        Ok(claims)
    }

    fn material(&self) -> Result<&SigningMaterial, CallSessionError> {
        match &self.signing {
            SigningState::Configured(material) => Ok(material),
            SigningState::Unconfigured { missing } => {
                error!("Relay credential requested but {} is not configured", missing);
                Err(CallSessionError::NotConfigured { missing })
            }
        }
    }
}

fn sign(material: &SigningMaterial, claims: &RelayTokenClaims) -> Result<String, CallSessionError> {
    let header = json!({
        "alg": "HS256",
        "typ": "JWT",
        "kid": material.app_id,
    });
    let claims_json = serde_json::to_vec(claims)
        .map_err(|e| CallSessionError::internal(format!("Failed to encode claims: {}", e)))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims_json)
    );

    let mut mac = HmacSha256::new_from_slice(material.certificate.as_bytes())
        .map_err(|e| CallSessionError::internal(format!("Failed to create HMAC: {}", e)))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Strip control characters and bound the length; `None` if nothing is left.
pub fn sanitize_identity(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_IDENTITY_LEN)
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn guest_label() -> Result<String, CallSessionError> {
    Ok(format!("guest-{}", hex_encode(&random_bytes::<6>()?)))
}
