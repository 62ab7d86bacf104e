//! Scoped download tokens.
//!
//! A token binds one order, its product, and the product's asset key at
//! mint time. It carries no authorization weight on its own: redemption
//! re-checks the order.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use common::{OrderId, ProductId};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::TokenRejection;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Claims carried by a download token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadClaims {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub asset_key: String,
    pub iat: i64,
    pub exp: i64,
}

/// Result of checking a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerification {
    ValidPayload(DownloadClaims),
    Expired,
    InvalidSignature,
    Malformed,
}

impl TokenVerification {
    pub fn into_result(self) -> Result<DownloadClaims, TokenRejection> {
        match self {
            TokenVerification::ValidPayload(claims) => Ok(claims),
            TokenVerification::Expired => Err(TokenRejection::Expired),
            TokenVerification::InvalidSignature => Err(TokenRejection::InvalidSignature),
            TokenVerification::Malformed => Err(TokenRejection::Malformed),
        }
    }
}

/// Mints and verifies HS256 download tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let key = secret.expose_secret().as_bytes();

        // Expiry is checked against an explicit clock in `verify_at`, so the
        // library check is off. `exp` is still required to be present.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a token valid from now.
    pub fn mint(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        asset_key: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.mint_at(order_id, product_id, asset_key, Utc::now().timestamp())
    }

    /// Mints a token as of the unix time `now`.
    pub fn mint_at(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        asset_key: &str,
        now: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = DownloadClaims {
            order_id,
            product_id,
            asset_key: asset_key.to_string(),
            iat: now,
            exp: now.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Verifies a token against the current time.
    pub fn verify(&self, token: &str) -> TokenVerification {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verifies a token as of the unix time `now`. A token is expired once `now >= exp`.
    pub fn verify_at(&self, token: &str, now: i64) -> TokenVerification {
        let claims = match decode::<DownloadClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        TokenVerification::InvalidSignature
                    }
                    _ => TokenVerification::Malformed,
                };
            }
        };

        if now >= claims.exp {
            TokenVerification::Expired
        } else {
            TokenVerification::ValidPayload(claims)
        }
    }
}
