/// JWT Token Generation and Validation
///
/// Mints and validates HS256-signed claim sets. Validation is a pure function
/// of the token, the signing key and the current time.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use crate::auth::claims::{ClaimSet, IdentityClaims, RefreshClaims, Signed};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::identity::Identity;

/// Source of the keys used to sign and verify tokens
pub trait SigningKeys: Send + Sync {
    fn encoding_key(&self) -> &EncodingKey;
    fn decoding_key(&self) -> &DecodingKey;
}

/// Keys derived once from a shared secret
pub struct StaticSigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl StaticSigningKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl SigningKeys for StaticSigningKeys {
    fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Access and refresh token minted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<dyn SigningKeys>,
    issuer: String,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(
        keys: Arc<dyn SigningKeys>,
        issuer: impl Into<String>,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
    ) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock in `validate_at`
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[&issuer]);

        Self {
            keys,
            issuer,
            access_lifetime,
            refresh_lifetime,
            validation,
        }
    }

    pub fn from_settings(config: &JwtSettings) -> Self {
        Self::new(
            Arc::new(StaticSigningKeys::from_secret(config.secret.as_bytes())),
            config.issuer.clone(),
            Duration::seconds(config.access_token_expiry),
            Duration::seconds(config.refresh_token_expiry),
        )
    }

    pub fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    /// Sign `claims` so that they expire `lifetime` from now
    pub fn mint<C: ClaimSet>(&self, claims: C, lifetime: Duration) -> Result<String, AppError> {
        self.mint_at(claims, lifetime, Utc::now().timestamp())
    }

    pub fn mint_at<C: ClaimSet>(
        &self,
        claims: C,
        lifetime: Duration,
        issued_at: i64,
    ) -> Result<String, AppError> {
        let signed = Signed::new(claims, self.issuer.clone(), issued_at, lifetime.num_seconds());

        encode(
            &Header::new(Algorithm::HS256),
            &signed,
            self.keys.encoding_key(),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Mint the access/refresh pair for an identity
    pub fn mint_pair(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        self.mint_pair_at(identity, Utc::now().timestamp())
    }

    pub fn mint_pair_at(&self, identity: &Identity, issued_at: i64) -> Result<TokenPair, AppError> {
        let access_token = self.mint_at(
            IdentityClaims::from(identity),
            self.access_lifetime,
            issued_at,
        )?;
        let refresh_token = self.mint_at(
            RefreshClaims { sub: identity.id },
            self.refresh_lifetime,
            issued_at,
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify a token and return its claims
    ///
    /// # Errors
    /// `MalformedToken` if the token does not parse, its signature or issuer
    /// does not match, or it is the wrong half of a pair. `ExpiredToken` if
    /// its expiry is at or before now.
    pub fn validate<C: ClaimSet>(&self, token: &str) -> Result<C, AuthError> {
        self.validate_at(token, Utc::now().timestamp())
    }

    pub fn validate_at<C: ClaimSet>(&self, token: &str, now: i64) -> Result<C, AuthError> {
        let signed = decode::<Signed<C>>(token, self.keys.decoding_key(), &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                AuthError::MalformedToken
            })?;

        if signed.token_use != C::TOKEN_USE {
            tracing::debug!(token_use = ?signed.token_use, "Token presented for the wrong use");
            return Err(AuthError::MalformedToken);
        }

        if signed.is_expired_at(now) {
            return Err(AuthError::ExpiredToken);
        }

        Ok(signed.claims)
    }
}
