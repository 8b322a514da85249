/// JWT Claims structures
///
/// A claim set is what the caller asks to sign. `Signed<C>` is the envelope
/// the codec wraps around it at mint time: token use, issuer, issue and
/// expiry timestamps (RFC 7519), and a unique token id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Identity, UserType};

/// Which half of a token pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// A payload that can be signed into a token
pub trait ClaimSet: Serialize + DeserializeOwned {
    const TOKEN_USE: TokenUse;
}

/// Claims carried by access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Subject (identity id)
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub user_type: UserType,
}

impl IdentityClaims {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }
}

impl From<&Identity> for IdentityClaims {
    fn from(identity: &Identity) -> Self {
        Self {
            sub: identity.id,
            email: identity.email.clone(),
            name: identity.name.clone(),
            user_type: identity.user_type,
        }
    }
}

impl ClaimSet for IdentityClaims {
    const TOKEN_USE: TokenUse = TokenUse::Access;
}

/// Claims carried by refresh tokens: only whose token it is
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: Uuid,
}

impl ClaimSet for RefreshClaims {
    const TOKEN_USE: TokenUse = TokenUse::Refresh;
}

/// Envelope around a claim set as it appears on the wire
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Signed<C> {
    #[serde(flatten)]
    pub claims: C,
    pub token_use: TokenUse,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token id
    pub jti: Uuid,
}

impl<C: ClaimSet> Signed<C> {
    pub fn new(claims: C, issuer: String, issued_at: i64, lifetime_seconds: i64) -> Self {
        Self {
            claims,
            token_use: C::TOKEN_USE,
            iss: issuer,
            iat: issued_at,
            exp: issued_at + lifetime_seconds,
            jti: Uuid::new_v4(),
        }
    }

    /// Expired at or after `exp`
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}
