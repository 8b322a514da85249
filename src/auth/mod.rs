/// Authentication module
///
/// Handles password hashing, JWT minting/validation for access and refresh
/// tokens, and capability checks on validated claims.

mod capability;
mod claims;
mod jwt;
mod password;

pub use capability::Capability;
pub use claims::{ClaimSet, IdentityClaims, RefreshClaims, Signed, TokenUse};
pub use jwt::{SigningKeys, StaticSigningKeys, TokenCodec, TokenPair};
pub use password::{hash_password, verify_password, PasswordHasher, MAX_PASSWORD_BYTES};
