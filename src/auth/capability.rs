/// What a caller must be allowed to do for a request to proceed

use uuid::Uuid;

use crate::auth::claims::IdentityClaims;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Any valid access token
    Authenticated,
    /// The token must belong to the target identity, or to an admin
    SelfOrAdmin(Uuid),
}

impl Capability {
    pub fn check(&self, claims: &IdentityClaims) -> Result<(), AuthError> {
        match self {
            Capability::Authenticated => Ok(()),
            Capability::SelfOrAdmin(target) => {
                if claims.sub == *target || claims.is_admin() {
                    Ok(())
                } else {
                    Err(AuthError::Forbidden)
                }
            }
        }
    }
}
