use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Opaque identity substitute for unauthenticated carts. Round-trips through
/// a cookie managed by the outer layer; the core only treats it as a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestToken(pub String);

impl GuestToken {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut token = String::with_capacity(32);
        for _ in 0..32 {
            let nibble: u8 = rng.gen_range(0..16);
            token.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
        }
        Self(token)
    }
}

/// Exactly one of user or guest; the enum makes the "never both, never
/// neither" cart-owner invariant unrepresentable in memory. Persisted rows
/// are checked on decode instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    User(UserId),
    Guest(GuestToken),
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::User(id) => Some(id),
            Self::Guest(_) => None,
        }
    }

    /// Rebuild an identity from a persisted `(user_id, guest_token)` column
    /// pair. Both set or both unset is corrupted data and must abort.
    pub fn from_columns(
        user_id: Option<String>,
        guest_token: Option<String>,
    ) -> Result<Self, DomainError> {
        match (user_id, guest_token) {
            (Some(user), None) => Ok(Self::User(UserId(user))),
            (None, Some(token)) => Ok(Self::Guest(GuestToken(token))),
            (Some(_), Some(_)) => Err(DomainError::InvariantViolation(
                "cart owner has both user id and guest token set".to_string(),
            )),
            (None, None) => Err(DomainError::InvariantViolation(
                "cart owner has neither user id nor guest token set".to_string(),
            )),
        }
    }

    pub fn into_columns(self) -> (Option<String>, Option<String>) {
        match self {
            Self::User(UserId(user)) => (Some(user), None),
            Self::Guest(GuestToken(token)) => (None, Some(token)),
        }
    }
}

/// Explicit per-request context. The core never reaches into ambient
/// framework state; whatever resolved the user or minted the guest token
/// passes the result in here.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub identity: Identity,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(identity: Identity, correlation_id: impl Into<String>) -> Self {
        Self { identity, correlation_id: correlation_id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuestToken, Identity};

    #[test]
    fn generated_guest_tokens_are_distinct_hex() {
        let first = GuestToken::generate();
        let second = GuestToken::generate();
        assert_eq!(first.0.len(), 32);
        assert!(first.0.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn columns_round_trip_for_both_identity_kinds() {
        let user = Identity::from_columns(Some("u-1".to_string()), None).expect("user identity");
        assert!(user.is_authenticated());
        assert_eq!(user.into_columns(), (Some("u-1".to_string()), None));

        let guest = Identity::from_columns(None, Some("abc".to_string())).expect("guest identity");
        assert!(!guest.is_authenticated());
    }

    #[test]
    fn corrupted_owner_columns_are_rejected() {
        assert!(Identity::from_columns(None, None).is_err());
        assert!(Identity::from_columns(Some("u-1".to_string()), Some("abc".to_string())).is_err());
    }
}
