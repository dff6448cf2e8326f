use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    entity::users::UserRole,
    error::{AppError, AppResult},
};

/// Session tokens are valid for 24 hours from issue.
const SESSION_TTL_HOURS: i64 = 24;

/// Signs and verifies session tokens. Constructed once from the configured
/// secret and handed to handlers through `AppState`.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: Uuid, role: UserRole) -> AppResult<String> {
        let expiration = Utc::now()
            .checked_add_signed(Duration::hours(SESSION_TTL_HOURS))
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: expiration.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let decoded = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let signer = TokenSigner::new("test-secret");
        let user_id = Uuid::new_v4();
        let token = signer.issue(user_id, UserRole::Customer).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, UserRole::Customer);
    }

    #[test]
    fn verify_rejects_token_from_other_secret() {
        let signer = TokenSigner::new("test-secret");
        let other = TokenSigner::new("other-secret");
        let token = signer.issue(Uuid::new_v4(), UserRole::Admin).unwrap();
        assert!(other.verify(&token).is_err());
    }
}
