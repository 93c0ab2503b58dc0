use crate::error::{AppError, AppResult};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Claims issued by the identity provider. We trust the triple as-is once
/// the signature checks out; credentials are never re-validated here.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub name: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated identity injected into request extensions by the
/// auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub username: String,
}

/// Verification only. Tokens are minted by the identity provider, not by
/// this service.
#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify_token(&self, token: &str) -> AppResult<AuthUser> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)?;

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Malformed subject claim".to_string()))?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            username: claims.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    /// Signs a token the way the identity provider would.
    fn mint(secret: &str, user_id: i64, email: &str, name: &str, expires_in_secs: i64) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_token_round_trip() {
        let service = JwtService::new("test-secret");
        let token = mint("test-secret", 42, "artist@example.com", "Mina", 3600);
        let user = service.verify_token(&token).unwrap();
        assert_eq!(user.user_id, 42);
        assert_eq!(user.email, "artist@example.com");
        assert_eq!(user.username, "Mina");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let verifier = JwtService::new("secret-b");
        let token = mint("secret-a", 1, "a@b.c", "A", 3600);
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = JwtService::new("test-secret");
        let token = mint("test-secret", 1, "a@b.c", "A", -120);
        assert!(service.verify_token(&token).is_err());
    }
}
