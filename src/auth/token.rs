use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, SessionClaim};
use crate::config::AuthConfig;
use crate::error::{AppError, AuthError};

/// HS256 signer/verifier for session tokens.
///
/// Expiry is checked with zero leeway: a token is dead the second its `exp`
/// passes.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(&auth.jwt_secret, auth.token_ttl_seconds)
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn sign(&self, claim: &SessionClaim) -> Result<String, AppError> {
        self.sign_at(claim, Utc::now())
    }

    pub fn sign_at(&self, claim: &SessionClaim, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let iat = issued_at.timestamp();
        let claims = Claims {
            sub: claim.user_id.clone(),
            email: claim.email.clone(),
            name: claim.name.clone(),
            role: claim.role,
            iat,
            nbf: iat,
            exp: (issued_at + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::InternalError(format!("failed to sign session token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::SignatureMismatch,
                _ => AuthError::MalformedToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::Role;

    const WEEK: i64 = 60 * 60 * 24 * 7;

    fn claim(role: Role) -> SessionClaim {
        SessionClaim {
            user_id: "6650f0c2a1b2c3d4e5f60718".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            role,
        }
    }

    #[test]
    fn test_round_trip_preserves_claim() {
        let codec = TokenCodec::new("secret", WEEK);
        for role in [Role::User, Role::Admin] {
            let input = claim(role);
            let token = codec.sign(&input).unwrap();
            let claims = codec.verify(&token).unwrap();
            assert_eq!(claims.session(), input);
            assert_eq!(claims.exp - claims.iat, WEEK);
            assert_eq!(claims.nbf, claims.iat);
        }
    }

    #[test]
    fn test_each_token_gets_a_fresh_jti() {
        let codec = TokenCodec::new("secret", WEEK);
        let a = codec.verify(&codec.sign(&claim(Role::User)).unwrap()).unwrap();
        let b = codec.verify(&codec.sign(&claim(Role::User)).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let codec = TokenCodec::new("secret", WEEK);
        let issued = Utc::now() - Duration::seconds(WEEK + 5);
        let token = codec.sign_at(&claim(Role::User), issued).unwrap();
        assert!(matches!(codec.verify(&token), Err(AuthError::ExpiredToken)));
    }

    #[test]
    fn test_token_expiring_one_second_ago_is_rejected() {
        let codec = TokenCodec::new("secret", 60);
        let issued = Utc::now() - Duration::seconds(61);
        let token = codec.sign_at(&claim(Role::Admin), issued).unwrap();
        assert!(codec.verify(&token).is_err());
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let minted = TokenCodec::new("secret-a", WEEK).sign(&claim(Role::Admin)).unwrap();
        let result = TokenCodec::new("secret-b", WEEK).verify(&minted);
        assert!(matches!(result, Err(AuthError::SignatureMismatch)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = TokenCodec::new("secret", WEEK);
        assert!(matches!(codec.verify("not-a-jwt"), Err(AuthError::MalformedToken)));
        assert!(matches!(codec.verify(""), Err(AuthError::MalformedToken)));
    }

    #[test]
    fn test_missing_role_defaults_to_user() {
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({
            "sub": "u1",
            "email": "a@b.co",
            "name": "Ada",
            "iat": now,
            "nbf": now,
            "exp": now + 60,
            "jti": "j"
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let claims = TokenCodec::new("secret", 60).verify(&token).unwrap();
        assert_eq!(claims.role, Role::User);
    }
}
