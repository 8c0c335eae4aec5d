use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Clock-skew tolerance for `exp` validation, in seconds.
const LEEWAY_SECONDS: u64 = 30;

/// Raw claims carried by a marketplace access token.
#[derive(Debug, Deserialize)]
struct RawClaims {
    /// Subject: the user's ID.
    sub: String,
    /// Email address.
    email: String,
    /// Role (brand, creator, admin).
    role: String,
    /// Tenant scope, if any.
    #[serde(default)]
    tenant_id: Option<String>,
    /// Expiry (Unix timestamp) - validated by jsonwebtoken internally.
    #[allow(dead_code)]
    exp: u64,
}

/// Verified claims from a valid access token.
#[derive(Debug, Clone)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub tenant_id: Option<String>,
}

/// Stateless verifier for HS256 bearer tokens.
///
/// The fallback identity path of the hybrid guard: no store round trip,
/// and therefore no server-side revocation.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier from the shared signing secret.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECONDS;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verifies a token's signature and expiry and extracts its claims.
    pub fn verify(&self, token: &str) -> Result<AccessClaims> {
        let data = jsonwebtoken::decode::<RawClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Authentication(format!("invalid or expired token: {}", e)))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::Authentication("invalid subject claim".to_string()))?;

        Ok(AccessClaims {
            user_id,
            email: data.claims.email,
            role: data.claims.role,
            tenant_id: data.claims.tenant_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "unit-test-signing-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        email: String,
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tenant_id: Option<String>,
        exp: i64,
    }

    fn issue(claims: &TestClaims, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> TestClaims {
        TestClaims {
            sub: Uuid::new_v4().to_string(),
            email: "creator@example.com".to_string(),
            role: "creator".to_string(),
            tenant_id: Some("agency-7".to_string()),
            exp: Utc::now().timestamp() + 3600,
        }
    }

    #[test]
    fn valid_token_verifies() {
        let claims = valid_claims();
        let token = issue(&claims, SECRET);

        let verified = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(verified.user_id.to_string(), claims.sub);
        assert_eq!(verified.email, "creator@example.com");
        assert_eq!(verified.role, "creator");
        assert_eq!(verified.tenant_id.as_deref(), Some("agency-7"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = valid_claims();
        claims.exp = Utc::now().timestamp() - 3600;
        let token = issue(&claims, SECRET);

        assert!(TokenVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue(&valid_claims(), "some-other-secret");
        assert!(TokenVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let mut claims = valid_claims();
        claims.sub = "not-a-uuid".to_string();
        let token = issue(&claims, SECRET);

        assert!(TokenVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        assert!(verifier.verify("").is_err());
        assert!(verifier.verify("definitely.not.a-jwt").is_err());
    }
}
