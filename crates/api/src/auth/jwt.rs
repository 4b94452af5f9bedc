//! Supabase session token validation

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience and role Supabase puts on signed-in user sessions
pub const SUPABASE_AUDIENCE: &str = "authenticated";

/// JWT claims structure for Supabase-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    /// Subject (user ID as string, parsed to UUID by the auth gate)
    pub sub: String,
    pub email: Option<String>,
    /// Role (authenticated, anon, service_role)
    pub role: Option<String>,
    pub aud: Option<String>,
    pub iat: Option<i64>,
    pub exp: i64,
}

impl SupabaseClaims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::Invalid)
    }
}

/// Validates Supabase-issued session tokens (HS256 with the project's JWT secret)
#[derive(Clone)]
pub struct JwtManager {
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(supabase_secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(supabase_secret.as_bytes()),
        }
    }

    /// Validate a Supabase session token.
    /// Algorithm and audience are pinned; anonymous sessions are rejected.
    pub fn validate_supabase_token(&self, token: &str) -> Result<SupabaseClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance
        validation.set_audience(&[SUPABASE_AUDIENCE]);

        let claims = match decode::<SupabaseClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return Err(match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                    jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                    jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                    jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                        tracing::warn!("Supabase JWT audience validation failed - rejecting token");
                        JwtError::Invalid
                    }
                    _ => JwtError::Validation(e.to_string()),
                })
            }
        };

        if claims.role.as_deref().is_some_and(|r| r != SUPABASE_AUDIENCE) {
            return Err(JwtError::NotAuthenticated);
        }

        Ok(claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Session is not an authenticated user")]
    NotAuthenticated,
    #[error("Token validation failed: {0}")]
    Validation(String),
}

/// Sign a Supabase-shaped session token (tests only)
#[cfg(test)]
pub(crate) fn sign_test_token(secret: &str, user_id: Uuid, role: &str, exp_offset_secs: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let claims = SupabaseClaims {
        sub: user_id.to_string(),
        email: Some("teste@heartbalance.com.br".to_string()),
        role: Some(role.to_string()),
        aud: Some(SUPABASE_AUDIENCE.to_string()),
        iat: Some(now),
        exp: now + exp_offset_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
