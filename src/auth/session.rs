use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const SESSION_TTL_DAYS: i64 = 30;

/// How long an issued session stays valid.
pub fn default_session_ttl() -> Duration {
    Duration::days(SESSION_TTL_DAYS)
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing keys for browser sessions, derived from the server's
/// session secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Issues a signed session token for a user.
    pub fn issue(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Config(format!("failed to sign session token: {e}")))
    }

    /// Verifies a session token and returns the user id it names.
    pub fn verify(&self, token: &str) -> Result<String> {
        let validation = Validation::new(Algorithm::HS256);
        match jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) if *e.kind() == jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Err(Error::TokenExpired)
            }
            Err(_) => Err(Error::Unauthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_round_trip() {
        let keys = SessionKeys::new(b"test-secret");
        let token = keys.issue("user-1", default_session_ttl()).unwrap();
        assert_eq!(keys.verify(&token).unwrap(), "user-1");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = SessionKeys::new(b"test-secret");
        let token = keys.issue("user-1", Duration::seconds(-120)).unwrap();
        assert!(matches!(keys.verify(&token), Err(Error::TokenExpired)));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let keys = SessionKeys::new(b"secret-a");
        let other = SessionKeys::new(b"secret-b");
        let token = keys.issue("user-1", default_session_ttl()).unwrap();
        assert!(matches!(other.verify(&token), Err(Error::Unauthenticated)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let keys = SessionKeys::new(b"test-secret");
        assert!(keys.verify("not.a.jwt").is_err());
    }
}
