use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Number of characters from the UUID used as the public lookup part.
const LOOKUP_LENGTH: usize = 8;

/// Number of random bytes in the secret part (hex-encoded to twice this).
const SECRET_BYTES: usize = 12;

/// The kind of secret being minted, which determines the token prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Magic-link login credential.
    MagicLink,
    /// Tenant invitation credential.
    Invite,
    /// Long-lived programmatic API key.
    ApiKey,
}

impl TokenKind {
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            TokenKind::MagicLink => "swml",
            TokenKind::Invite => "swin",
            TokenKind::ApiKey => "sk",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "swml" => Some(TokenKind::MagicLink),
            "swin" => Some(TokenKind::Invite),
            "sk" => Some(TokenKind::ApiKey),
            _ => None,
        }
    }
}

/// A raw token split into its three parts.
#[derive(Debug, Clone)]
pub struct ParsedToken {
    pub kind: TokenKind,
    pub lookup: String,
    pub secret: String,
}

/// Mints and verifies opaque bearer secrets.
///
/// Tokens have the form `<prefix>_<lookup>_<secret>`. The lookup part is
/// stored in plaintext and indexed so verification costs one hash check,
/// not one per stored row. Only an argon2id hash of the secret part is
/// persisted.
pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(64 * 1024, 1, 4, Some(32)).expect("valid argon2 params");
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Generates a new token, returning the raw string (shown to the
    /// caller exactly once) and the hash to persist.
    pub fn generate(&self, kind: TokenKind) -> Result<(String, String, String)> {
        let lookup: String = Uuid::new_v4().simple().to_string()[..LOOKUP_LENGTH].to_string();

        let mut secret_bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = hex::encode(&secret_bytes);

        let raw = format!("{}_{}_{}", kind.prefix(), lookup, secret);
        let hash = self.hash(&secret)?;

        Ok((raw, lookup, hash))
    }

    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))?;
        Ok(hash.to_string())
    }

    #[must_use]
    pub fn verify(&self, secret: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Splits a raw token into `(kind, lookup, secret)`.
pub fn parse_token(raw: &str) -> Result<ParsedToken> {
    let mut parts = raw.splitn(3, '_');
    let (Some(prefix), Some(lookup), Some(secret)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidTokenFormat);
    };

    let kind = TokenKind::from_prefix(prefix).ok_or(Error::InvalidTokenFormat)?;
    if lookup.is_empty() || secret.is_empty() {
        return Err(Error::InvalidTokenFormat);
    }

    Ok(ParsedToken {
        kind,
        lookup: lookup.to_string(),
        secret: secret.to_string(),
    })
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
