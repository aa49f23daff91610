use anyhow::Result;
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Payload of a sign-in token.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed token and its lifetime in milliseconds.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_in_ms: i64,
}

/// Signs HS256 sign-in tokens handed to clients after a successful sign-in.
///
/// The key lives only in this process, so tokens do not survive a restart.
/// Routes do not check tokens; they act on the user ids clients declare.
pub struct TokenSigner {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(ttl: Duration) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_secret(&secret, ttl)
    }

    pub fn with_secret(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn sign(&self, user_id: &str) -> Result<SignedToken> {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.key)?;
        Ok(SignedToken {
            token,
            expires_in_ms: self.ttl.whole_milliseconds() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    #[test]
    fn signed_token_carries_user_and_lifetime() {
        let signer = TokenSigner::with_secret(b"test-secret", Duration::hours(24));
        let signed = signer.sign("user-000").unwrap();
        assert_eq!(signed.expires_in_ms, 24 * 60 * 60 * 1000);

        let data = decode::<SessionClaims>(
            &signed.token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "user-000");
        assert_eq!(data.claims.exp - data.claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn each_signer_has_its_own_key() {
        let a = TokenSigner::new(Duration::hours(1)).sign("u1").unwrap();
        let b = TokenSigner::new(Duration::hours(1)).sign("u1").unwrap();
        assert_ne!(a.token, b.token);
    }
}
