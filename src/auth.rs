//! Bearer-token authentication.
//!
//! Tokens are self-contained: `<user_id>.<hex hmac-sha256(secret, user_id)>`.
//! The server verifies the signature against its shared secret, so no
//! session table is needed and every request names the user it acts for.
//! The secret comes from the `PAPERCHAT_AUTH_SECRET` environment variable.

use anyhow::Result;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

const AUTH_SECRET_ENV: &str = "PAPERCHAT_AUTH_SECRET";

#[derive(Clone)]
pub struct AuthVerifier {
    secret: Vec<u8>,
}

impl AuthVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(AUTH_SECRET_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", AUTH_SECRET_ENV))?;
        if secret.len() < 16 {
            anyhow::bail!("{} must be at least 16 bytes", AUTH_SECRET_ENV);
        }
        Ok(Self::new(secret.into_bytes()))
    }

    /// Issue a token for a user id. Mainly for operators and tests;
    /// there is no user registry to check against.
    pub fn mint(&self, user_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(user_id.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("{}.{}", user_id, sig)
    }

    /// Verify a token and return the user id it was minted for.
    pub fn verify(&self, token: &str) -> Option<String> {
        let (user_id, sig_hex) = token.rsplit_once('.')?;
        if user_id.is_empty() {
            return None;
        }
        let sig = hex::decode(sig_hex).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(user_id.as_bytes());
        mac.verify_slice(&sig).ok()?;

        Some(user_id.to_string())
    }
}

/// The authenticated caller, extracted from the `Authorization: Bearer`
/// header. Handlers that take this reject unauthenticated requests with
/// 401 before running.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    AuthVerifier: axum::extract::FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = AuthVerifier::from_ref(state);

        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        verifier
            .verify(token)
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify_roundtrips() {
        let verifier = AuthVerifier::new(b"test-secret-test-secret".to_vec());
        let token = verifier.mint("alice");
        assert_eq!(verifier.verify(&token).as_deref(), Some("alice"));
    }

    #[test]
    fn tampered_user_id_is_rejected() {
        let verifier = AuthVerifier::new(b"test-secret-test-secret".to_vec());
        let token = verifier.mint("alice");
        let (_, sig) = token.rsplit_once('.').unwrap();
        assert!(verifier.verify(&format!("mallory.{}", sig)).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let minted = AuthVerifier::new(b"secret-one-secret-one".to_vec()).mint("alice");
        let other = AuthVerifier::new(b"secret-two-secret-two".to_vec());
        assert!(other.verify(&minted).is_none());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let verifier = AuthVerifier::new(b"test-secret-test-secret".to_vec());
        assert!(verifier.verify("").is_none());
        assert!(verifier.verify("no-separator").is_none());
        assert!(verifier.verify(".deadbeef").is_none());
        assert!(verifier.verify("alice.not-hex").is_none());
    }

    #[test]
    fn user_ids_with_dots_survive() {
        let verifier = AuthVerifier::new(b"test-secret-test-secret".to_vec());
        let token = verifier.mint("alice.smith");
        assert_eq!(verifier.verify(&token).as_deref(), Some("alice.smith"));
    }
}
