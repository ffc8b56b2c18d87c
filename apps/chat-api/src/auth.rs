//! Bearer-token verification for gateway handshakes.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Authenticated principal attached to a session at handshake time.
///
/// Immutable for the lifetime of the connection it was resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
}

/// Resolves an opaque bearer token to an [`Identity`].
///
/// Called exactly once per connection, before any named event is processed.
/// Failure means the gateway closes the socket without creating a session.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Claims carried by a chat bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    pub username: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// HS256 JWT verifier backed by a shared secret.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "token validation failed");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                    _ => AuthError::Invalid,
                }
            })?;

        Ok(Identity {
            id: data.claims.sub,
            username: data.claims.username,
        })
    }
}
