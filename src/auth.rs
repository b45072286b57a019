use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    config::{AppConfig, BootstrapAdmin},
    error::{AppError, AppResult},
    models::AdminIdentity,
    repository::RepositoryState,
};

/// Claims
///
/// Payload signed into every admin token. Tokens are self-contained: nothing about
/// them is stored server-side, so a token stays valid until `exp` even after the
/// client discards it. There is no revocation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject: the admin's id, as a string per JWT convention.
    pub sub: String,
    pub username: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// TokenIssuer
///
/// Issues and verifies HS256 tokens with the server-held secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.token_ttl_hours)
    }

    pub fn issue(&self, identity: &AdminIdentity) -> AppResult<String> {
        self.issue_at(identity, Utc::now())
    }

    /// Issues a token as if it had been signed at `issued_at`.
    pub fn issue_at(&self, identity: &AdminIdentity, issued_at: DateTime<Utc>) -> AppResult<String> {
        let claims = Claims {
            sub: identity.id.to_string(),
            username: identity.username.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    /// Checks signature and expiry. Any failure yields an error; there is no
    /// partially trusted result.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}

/// CredentialVerifier
///
/// The credential-store side of login. Unknown usernames are checked against a
/// throwaway digest so both failure paths run one bcrypt verify and return the
/// same error. The throwaway digest must share the cost of the stored digests;
/// `calibrate` aligns it at startup and `verify` re-aligns it when it meets a
/// stored digest of another cost.
#[derive(Clone)]
pub struct CredentialVerifier {
    repo: RepositoryState,
    decoy_digest: Arc<RwLock<Arc<str>>>,
}

impl CredentialVerifier {
    pub fn new(repo: RepositoryState, cost: u32) -> AppResult<Self> {
        let decoy = bcrypt::hash(uuid::Uuid::new_v4().to_string(), cost)
            .map_err(|e| AppError::Internal(format!("decoy digest failed: {e}")))?;
        Ok(Self {
            repo,
            decoy_digest: Arc::new(RwLock::new(Arc::from(decoy))),
        })
    }

    /// Rehashes the decoy at the cost of the stored admin digests, if any exist.
    pub async fn calibrate(&self) -> AppResult<()> {
        match self.repo.find_first_admin().await? {
            Some(admin) => self.align_decoy(&admin.password_digest).await,
            None => Ok(()),
        }
    }

    /// Cost of the digest currently used for unknown usernames.
    pub async fn decoy_cost(&self) -> Option<u32> {
        digest_cost(&self.decoy_digest.read().await)
    }

    async fn align_decoy(&self, stored_digest: &str) -> AppResult<()> {
        let Some(cost) = digest_cost(stored_digest) else {
            return Ok(());
        };
        if self.decoy_cost().await == Some(cost) {
            return Ok(());
        }

        let decoy = hash_password(uuid::Uuid::new_v4().to_string(), cost).await?;
        *self.decoy_digest.write().await = Arc::from(decoy);
        tracing::info!(cost, "decoy digest aligned with stored admin digests");
        Ok(())
    }

    pub async fn verify(&self, username: &str, password: String) -> AppResult<AdminIdentity> {
        let admin = self.repo.find_admin_by_username(username).await?;
        let decoy = self.decoy_digest.read().await.clone();

        let digest = match &admin {
            Some(a) => a.password_digest.clone(),
            None => decoy.to_string(),
        };

        if admin.is_some() && digest_cost(&digest) != digest_cost(&decoy) {
            let verifier = self.clone();
            let stored = digest.clone();
            tokio::spawn(async move {
                if let Err(e) = verifier.align_decoy(&stored).await {
                    tracing::warn!(error = %e, "could not realign decoy digest");
                }
            });
        }

        // bcrypt is CPU-bound; keep it off the async workers.
        let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &digest))
            .await
            .map_err(|e| AppError::Internal(format!("digest task failed: {e}")))?;

        match (admin, outcome) {
            (Some(admin), Ok(true)) => Ok(admin),
            (Some(admin), Err(e)) => {
                tracing::error!(admin_id = admin.id, error = %e, "stored password digest is unreadable");
                Err(AppError::InvalidCredentials)
            }
            _ => Err(AppError::InvalidCredentials),
        }
    }
}

/// Cost field of a modular-crypt bcrypt digest such as `$2b$10$...`.
fn digest_cost(digest: &str) -> Option<u32> {
    let mut parts = digest.split('$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(""), Some(_version), Some(cost)) => cost.parse().ok(),
        _ => None,
    }
}

/// hash_password
///
/// Produces a salted bcrypt digest at the given cost.
pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("digest task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("hashing failed: {e}")))
}

/// provision_admin
///
/// Out-of-band provisioning: inserts the admin if the username is free and leaves
/// an existing identity untouched.
pub async fn provision_admin(
    repo: &RepositoryState,
    admin: &BootstrapAdmin,
    cost: u32,
) -> AppResult<AdminIdentity> {
    if let Some(existing) = repo.find_admin_by_username(&admin.username).await? {
        tracing::info!(username = %existing.username, "admin already provisioned");
        return Ok(existing);
    }

    let digest = hash_password(admin.password.clone(), cost).await?;
    let created = repo.insert_admin(&admin.username, &digest).await?;
    tracing::info!(username = %created.username, admin_id = created.id, "admin provisioned");
    Ok(created)
}

/// AdminUser
///
/// The verified identity attached to an admin request. It is derived only from the
/// bearer token, never from request bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
}

/// AdminUser Extractor Implementation
///
/// 1. Reuses an identity already attached by the admin route layer.
/// 2. Otherwise reads `Authorization: Bearer <token>`; absence is
///    `AuthenticationRequired` (401).
/// 3. Verifies the token; any failure is `AuthenticationRejected` (403).
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(admin) = parts.extensions.get::<AdminUser>() {
            return Ok(admin.clone());
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::AuthenticationRequired)?;

        let issuer = TokenIssuer::from_ref(state);
        let claims = issuer.verify(token).map_err(|e| {
            tracing::debug!(reason = %e, "bearer token rejected");
            AppError::AuthenticationRejected
        })?;

        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthenticationRejected)?;

        Ok(AdminUser {
            id,
            username: claims.username,
        })
    }
}
