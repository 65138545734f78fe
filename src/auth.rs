use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    access::Requester,
    config::{AppConfig, Env},
    models::User,
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` to act as an arbitrary subject without a token.
pub const DEBUG_USER_HEADER: &str = "x-clerk-user-id";

/// Claims
///
/// The subset of a Clerk session token this service reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the external user id, stored as `clerk_user_id`.
    pub sub: String,
    /// Expiration Time (exp): always validated.
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
    /// Authorized party (azp): the origin the token was minted for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
}

/// AuthUser Extractor Result
///
/// The local user behind an authenticated request. Handlers on the
/// authenticated router take this to obtain their `Requester`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub clerk_user_id: String,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn requester(&self) -> Requester {
        if self.is_admin {
            Requester::Admin(self.clerk_user_id.clone())
        } else {
            Requester::User(self.clerk_user_id.clone())
        }
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            clerk_user_id: user.clerk_user_id,
            is_admin: user.is_admin,
        }
    }
}

/// verify_token
///
/// Checks signature and expiry, then the `azp` claim against the configured
/// authorized parties (skipped when that list is empty).
///
/// RS256 with `CLERK_JWT_KEY` when a PEM key is configured, HS256 with
/// `CLERK_SECRET_KEY` otherwise.
pub fn verify_token(token: &str, config: &AppConfig) -> Result<Claims, StatusCode> {
    let (decoding_key, algorithm) = match &config.clerk_jwt_key {
        Some(pem) => {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                tracing::error!("CLERK_JWT_KEY is not a valid RSA public key: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            (key, Algorithm::RS256)
        }
        None => (
            DecodingKey::from_secret(config.clerk_secret_key.as_bytes()),
            Algorithm::HS256,
        ),
    };

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;

    let token_data = match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => data,
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired session token"),
                other => tracing::debug!("rejected session token: {:?}", other),
            }
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let claims = token_data.claims;
    if !config.clerk_authorized_parties.is_empty() {
        let authorized = claims
            .azp
            .as_ref()
            .is_some_and(|azp| config.clerk_authorized_parties.contains(azp));
        if !authorized {
            tracing::debug!(azp = ?claims.azp, "rejected token from unauthorized party");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(claims)
}

/// resolve_subject
///
/// Finds the external subject of a request.
///
/// - `Ok(None)`: no credentials at all (anonymous).
/// - `Ok(Some(sub))`: a verified subject, or the local bypass identity.
/// - `Err(401)`: credentials were sent but are unusable.
pub fn resolve_subject(parts: &Parts, config: &AppConfig) -> Result<Option<String>, StatusCode> {
    // Local development bypass. `AppConfig::load` never sets
    // `debug_clerk_user_id` in production, the env check covers the header.
    if config.env == Env::Local {
        if let Some(debug_id) = &config.debug_clerk_user_id {
            return Ok(Some(debug_id.clone()));
        }
        if let Some(id) = parts
            .headers
            .get(DEBUG_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|id| !id.trim().is_empty())
        {
            return Ok(Some(id.to_string()));
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    verify_token(token, config).map(|claims| Some(claims.sub))
}

async fn load_user(repo: &RepositoryState, subject: &str) -> Result<User, StatusCode> {
    repo.find_or_create_user(subject).await.map_err(|e| {
        tracing::error!("Failed to resolve user {}: {}", subject, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// AuthUser Extractor Implementation
///
/// Requires credentials. A verified subject seen for the first time gets a
/// local user row.
///
/// Rejection: 401 when credentials are missing or invalid.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let subject = resolve_subject(parts, &config)?.ok_or(StatusCode::UNAUTHORIZED)?;
        let user = load_user(&repo, &subject).await?;

        Ok(AuthUser::from(user))
    }
}

/// Requester Extractor Implementation
///
/// Optional authentication for read endpoints: no credentials resolve to
/// `Requester::Anonymous`. A token that is present but invalid is still a 401.
impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        match resolve_subject(parts, &config)? {
            None => Ok(Requester::Anonymous),
            Some(subject) => {
                let user = load_user(&repo, &subject).await?;
                Ok(AuthUser::from(user).requester())
            }
        }
    }
}
