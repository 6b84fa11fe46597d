//! Authentication middleware for JWT bearer tokens
//!
//! Every request passes through [`authenticate`]. A valid token for a known
//! user attaches a [`Principal`] to the request; anything else leaves the
//! request anonymous. Handlers that need a caller take [`CurrentUser`], which
//! rejects anonymous requests with 401.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, EventError};
use crate::models::Principal;
use crate::state::AppState;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Issued at time, optional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Expiration time
    pub exp: u64,
}

/// HS256 token verifier
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }
}

/// Resolve the bearer token, if any, into a principal
pub async fn authenticate(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        match state.jwt.verify(bearer.token()) {
            Ok(claims) => {
                let user = state
                    .storage
                    .bounded(state.backend().find_user(claims.sub))
                    .await
                    .map_err(EventError::from)?;

                match user {
                    Some(user) => {
                        req.extensions_mut().insert(Principal::from(&user));
                    }
                    None => debug!(user_id = %claims.sub, "Token subject is not a known user"),
                }
            }
            Err(e) => debug!(error = %e, "Ignoring invalid bearer token"),
        }
    }

    Ok(next.run(req).await)
}

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentUser)
            .ok_or(ApiError::Unauthenticated)
    }
}
