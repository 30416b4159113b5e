//! Claim access for route handlers.
//!
//! Handlers call these (or take the extractors) before touching data. The gate
//! has usually attached verified claims to the request already; when it has
//! not, credentials are resolved the same way the gate does it.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, Ready};

use crate::auth::claims::Claims;
use crate::auth::gate::resolve_claims;
use crate::error::{AppError, AuthError};
use crate::AppState;

pub fn get_current_claim(req: &HttpRequest) -> Option<Claims> {
    if let Some(claims) = req.extensions().get::<Claims>() {
        return Some(claims.clone());
    }
    let state = req.app_data::<web::Data<AppState>>()?;
    resolve_claims(&state.sessions, req).ok()
}

pub fn require_auth(req: &HttpRequest) -> Result<Claims, AuthError> {
    get_current_claim(req).ok_or(AuthError::MissingCredential)
}

pub fn require_admin_role(req: &HttpRequest) -> Result<Claims, AuthError> {
    let claims = require_auth(req)?;
    if claims.role.is_admin() {
        Ok(claims)
    } else {
        Err(AuthError::InsufficientRole)
    }
}

/// The caller's claims, if any.
#[derive(Debug, Clone)]
pub struct CurrentClaim(pub Option<Claims>);

/// Rejects with the 401 envelope when the caller has no valid session.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub Claims);

/// Like [`RequireAuth`], and answers 403 for non-admin sessions.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Claims);

impl FromRequest for CurrentClaim {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(CurrentClaim(get_current_claim(req))))
    }
}

impl FromRequest for RequireAuth {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            require_auth(req)
                .map(RequireAuth)
                .map_err(|e| AppError::from(e).into()),
        )
    }
}

impl FromRequest for RequireAdmin {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            require_admin_role(req)
                .map(RequireAdmin)
                .map_err(|e| AppError::from(e).into()),
        )
    }
}
