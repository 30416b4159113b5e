//! Request authorization gate.
//!
//! Every request is classified by path, then run through a fixed pipeline of
//! stages (landing redirect for signed-in visitors of the auth pages,
//! authentication, role check). Each stage either lets the request continue
//! or ends it with a redirect or a rejection.

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::middleware::Next;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use tracing::debug;
use url::form_urlencoded;

use crate::auth::claims::Claims;
use crate::auth::cookie::SessionCookies;
use crate::error::{AppError, AuthError, ErrorEnvelope};
use crate::AppState;

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const LANDING_PATH: &str = "/api-doc";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const ADMIN_PREFIX: &str = "/admin";

/// Reachable without a session. `/` matches only itself; every other entry
/// also covers the paths nested below it.
pub const PUBLIC_PATHS: &[&str] = &[
    LOGIN_PATH,
    REGISTER_PATH,
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/verify",
    "/api/auth/logout",
    "/",
    LANDING_PATH,
    UNAUTHORIZED_PATH,
    "/health",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    RequiresAuth,
    RequiresAdmin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Redirect(String),
    Reject(StatusCode, ErrorEnvelope),
}

/// What the stages get to see about a request.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub path: &'a str,
    pub access: Access,
    pub claims: Option<&'a Claims>,
}

type Stage = fn(&GateRequest<'_>) -> Outcome;

const PIPELINE: &[Stage] = &[landing_stage, authentication_stage, role_stage];

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn classify(path: &str) -> Access {
    if under(path, ADMIN_PREFIX) {
        return Access::RequiresAdmin;
    }
    let public = PUBLIC_PATHS.iter().any(|p| {
        if *p == "/" {
            path == "/"
        } else {
            under(path, p)
        }
    });
    if public {
        Access::Public
    } else {
        Access::RequiresAuth
    }
}

pub fn is_api_path(path: &str) -> bool {
    under(path, "/api")
}

fn is_auth_page(path: &str) -> bool {
    path == LOGIN_PATH || path == REGISTER_PATH
}

/// Whether the pipeline needs the caller's claims for this request.
pub fn needs_credentials(access: Access, path: &str) -> bool {
    access != Access::Public || is_auth_page(path)
}

pub fn login_redirect(path: &str) -> String {
    let callback: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("{}?callbackUrl={}", LOGIN_PATH, callback)
}

fn landing_stage(req: &GateRequest<'_>) -> Outcome {
    if req.access == Access::Public && is_auth_page(req.path) && req.claims.is_some() {
        return Outcome::Redirect(LANDING_PATH.to_string());
    }
    Outcome::Continue
}

fn authentication_stage(req: &GateRequest<'_>) -> Outcome {
    if req.access == Access::Public || req.claims.is_some() {
        return Outcome::Continue;
    }
    if is_api_path(req.path) {
        Outcome::Reject(StatusCode::UNAUTHORIZED, ErrorEnvelope::unauthorized())
    } else {
        Outcome::Redirect(login_redirect(req.path))
    }
}

fn role_stage(req: &GateRequest<'_>) -> Outcome {
    match (req.access, req.claims) {
        (Access::RequiresAdmin, Some(claims)) if !claims.role.is_admin() => {
            Outcome::Redirect(UNAUTHORIZED_PATH.to_string())
        }
        _ => Outcome::Continue,
    }
}

/// Runs the stages in order; the first non-`Continue` outcome wins.
pub fn dispatch(req: &GateRequest<'_>) -> Outcome {
    for stage in PIPELINE {
        match stage(req) {
            Outcome::Continue => continue,
            outcome => return outcome,
        }
    }
    Outcome::Continue
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Verifies the session cookie, then the bearer header; the first token that
/// verifies wins. Failure reasons are logged, never returned to clients.
pub fn resolve_claims(sessions: &SessionCookies, req: &HttpRequest) -> Result<Claims, AuthError> {
    let candidates = [
        ("cookie", sessions.session_token(req)),
        ("bearer", bearer_token(req)),
    ];

    let mut last = AuthError::MissingCredential;
    for (source, token) in candidates {
        let Some(token) = token else { continue };
        match sessions.codec().verify(&token) {
            Ok(claims) => return Ok(claims),
            Err(e) => {
                debug!(source, reason = %e, "credential rejected");
                last = e;
            }
        }
    }
    Err(last)
}

/// Middleware entry point; install with `middleware::from_fn(authorize)`.
pub async fn authorize<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| AppError::ConfigError("application state is not registered".into()))?;

    // Classify the decoded path the router matches on, not the raw URI.
    let path = req.match_info().path().to_string();
    let access = classify(&path);
    let claims = if needs_credentials(access, &path) {
        resolve_claims(&state.sessions, req.request()).ok()
    } else {
        None
    };

    let outcome = dispatch(&GateRequest {
        path: &path,
        access,
        claims: claims.as_ref(),
    });

    match outcome {
        Outcome::Continue => {
            if let Some(claims) = claims {
                req.extensions_mut().insert(claims);
            }
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Outcome::Redirect(target) => {
            debug!(path = %path, ?access, target = %target, "gate redirect");
            let res = HttpResponse::TemporaryRedirect()
                .insert_header((header::LOCATION, target))
                .finish();
            Ok(req.into_response(res).map_into_right_body())
        }
        Outcome::Reject(status, body) => {
            debug!(path = %path, ?access, status = status.as_u16(), "gate rejected request");
            let res = HttpResponse::build(status).json(body);
            Ok(req.into_response(res).map_into_right_body())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{Role, SessionClaim};
    use crate::auth::token::TokenCodec;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    fn claims(role: Role) -> Claims {
        Claims {
            sub: "u1".into(),
            email: "a@b.co".into(),
            name: "Ada".into(),
            role,
            iat: 0,
            nbf: 0,
            exp: i64::MAX,
            jti: "j".into(),
        }
    }

    fn run(path: &str, claims: Option<&Claims>) -> Outcome {
        dispatch(&GateRequest {
            path,
            access: classify(path),
            claims,
        })
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("/"), Access::Public);
        assert_eq!(classify("/login"), Access::Public);
        assert_eq!(classify("/api/auth/login"), Access::Public);
        assert_eq!(classify("/api-doc"), Access::Public);
        assert_eq!(classify("/api-doc/swagger.json"), Access::Public);
        assert_eq!(classify("/health"), Access::Public);

        assert_eq!(classify("/movies/42"), Access::RequiresAuth);
        assert_eq!(classify("/api/movies"), Access::RequiresAuth);
        assert_eq!(classify("/api/auth/me"), Access::RequiresAuth);
        assert_eq!(classify("/login-history"), Access::RequiresAuth);

        assert_eq!(classify("/admin"), Access::RequiresAdmin);
        assert_eq!(classify("/admin/users"), Access::RequiresAdmin);
        assert_eq!(classify("/administrator"), Access::RequiresAuth);
    }

    #[test]
    fn test_public_paths_pass_without_session() {
        assert_eq!(run("/", None), Outcome::Continue);
        assert_eq!(run("/login", None), Outcome::Continue);
        assert_eq!(run("/api/auth/verify", None), Outcome::Continue);
    }

    #[test]
    fn test_signed_in_visitor_is_sent_away_from_login() {
        let user = claims(Role::User);
        assert_eq!(run("/login", Some(&user)), Outcome::Redirect("/api-doc".into()));
        assert_eq!(run("/register", Some(&user)), Outcome::Redirect("/api-doc".into()));
        assert_eq!(run("/api/auth/login", Some(&user)), Outcome::Continue);
    }

    #[test]
    fn test_protected_api_without_session_is_rejected() {
        assert_eq!(
            run("/api/movies", None),
            Outcome::Reject(StatusCode::UNAUTHORIZED, ErrorEnvelope::unauthorized())
        );
    }

    #[test]
    fn test_protected_page_without_session_redirects_to_login() {
        assert_eq!(
            run("/movies/42", None),
            Outcome::Redirect("/login?callbackUrl=%2Fmovies%2F42".into())
        );
        assert_eq!(
            run("/admin/users", None),
            Outcome::Redirect("/login?callbackUrl=%2Fadmin%2Fusers".into())
        );
    }

    #[test]
    fn test_admin_paths_check_role() {
        let user = claims(Role::User);
        let admin = claims(Role::Admin);
        assert_eq!(run("/admin/users", Some(&user)), Outcome::Redirect("/unauthorized".into()));
        assert_eq!(run("/admin/users", Some(&admin)), Outcome::Continue);
        assert_eq!(run("/movies/42", Some(&user)), Outcome::Continue);
    }

    #[test]
    fn test_resolve_claims_prefers_first_valid_source() {
        let codec = TokenCodec::new("secret", 3600);
        let sessions = SessionCookies::new(codec.clone(), "auth-token", false);
        let claim = SessionClaim {
            user_id: "u9".into(),
            email: "b@c.de".into(),
            name: "Bo".into(),
            role: Role::User,
        };
        let token = codec.sign(&claim).unwrap();

        let req = TestRequest::default()
            .cookie(Cookie::new("auth-token", "garbage"))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(resolve_claims(&sessions, &req).unwrap().sub, "u9");

        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            resolve_claims(&sessions, &req),
            Err(AuthError::MissingCredential)
        ));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(resolve_claims(&sessions, &req).is_err());
    }
}
