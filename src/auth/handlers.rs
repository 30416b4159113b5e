use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::csrf::check_origin;
use crate::auth::extract::get_current_claim;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::validation::{parse_body, LoginRequest, RegisterRequest};
use crate::db::User;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::AppState;

pub async fn login(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    check_origin(&req, &state.config.security.allowed_origins)?;
    let rate = state
        .rate_limiter
        .enforce(&state.rate_limiter.client_key(&req), &state.rate_limiter.config().login)
        .await?;

    let input: LoginRequest = parse_body(&body)?;
    info!("Received login request for email: {}", input.email);

    let user = match state.users.find_by_email(&input.email).await? {
        Some(user) => user,
        None => {
            warn!("Login failed for email: {}: unknown account", input.email);
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    if !verify_password(input.password, user.password_hash.clone()).await? {
        warn!("Login failed for email: {}: wrong password", input.email);
        return Err(AuthError::InvalidCredentials.into());
    }

    if let Err(e) = state.users.record_login(user.id).await {
        warn!("Could not record login time for {}: {}", user.id, e);
    }

    let cookie = state.sessions.set_session_cookie(&user.session_claim())?;
    info!("Login successful for email: {}", user.email);

    let mut res = HttpResponse::Ok();
    res.cookie(cookie);
    rate.apply_headers(&mut res);
    Ok(res.json(json!({
        "message": "Login successful",
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
        }
    })))
}

/// Creates an account and signs it in.
///
/// Answers 201 with the new id on success and 409 when the email is already
/// registered, rather than a generic 200/400.
pub async fn register(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    check_origin(&req, &state.config.security.allowed_origins)?;
    let rate = state
        .rate_limiter
        .enforce(&state.rate_limiter.client_key(&req), &state.rate_limiter.config().register)
        .await?;

    let input: RegisterRequest = parse_body(&body)?;
    info!("Received registration request for email: {}", input.email);

    if state.users.find_by_email(&input.email).await?.is_some() {
        warn!("Registration failed for email: {}: already registered", input.email);
        return Err(DatabaseError::Duplicate.into());
    }

    let password_hash = hash_password(input.password).await?;
    let user = state
        .users
        .create(&User::new(input.name, input.email, password_hash))
        .await?;
    info!("Registration successful for email: {}", user.email);

    let cookie = state.sessions.set_session_cookie(&user.session_claim())?;

    let mut res = HttpResponse::Created();
    res.cookie(cookie);
    rate.apply_headers(&mut res);
    Ok(res.json(json!({
        "message": "Registration successful",
        "userId": user.id,
    })))
}

pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    check_origin(&req, &state.config.security.allowed_origins)?;

    Ok(HttpResponse::Ok()
        .cookie(state.sessions.clear_session_cookie())
        .json(json!({
            "message": "Successfully logged out"
        })))
}

pub async fn verify(req: HttpRequest) -> HttpResponse {
    match get_current_claim(&req) {
        Some(claims) => HttpResponse::Ok().json(json!({
            "status": 200,
            "message": "Authentication valid",
            "authenticated": true,
            "user": {
                "userId": claims.sub,
                "email": claims.email,
                "name": claims.name,
                "role": claims.role,
            }
        })),
        None => HttpResponse::Unauthorized().json(json!({
            "status": 401,
            "message": "Unauthorized",
            "authenticated": false,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::MockUserRepository;
    use crate::store::MemoryCounterStore;
    use crate::Settings;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn state(users: MockUserRepository) -> AppState {
        let config = Settings::new_for_test().unwrap();
        AppState::from_parts(config, Arc::new(users), Arc::new(MemoryCounterStore::new()))
    }

    #[actix_web::test]
    async fn test_login_survives_failed_last_login_update() {
        let hash = bcrypt::hash("Str0ng!Passw", 4).unwrap();
        let user = User::new("Ada".into(), "ada@example.com".into(), hash);

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_email()
            .times(1)
            .returning(move |_| Ok(Some(user.clone())));
        users
            .expect_record_login()
            .times(1)
            .returning(|_| Err(DatabaseError::ConnectionError("pool closed".into()).into()));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(users)))
                .route("/api/auth/login", web::post().to(login)),
        )
        .await;

        let res = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "ada@example.com", "password": "Str0ng!Passw" }))
            .send_request(&app)
            .await;

        assert_eq!(res.status(), 200);
    }

    #[actix_web::test]
    async fn test_register_reports_conflict_from_insert() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| Ok(None));
        users
            .expect_create()
            .times(1)
            .returning(|_| Err(DatabaseError::Duplicate.into()));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(users)))
                .route("/api/auth/register", web::post().to(register)),
        )
        .await;

        let res = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "name": "Ada",
                "email": "ada@example.com",
                "password": "Str0ng!Passw"
            }))
            .send_request(&app)
            .await;

        assert_eq!(res.status(), 409);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "Conflict");
    }

    #[actix_web::test]
    async fn test_malformed_body_is_rejected_before_lookup() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().never();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(users)))
                .route("/api/auth/login", web::post().to(login)),
        )
        .await;

        let res = test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .send_request(&app)
            .await;

        assert_eq!(res.status(), 400);
    }
}
