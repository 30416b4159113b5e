use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use tracing::debug;

use crate::auth::claims::{Claims, SessionClaim};
use crate::auth::token::TokenCodec;
use crate::config::Settings;
use crate::error::AppError;

/// Sole owner of the session cookie. Everything that reads or writes it goes
/// through here, so there is exactly one cookie name and one codec.
#[derive(Clone)]
pub struct SessionCookies {
    codec: TokenCodec,
    name: String,
    secure: bool,
}

impl SessionCookies {
    pub fn new(codec: TokenCodec, name: impl Into<String>, secure: bool) -> Self {
        Self {
            codec,
            name: name.into(),
            secure,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            TokenCodec::from_config(&settings.auth),
            settings.auth.cookie_name.clone(),
            settings.is_production(),
        )
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mints a token for `claim` and wraps it in the session cookie.
    pub fn set_session_cookie(&self, claim: &SessionClaim) -> Result<Cookie<'static>, AppError> {
        let token = self.codec.sign(claim)?;
        Ok(Cookie::build(self.name.clone(), token)
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(CookieDuration::seconds(self.codec.ttl_seconds()))
            .finish())
    }

    /// A cookie that tells the browser to drop the session.
    pub fn clear_session_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(self.name.clone(), "")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .finish();
        cookie.make_removal();
        cookie
    }

    pub fn session_token(&self, req: &HttpRequest) -> Option<String> {
        req.cookie(&self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Decoded claim from the session cookie; `None` when absent or invalid.
    pub fn read_session_claim(&self, req: &HttpRequest) -> Option<Claims> {
        let token = self.session_token(req)?;
        match self.codec.verify(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(reason = %e, "session cookie rejected");
                None
            }
        }
    }
}
