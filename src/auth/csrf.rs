use actix_web::http::header;
use actix_web::HttpRequest;
use tracing::warn;
use url::Url;

use crate::error::AuthError;

/// Rejects state-changing requests whose `Origin` or `Referer` points at a
/// site outside `allowed`. Requests carrying neither header pass.
pub fn check_origin(req: &HttpRequest, allowed: &[String]) -> Result<(), AuthError> {
    let is_allowed = |origin: &str| allowed.iter().any(|a| a.trim_end_matches('/') == origin);

    if let Some(origin) = req.headers().get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !is_allowed(origin) {
            warn!(origin, "cross-site request rejected");
            return Err(AuthError::CsrfRejected);
        }
    }

    if let Some(referer) = req.headers().get(header::REFERER) {
        let origin = referer
            .to_str()
            .ok()
            .and_then(|r| Url::parse(r).ok())
            .map(|u| u.origin().ascii_serialization());
        match origin {
            Some(origin) if is_allowed(&origin) => {}
            other => {
                warn!(referer = ?other, "cross-site request rejected");
                return Err(AuthError::CsrfRejected);
            }
        }
    }

    Ok(())
}
