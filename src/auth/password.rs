use actix_web::web;

use crate::error::AppError;

pub const HASH_COST: u32 = 10;

/// bcrypt is deliberately slow, so both helpers run on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    Ok(web::block(move || bcrypt::hash(password, HASH_COST)).await??)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    Ok(web::block(move || bcrypt::verify(password, &hash)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_hash_then_verify() {
        let hash = hash_password("Str0ng!Passw".to_string()).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("Str0ng!Passw".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_string(), hash).await.unwrap());
    }
}
