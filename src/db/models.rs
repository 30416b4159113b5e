use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::{Role, SessionClaim};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            role: Role::User,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    pub fn session_claim(&self) -> SessionClaim {
        SessionClaim {
            user_id: self.id.to_string(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("Ada".into(), "ada@example.com".into(), "$2b$10$hash".into());
        assert_eq!(user.role, Role::User);
        assert!(user.last_login.is_none());

        let claim = user.session_claim();
        assert_eq!(claim.user_id, user.id.to_string());
        assert_eq!(claim.role, Role::User);

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
