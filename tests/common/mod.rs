#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use async_trait::async_trait;
use mflix_gate::auth::{Role, SessionClaim};
use mflix_gate::error::{DatabaseError, StoreError};
use mflix_gate::store::{CounterSnapshot, CounterStore, MemoryCounterStore};
use mflix_gate::{AppError, AppState, Settings, User, UserRepository};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Accounts kept in a map, keyed by email.
#[derive(Default)]
pub struct InMemoryUsers {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(DatabaseError::Duplicate.into());
        }
        users.insert(user.email.clone(), user.clone());
        Ok(user.clone())
    }

    async fn record_login(&self, id: Uuid) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.values_mut().find(|u| u.id == id) {
            user.last_login = Some(chrono::Utc::now());
        }
        Ok(())
    }
}

/// A counter store whose backend is always down.
pub struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn increment(&self, _key: &str, _window_seconds: u64) -> Result<CounterSnapshot, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

pub fn state_with_store(store: Arc<dyn CounterStore>) -> AppState {
    let settings = Settings::new_for_test().expect("Failed to load test config");
    AppState::from_parts(settings, Arc::new(InMemoryUsers::default()), store)
}

pub fn state_from_settings(settings: Settings) -> AppState {
    AppState::from_parts(
        settings,
        Arc::new(InMemoryUsers::default()),
        Arc::new(MemoryCounterStore::new()),
    )
}

pub fn test_state() -> AppState {
    state_with_store(Arc::new(MemoryCounterStore::new()))
}

pub fn claim(role: Role) -> SessionClaim {
    SessionClaim {
        user_id: Uuid::new_v4().to_string(),
        email: "viewer@example.com".to_string(),
        name: "Viewer".to_string(),
        role,
    }
}

pub fn session_cookie(state: &AppState, role: Role) -> Cookie<'static> {
    state
        .sessions
        .set_session_cookie(&claim(role))
        .expect("Failed to mint session cookie")
}

pub fn response_cookie<B>(res: &ServiceResponse<B>, name: &str) -> Option<Cookie<'static>> {
    res.response()
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.into_owned())
}
