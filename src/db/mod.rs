//! Account persistence for the auth endpoints.
//!
//! Only what login and registration need lives here; movie, comment and
//! theater storage belongs to the CRUD handlers.

pub mod models;
pub mod repository;

pub use models::User;
pub use repository::{PgUserRepository, UserRepository};
