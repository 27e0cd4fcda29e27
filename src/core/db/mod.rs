//! Database module for the Inkpost backend.
//!
//! Connectivity, models, and repositories for persistent storage using
//! PostgreSQL and SQLx.

pub mod models;
pub mod pool;
pub mod repositories;

pub use models::{PublicUser, Role, Session, User};
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations};
pub use repositories::{
    SessionLiveness, SessionRepository, SessionRepositoryError, UserRepository,
    UserRepositoryError,
};

pub use sqlx::PgPool;
