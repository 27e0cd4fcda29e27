//! Repository layer over the PostgreSQL pool.

pub mod session;
pub mod user;

pub use session::{SessionLiveness, SessionRepository, SessionRepositoryError};
pub use user::{UserRepository, UserRepositoryError};
