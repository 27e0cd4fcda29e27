pub mod api;
pub mod jwt;
pub mod keys;
pub mod middleware;
pub mod service;

pub use api::{AppState, router};
pub use jwt::{Claims, JwtError, TokenCodec};
pub use keys::{HttpKeySetFetcher, KeySetError, KeySetFetcher, RemoteKeySet};
pub use middleware::{AuthRejection, Authenticator, CurrentUser, Identity, MaybeUser};
pub use service::{AuthError, AuthService, AuthSession};
