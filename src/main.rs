use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer};
use tracing::{error, info, warn};

use inkpost::core::auth::{
    AppState, AuthService, Authenticator, HttpKeySetFetcher, RemoteKeySet, TokenCodec, router,
};
use inkpost::core::config::{AuthMode, Config};
use inkpost::core::db::pool::{DbConfig, create_pool_with_migrations};
use inkpost::core::db::repositories::session::SessionRepository;
use inkpost::core::db::repositories::user::UserRepository;
use inkpost::core::sweeper::spawn_sweeper;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let db_config = DbConfig::new(&config.database_url);
    let pool = match create_pool_with_migrations(&db_config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "database initialization failed");
            std::process::exit(1);
        }
    };

    let sessions = SessionRepository::new(pool.clone());

    // Clear leftovers from previous runs before the periodic sweep takes over
    match sessions.sweep_expired().await {
        Ok(removed) if removed > 0 => info!(removed, "swept expired sessions at startup"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "startup session sweep failed"),
    }
    spawn_sweeper(sessions.clone(), config.sweep_interval);

    let (authenticator, service) = match &config.auth {
        AuthMode::Local {
            secret,
            issuer,
            token_ttl_hours,
        } => {
            let codec = TokenCodec::new(secret, issuer.clone(), *token_ttl_hours);
            let service = AuthService::new(
                UserRepository::new(pool.clone()),
                sessions.clone(),
                codec.clone(),
            );
            (
                Authenticator::Local {
                    codec,
                    sessions: sessions.clone(),
                },
                Some(service),
            )
        }
        AuthMode::Federated {
            keyset_url,
            keyset_ttl,
            keyset_stale_budget,
            fetch_timeout,
            issuer,
        } => {
            let fetcher = match HttpKeySetFetcher::new(keyset_url.clone(), *fetch_timeout) {
                Ok(fetcher) => fetcher,
                Err(e) => {
                    error!(error = %e, "key set fetcher initialization failed");
                    std::process::exit(1);
                }
            };
            (
                Authenticator::Federated {
                    keys: RemoteKeySet::new(Arc::new(fetcher), *keyset_ttl, *keyset_stale_budget),
                    issuer: issuer.clone(),
                },
                None,
            )
        }
    };

    let state = AppState {
        pool,
        authenticator: Arc::new(authenticator),
        service,
    };

    let app = router(state)
        .layer(middleware::from_fn(log_request))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr = config.listen_addr();
    info!(mode = config.auth.label(), %addr, "starting server");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}
