use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use profiled_auth::{Argon2Verifier, TokenAuthenticator, token_auth_middleware};

use crate::cache::{CacheBackend, ProfileCache};
use crate::config::AppConfig;
use crate::repository::UserRepository;
use crate::service::UserService;
use crate::storage::{DynUserStorage, create_user_storage};
use crate::{create_cache_backend, handlers, middleware as app_middleware};

const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: UserService,
    pub auth: TokenAuthenticator,
    pub cache: CacheBackend,
}

impl AppState {
    /// Wires repository, service and authenticator from config.
    pub fn new(
        cfg: &AppConfig,
        store: DynUserStorage,
        cache: CacheBackend,
    ) -> anyhow::Result<Self> {
        let auth = TokenAuthenticator::from_config(&cfg.auth).context("auth setup failed")?;
        let profile_cache = ProfileCache::new(cache.clone(), cfg.cache.profile_ttl)
            .with_password_hash(cfg.cache.include_password_hash);
        let repo = UserRepository::new(
            store,
            profile_cache,
            cfg.cache.operation_timeout,
            cfg.storage.operation_timeout,
        );
        let service = UserService::new(Arc::new(repo), Arc::new(Argon2Verifier::new()));
        Ok(Self {
            service,
            auth,
            cache,
        })
    }
}

pub struct ProfiledServer {
    addr: SocketAddr,
    app: Router,
}

fn cors_layer(origins: &[String], refresh_header: &HeaderName) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin '{o}'")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([refresh_header.clone()])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE))
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&cfg.server.cors_origins, state.auth.refresh_header())?;
    let body_limit = cfg.server.body_limit_bytes;

    let app = Router::new()
        // Health and info endpoints
        .route("/hello", get(handlers::hello))
        .route("/healthz", get(handlers::healthz))
        // User endpoints
        .route("/users/signup", post(handlers::sign_up))
        .route("/users/login", post(handlers::login))
        .route("/users/edit", post(handlers::edit))
        .route(
            "/users/profile",
            get(handlers::profile).post(handlers::profile),
        )
        // Middleware stack (outermost last: request id -> trace -> cors -> auth)
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            token_auth_middleware,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state);

    Ok(app)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynUserStorage>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use this store instead of the one named in the config.
    pub fn with_store(mut self, store: DynUserStorage) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> anyhow::Result<ProfiledServer> {
        let store = match self.store {
            Some(store) => store,
            None => create_user_storage(&self.config.storage)
                .await
                .context("user store initialization failed")?,
        };
        let cache = create_cache_backend(&self.config.redis, &self.config.cache).await;
        let state = AppState::new(&self.config, store, cache)?;
        let app = build_app(&self.config, state)?;

        Ok(ProfiledServer {
            addr: self.addr,
            app,
        })
    }
}

impl ProfiledServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_rejects_invalid_origin() {
        let header = HeaderName::from_static("x-jwt-token");
        assert!(cors_layer(&["bad\norigin".to_string()], &header).is_err());
        assert!(cors_layer(&["http://localhost:3000".to_string()], &header).is_ok());
        assert!(cors_layer(&[], &header).is_ok());
    }
}
