mod auth;
mod context;
mod cookies;
mod docs;
mod errors;
mod game;
mod schemas;
mod serialized;
mod streaming;
mod user;

use axum::{middleware, routing::get};
use holgithub_collab::Collab;
use log::info;
use std::{
    io,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use auth::{Identity, PUBLIC_PATHS};
pub use context::ServerContext;
pub use cookies::{SessionCookie, SESSION_COOKIE_NAME};
pub use errors::{ServerError, ServerResult};
pub use streaming::Multipart;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Only send the session cookie over https
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            secure_cookies: true,
        }
    }
}

/// Starts the holgithub server
pub async fn run_server(config: ServerConfig, collab: Collab) -> io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, config.port).into();
    let listener = TcpListener::bind(&addr).await?;

    let context = ServerContext {
        collab: Arc::new(collab),
        cookie: SessionCookie::new(config.secure_cookies),
    };

    info!("Listening on {}", addr);
    serve(listener, context).await
}

/// Serves the app on an already bound listener
pub async fn serve(listener: TcpListener, context: ServerContext) -> io::Result<()> {
    axum::serve(listener, router(context).into_make_service()).await
}

/// Builds the full app, with every route behind the session filter
pub fn router(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/user", user::router())
        .nest("/game", game::router())
        .route("/error", get(error_page))
        .route("/api.json", get(docs::docs))
        .layer(middleware::from_fn_with_state(
            context.clone(),
            auth::authenticate,
        ))
        .layer(cors)
        .with_state(context)
}

async fn error_page() -> &'static str {
    "Something went wrong"
}
