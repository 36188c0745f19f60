use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use holgithub_collab::{PrimaryKey, SessionData};
use log::debug;

use crate::{context::ServerContext, errors::ServerError};

/// Routes that can be reached without signing in
pub const PUBLIC_PATHS: &[&str] = &["/user/signup", "/user/signin", "/error", "/api.json"];

/// The signed in user making the request
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: PrimaryKey,
    pub username: String,
    /// The session token the request was authenticated with
    pub token: String,
}

impl From<SessionData> for Identity {
    fn from(session: SessionData) -> Self {
        Self {
            user_id: session.user.id,
            username: session.user.username,
            token: session.token,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(ServerError::AuthenticationRequired)
    }
}

/// Resolves the session cookie into an [Identity] and refuses anonymous requests to non-public routes.
/// Unknown, forged or expired sessions are treated as anonymous.
pub async fn authenticate(
    State(context): State<ServerContext>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let identity = match context.cookie.decode(request.headers()) {
        Some(token) => context.collab.auth.session(&token).await?.map(Identity::from),
        None => None,
    };

    let path = request.uri().path().to_string();

    match identity {
        Some(identity) => {
            request.extensions_mut().insert(identity);
        }
        None if PUBLIC_PATHS.contains(&path.as_str()) => {}
        None => {
            debug!("Refused anonymous request to {}", path);
            return Err(ServerError::AuthenticationRequired);
        }
    }

    Ok(next.run(request).await)
}
