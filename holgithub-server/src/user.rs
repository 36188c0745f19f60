use axum::{
    extract::State,
    http::header,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json,
};
use log::info;

use crate::{
    auth::Identity,
    context::ServerContext,
    errors::ServerResult,
    schemas::{SignInSchema, SignUpSchema, ValidatedJson},
    serialized::{ToSerialized, User},
    Router,
};

#[utoipa::path(
    post,
    path = "/user/signup",
    tag = "user",
    request_body = SignUpSchema,
    responses(
        (status = 200, body = User),
        (status = 409, description = "Username is taken")
    )
)]
async fn sign_up(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SignUpSchema>,
) -> ServerResult<Json<User>> {
    let user = context.collab.auth.sign_up(body.into()).await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/user/signin",
    tag = "user",
    request_body = SignInSchema,
    responses(
        (status = 200, body = User, description = "Signed in, the session cookie is set"),
        (status = 401, description = "Username or password is incorrect")
    )
)]
async fn sign_in(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SignInSchema>,
) -> ServerResult<impl IntoResponse> {
    let session = context.collab.auth.sign_in(body.into()).await?;
    let cookie = context.cookie.encode(&session.token);

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie.to_string())]),
        Json(session.user.to_serialized()),
    ))
}

#[utoipa::path(
    post,
    path = "/user/signout",
    tag = "user",
    security(("SessionCookie" = [])),
    responses(
        (status = 200, description = "Signed out, the session cookie is cleared"),
        (status = 401, description = "Not signed in")
    )
)]
async fn sign_out(
    identity: Identity,
    State(context): State<ServerContext>,
) -> ServerResult<impl IntoResponse> {
    context.collab.auth.sign_out(&identity.token).await?;
    info!("User {} signed out", identity.username);

    let cookie = context.cookie.encode_deletion();

    Ok(AppendHeaders([(header::SET_COOKIE, cookie.to_string())]))
}

#[utoipa::path(
    get,
    path = "/user/me",
    tag = "user",
    security(("SessionCookie" = [])),
    responses(
        (status = 200, body = User),
        (status = 401, description = "Not signed in")
    )
)]
async fn me(identity: Identity) -> Json<User> {
    Json(identity.to_serialized())
}

pub fn router() -> Router {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route("/signout", post(sign_out))
        .route("/me", get(me))
}
