use axum::{
    extract::State,
    routing::{get, post},
    Json,
};
use holgithub_collab::GuessOutcome;
use holgithub_core::{ChooseMessage, NewGameMessage, ReposDto};

use crate::{
    auth::Identity,
    context::ServerContext,
    errors::ServerResult,
    schemas::{ChooseSchema, ValidatedJson},
    serialized::{Scores, ToSerialized},
    streaming::Multipart,
    Router,
};

#[utoipa::path(
    post,
    path = "/game/new",
    tag = "game",
    security(("SessionCookie" = [])),
    responses(
        (
            status = 200,
            content_type = "multipart/mixed",
            description = "The first image, the second image and both repositories as JSON, with star counts withheld"
        ),
        (status = 503, description = "The repository pool is too small")
    )
)]
async fn new_game(
    identity: Identity,
    State(context): State<ServerContext>,
) -> ServerResult<Multipart> {
    let round = context.collab.games.new_game(identity.user_id).await?;

    let message = NewGameMessage {
        first_image: round.first.to_image(),
        second_image: round.second.to_image(),
        repos: ReposDto {
            first: round.first.to_hidden_dto(),
            second: round.second.to_hidden_dto(),
        },
    };

    Ok(Multipart(message.into_multipart()?))
}

#[utoipa::path(
    post,
    path = "/game/choose",
    tag = "game",
    request_body = ChooseSchema,
    security(("SessionCookie" = [])),
    responses(
        (
            status = 200,
            content_type = "multipart/mixed",
            description = "CORRECT or WRONG and the stars of the second repository. A correct guess is followed by the image and JSON of the next repository."
        ),
        (status = 409, description = "No game is in progress")
    )
)]
async fn choose(
    identity: Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<ChooseSchema>,
) -> ServerResult<Multipart> {
    let outcome = context
        .collab
        .games
        .choose(identity.user_id, body.choice.into())
        .await?;

    let message = match outcome {
        GuessOutcome::Correct {
            revealed_stars,
            next,
            ..
        } => ChooseMessage::Correct {
            second_repo_stars: revealed_stars,
            next_image: next.to_image(),
            next_repo: next.to_hidden_dto(),
        },
        GuessOutcome::Wrong { revealed_stars, .. } => ChooseMessage::Wrong {
            second_repo_stars: revealed_stars,
        },
    };

    Ok(Multipart(message.into_multipart()?))
}

#[utoipa::path(
    get,
    path = "/game/scores",
    tag = "game",
    security(("SessionCookie" = [])),
    responses(
        (status = 200, body = Scores)
    )
)]
async fn scores(
    identity: Identity,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Scores>> {
    let summary = context.collab.database.score_summary(identity.user_id).await?;

    Ok(Json(summary.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/new", post(new_game))
        .route("/choose", post(choose))
        .route("/scores", get(scores))
}
