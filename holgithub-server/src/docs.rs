use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    cookies::SESSION_COOKIE_NAME,
    schemas::{ChoiceSchema, ChooseSchema, SignInSchema, SignUpSchema},
    serialized::{Scores, User},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::user::sign_up,
        crate::user::sign_in,
        crate::user::sign_out,
        crate::user::me,
        crate::game::new_game,
        crate::game::choose,
        crate::game::scores,
    ),
    components(schemas(User, Scores, SignUpSchema, SignInSchema, ChooseSchema, ChoiceSchema)),
    modifiers(&Security),
    info(
        description = "holgithub-server exposes endpoints to play higher or lower with GitHub stars"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE_NAME));

            components.add_security_scheme("SessionCookie", SecurityScheme::ApiKey(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
