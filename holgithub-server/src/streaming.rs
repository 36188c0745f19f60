use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use holgithub_core::MultipartMessage;

/// Streams a [MultipartMessage] as the response body
pub struct Multipart(pub MultipartMessage);

impl IntoResponse for Multipart {
    fn into_response(self) -> Response {
        let content_type = self.0.content_type();
        let body = Body::from_stream(self.0.into_stream());

        (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
            body,
        )
            .into_response()
    }
}
