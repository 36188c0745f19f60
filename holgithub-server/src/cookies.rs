use axum::http::{header, HeaderMap};
use cookie::Cookie;

/// The name of the cookie carrying the session token
pub const SESSION_COOKIE_NAME: &str = "HOLGITHUB_SESSION";

/// Encodes and decodes the session cookie
#[derive(Debug, Clone, Copy)]
pub struct SessionCookie {
    secure: bool,
}

impl SessionCookie {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// A session cookie for the given token. It has no expiry, so it lives as long as the browser session.
    pub fn encode(&self, token: &str) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, token.to_string()))
            .path("/")
            .secure(self.secure)
            .http_only(true)
            .build()
    }

    /// A cookie that makes the client forget the session
    pub fn encode_deletion(&self) -> Cookie<'static> {
        let mut cookie = self.encode("");
        cookie.make_removal();

        cookie
    }

    /// Finds the session token in the request headers, if any
    pub fn decode(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == SESSION_COOKIE_NAME && !cookie.value().is_empty())
            .map(|cookie| cookie.value().to_string())
    }
}
