use cookie::Cookie;
use holgithub_core::{
    Choice, ChooseMessage, ChooseRequest, DecodeError, NewGameMessage, PartReader,
    DEFAULT_READ_TIMEOUT,
};
use log::debug;
use parking_lot::Mutex;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The name of the cookie carrying the session token
pub const SESSION_COOKIE_NAME: &str = "HOLGITHUB_SESSION";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The request needs a session, and there is none or it is no longer valid
    #[error("Not signed in")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User {0} already exists")]
    DuplicateUser(String),
    #[error("No game is in progress")]
    InvalidGameState,
    #[error("Server did not issue a session")]
    MissingSession,
    #[error("Server responded with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] DecodeError),
}

#[derive(Debug, Clone, Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Scores {
    pub best: u32,
    pub played: u32,
}

/// Talks to a holgithub server, keeping track of the session cookie
pub struct HolClient {
    http: Client,
    base_url: String,
    read_timeout: Duration,
    session: Mutex<Option<String>>,
}

impl HolClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            session: Default::default(),
        }
    }

    /// Sets how long to wait for each part of a multipart response
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.lock().is_some()
    }

    pub async fn sign_up(&self, username: &str, password: &str) -> Result<User, ClientError> {
        let response = self
            .post("/user/signup")
            .json(&CredentialsBody { username, password })
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(ClientError::DuplicateUser(username.to_string()));
        }

        Ok(check(response).await?.json().await?)
    }

    /// Signs in and remembers the session for subsequent requests
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<User, ClientError> {
        let response = self
            .post("/user/signin")
            .json(&CredentialsBody { username, password })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::InvalidCredentials);
        }

        let response = check(response).await?;
        let token = session_from_headers(response.headers()).ok_or(ClientError::MissingSession)?;

        *self.session.lock() = Some(token);
        debug!("Signed in as {}", username);

        Ok(response.json().await?)
    }

    /// Ends the session. The local session is forgotten even if the server refuses.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let response = self.post("/user/signout").send().await;
        self.session.lock().take();

        check_authorized(response?).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<User, ClientError> {
        let response = self.get("/user/me").send().await?;

        Ok(check_authorized(response).await?.json().await?)
    }

    pub async fn scores(&self) -> Result<Scores, ClientError> {
        let response = self.get("/game/scores").send().await?;

        Ok(check_authorized(response).await?.json().await?)
    }

    /// Starts a new round
    pub async fn new_game(&self) -> Result<NewGameMessage, ClientError> {
        let response = self.post("/game/new").send().await?;
        let reader = self.reader(check_authorized(response).await?)?;

        Ok(NewGameMessage::decode(reader).await?)
    }

    /// Guesses which repository has more stars
    pub async fn choose(&self, choice: Choice) -> Result<ChooseMessage, ClientError> {
        let response = self
            .post("/game/choose")
            .json(&ChooseRequest { choice })
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(ClientError::InvalidGameState);
        }

        let reader = self.reader(check_authorized(response).await?)?;

        Ok(ChooseMessage::decode(reader).await?)
    }

    fn reader(&self, response: Response) -> Result<PartReader<'static>, DecodeError> {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        PartReader::from_content_type(response.bytes_stream(), &content_type, self.read_timeout)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.with_session(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.with_session(self.http.post(self.url(path)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_session(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.lock().as_deref() {
            Some(token) => request.header(
                header::COOKIE,
                Cookie::new(SESSION_COOKIE_NAME, token).to_string(),
            ),
            None => request,
        }
    }
}

async fn check_authorized(response: Response) -> Result<Response, ClientError> {
    if response.status() == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    check(response).await
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Status { status, message })
}

/// Finds a non-empty session token among the Set-Cookie headers
fn session_from_headers(headers: &header::HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v).ok())
        .find(|c| c.name() == SESSION_COOKIE_NAME && !c.value().is_empty())
        .map(|c| c.value().to_string())
}
