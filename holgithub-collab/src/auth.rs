use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use holgithub_core::random_string;
use log::{info, warn};
use thiserror::Error;
use tokio::task::spawn_blocking;

use crate::{
    Config, DatabaseError, NewSession, NewUser, PrimaryKey, SessionData, SharedDatabase, UserData,
};

pub struct Auth {
    db: SharedDatabase,
    argon: Argon2<'static>,
    /// Verified against when a user doesn't exist, so a missing user costs as much as a wrong password
    dummy_hash: String,
    session_duration: Duration,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User {0} already exists")]
    DuplicateUser(String),
    #[error("Could not generate a unique session token")]
    SessionTokenExhausted,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    const SESSION_TOKEN_LENGTH: usize = 32;
    const SESSION_TOKEN_ATTEMPTS: usize = 5;

    pub fn new(db: &SharedDatabase, config: &Config) -> Result<Self, AuthError> {
        let argon = Argon2::default();
        let dummy_hash = hash(&argon, "")?;

        Ok(Self {
            db: db.clone(),
            argon,
            dummy_hash,
            session_duration: Duration::days(config.session_duration_in_days),
        })
    }

    /// Creates a new user
    pub async fn sign_up(&self, credentials: Credentials) -> Result<UserData, AuthError> {
        let Credentials { username, password } = credentials;

        let argon = self.argon.clone();
        let hashed_password = spawn_blocking(move || hash(&argon, &password))
            .await
            .map_err(|e| AuthError::HashError(e.to_string()))??;

        let user = self
            .db
            .create_user(NewUser {
                username,
                password: hashed_password,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { value, .. } => AuthError::DuplicateUser(value),
                e => AuthError::Db(e),
            })?;

        info!("User {} signed up", user.username);
        Ok(user)
    }

    /// Checks a username and password pair.
    /// An unknown user and a wrong password fail the same way, after the same amount of work.
    pub async fn verify(&self, credentials: &Credentials) -> Result<UserData, AuthError> {
        let user = match self.db.user_by_username(&credentials.username).await {
            Ok(user) => Some(user),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(AuthError::Db(e)),
        };

        let stored_hash = user
            .as_ref()
            .map(|u| u.password.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());

        let argon = self.argon.clone();
        let password = credentials.password.clone();

        let is_valid = spawn_blocking(move || {
            PasswordHash::new(&stored_hash)
                .map(|parsed| argon.verify_password(password.as_bytes(), &parsed).is_ok())
                .unwrap_or_default()
        })
        .await
        .map_err(|e| AuthError::HashError(e.to_string()))?;

        match user {
            Some(user) if is_valid => Ok(user),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Logs in a user, returning a new session
    pub async fn sign_in(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.db
            .clear_expired_sessions()
            .await
            .map_err(AuthError::Db)?;

        let user = self.verify(&credentials).await?;
        let session = self.create_session(&user).await?;

        info!("User {} signed in", user.username);
        Ok(session)
    }

    /// Deletes the associated session. Deleting a session that doesn't exist is not an error.
    pub async fn sign_out(&self, token: &str) -> Result<(), DatabaseError> {
        match self.db.delete_session_by_token(token).await {
            Err(e) if e.is_not_found() => Ok(()),
            result => result,
        }
    }

    /// Returns the session for a token, if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<Option<SessionData>, DatabaseError> {
        match self.db.session_by_token(token).await {
            Ok(session) if session.is_expired() => Ok(None),
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deletes a user completely
    pub async fn delete_user(&self, user_id: PrimaryKey) -> Result<(), DatabaseError> {
        self.db.delete_user(user_id).await
    }

    async fn create_session(&self, user: &UserData) -> Result<SessionData, AuthError> {
        for _ in 0..Self::SESSION_TOKEN_ATTEMPTS {
            let new_session = NewSession {
                token: random_string(Self::SESSION_TOKEN_LENGTH),
                user_id: user.id,
                expires_at: Utc::now() + self.session_duration,
            };

            match self.db.create_session(new_session).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_conflict() => warn!("Session token collided, generating another"),
                Err(e) => return Err(AuthError::Db(e)),
            }
        }

        Err(AuthError::SessionTokenExhausted)
    }
}

fn hash(argon: &Argon2, password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    argon
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::HashError(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}
