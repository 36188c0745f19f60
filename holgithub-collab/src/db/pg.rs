use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool};

use crate::{
    Database, DatabaseError, DatabaseResult, GameData, IntoDatabaseError, NewGame, NewRepo,
    NewSession, NewUser, PrimaryKey, RepoData, Result, ScoreSummary, SessionData, UserData,
};

/// A postgres database implementation for holgithub
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: i32,
    username: String,
    password: String,
}

#[derive(FromRow)]
struct SessionRow {
    id: i32,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: i32,
    username: String,
    password: String,
}

#[derive(FromRow)]
struct RepoRow {
    id: i32,
    name: String,
    description: Option<String>,
    star_amount: i32,
    image: Vec<u8>,
    image_type: String,
}

#[derive(FromRow)]
struct GameRow {
    id: i32,
    user_id: i32,
    score: i32,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Brings the schema up to date
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        info!("Database schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        query_as::<_, UserRow>(
            "INSERT INTO users (username, password) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new_user.username)
        .bind(&new_user.password)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.conflict_or("user", "username", &new_user.username))
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        for statement in [
            "DELETE FROM games WHERE user_id = $1",
            "DELETE FROM sessions WHERE user_id = $1",
            "DELETE FROM users WHERE id = $1",
        ] {
            query(statement)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        query_as::<_, SessionRow>(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.password
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "token"))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.conflict_or("session", "token", &new_session.token))?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let result = query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE now() > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn repo_by_id(&self, repo_id: PrimaryKey) -> Result<RepoData> {
        query_as::<_, RepoRow>("SELECT * FROM repos WHERE id = $1")
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("repo", "id"))
    }

    async fn list_repo_ids(&self) -> Result<Vec<PrimaryKey>> {
        query_as::<_, (i32,)>("SELECT id FROM repos")
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().map(|(id,)| id).collect())
            .map_err(|e| e.any())
    }

    async fn replace_repos(&self, new_repos: Vec<NewRepo>) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query("DELETE FROM repos")
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        let count = new_repos.len();

        for repo in new_repos {
            query(
                "INSERT INTO repos (name, description, star_amount, image, image_type)
                VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(repo.name)
            .bind(repo.description)
            .bind(i32::try_from(repo.star_amount).unwrap_or(i32::MAX))
            .bind(repo.image.to_vec())
            .bind(repo.image_type)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;

        Ok(count)
    }

    async fn create_game(&self, new_game: NewGame) -> Result<GameData> {
        query_as::<_, GameRow>("INSERT INTO games (user_id, score) VALUES ($1, $2) RETURNING *")
            .bind(new_game.user_id)
            .bind(i32::try_from(new_game.score).unwrap_or(i32::MAX))
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.any())
    }

    async fn score_summary(&self, user_id: PrimaryKey) -> Result<ScoreSummary> {
        let (best, played) = query_as::<_, (i32, i64)>(
            "SELECT COALESCE(MAX(score), 0), COUNT(*) FROM games WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(ScoreSummary {
            best: best.max(0) as u32,
            played: played.max(0) as u32,
        })
    }
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password: row.password,
        }
    }
}

impl From<SessionRow> for SessionData {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                password: row.password,
            },
        }
    }
}

impl From<RepoRow> for RepoData {
    fn from(row: RepoRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            star_amount: row.star_amount.max(0) as u32,
            image: row.image.into(),
            image_type: row.image_type,
        }
    }
}

impl From<GameRow> for GameData {
    fn from(row: GameRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            score: row.score.max(0) as u32,
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or(self, resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
        let is_unique_violation = self
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or_default();

        if is_unique_violation {
            DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }
        } else {
            self.any()
        }
    }
}
