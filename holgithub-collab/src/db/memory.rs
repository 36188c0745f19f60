use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI32, Ordering};

use crate::{
    Database, DatabaseError, GameData, NewGame, NewRepo, NewSession, NewUser, PrimaryKey,
    RepoData, Result, ScoreSummary, SessionData, UserData,
};

/// A database kept entirely in memory. Data is lost when the process exits.
pub struct MemoryDatabase {
    next_id: AtomicI32,
    /// Users by username
    users: DashMap<String, UserData>,
    /// Sessions by token
    sessions: DashMap<String, StoredSession>,
    repos: RwLock<Vec<RepoData>>,
    games: Mutex<Vec<GameData>>,
}

struct StoredSession {
    id: PrimaryKey,
    user_id: PrimaryKey,
    expires_at: chrono::DateTime<Utc>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            users: Default::default(),
            sessions: Default::default(),
            repos: Default::default(),
            games: Default::default(),
        }
    }

    fn next_id(&self) -> PrimaryKey {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
        DatabaseError::NotFound {
            resource,
            identifier,
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.clone())
            .ok_or(Self::not_found("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.users
            .get(username)
            .map(|u| u.clone())
            .ok_or(Self::not_found("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        match self.users.entry(new_user.username.clone()) {
            Entry::Occupied(_) => Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            }),
            Entry::Vacant(entry) => {
                let user = UserData {
                    id: self.next_id(),
                    username: new_user.username,
                    password: new_user.password,
                };

                entry.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        let user = self.user_by_id(user_id).await?;

        self.games.lock().retain(|g| g.user_id != user_id);
        self.sessions.retain(|_, s| s.user_id != user_id);
        self.users.remove(&user.username);

        Ok(())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let (id, user_id, expires_at) = self
            .sessions
            .get(token)
            .map(|s| (s.id, s.user_id, s.expires_at))
            .ok_or(Self::not_found("session", "token"))?;

        let user = self.user_by_id(user_id).await?;

        Ok(SessionData {
            id,
            token: token.to_string(),
            expires_at,
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        // Ensure user exists
        let _ = self.user_by_id(new_session.user_id).await?;

        match self.sessions.entry(new_session.token.clone()) {
            Entry::Occupied(_) => {
                return Err(DatabaseError::Conflict {
                    resource: "session",
                    field: "token",
                    value: new_session.token,
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredSession {
                    id: self.next_id(),
                    user_id: new_session.user_id,
                    expires_at: new_session.expires_at,
                });
            }
        }

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        self.sessions
            .remove(token)
            .map(|_| ())
            .ok_or(Self::not_found("session", "token"))
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.sessions.retain(|_, s| s.expires_at > now);

        Ok(())
    }

    async fn repo_by_id(&self, repo_id: PrimaryKey) -> Result<RepoData> {
        self.repos
            .read()
            .iter()
            .find(|r| r.id == repo_id)
            .cloned()
            .ok_or(Self::not_found("repo", "id"))
    }

    async fn list_repo_ids(&self) -> Result<Vec<PrimaryKey>> {
        Ok(self.repos.read().iter().map(|r| r.id).collect())
    }

    async fn replace_repos(&self, new_repos: Vec<NewRepo>) -> Result<usize> {
        let repos: Vec<_> = new_repos
            .into_iter()
            .map(|r| RepoData {
                id: self.next_id(),
                name: r.name,
                description: r.description,
                star_amount: r.star_amount,
                image: r.image,
                image_type: r.image_type,
            })
            .collect();

        let count = repos.len();
        *self.repos.write() = repos;

        Ok(count)
    }

    async fn create_game(&self, new_game: NewGame) -> Result<GameData> {
        let game = GameData {
            id: self.next_id(),
            user_id: new_game.user_id,
            score: new_game.score,
        };

        self.games.lock().push(game.clone());
        Ok(game)
    }

    async fn score_summary(&self, user_id: PrimaryKey) -> Result<ScoreSummary> {
        let games = self.games.lock();
        let scores = games.iter().filter(|g| g.user_id == user_id);

        Ok(scores.fold(ScoreSummary::default(), |summary, game| ScoreSummary {
            best: summary.best.max(game.score),
            played: summary.played + 1,
        }))
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::MemoryDatabase;
    use crate::{Database, NewGame, NewSession, NewUser};

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let db = MemoryDatabase::new();

        db.create_user(new_user("john")).await.unwrap();
        let error = db.create_user(new_user("john")).await.unwrap_err();

        assert!(error.is_conflict());
    }

    #[tokio::test]
    async fn session_tokens_are_unique() {
        let db = MemoryDatabase::new();
        let user = db.create_user(new_user("john")).await.unwrap();

        let session = || NewSession {
            token: "token".to_string(),
            user_id: user.id,
            expires_at: Utc::now() + Duration::days(1),
        };

        db.create_session(session()).await.unwrap();
        let error = db.create_session(session()).await.unwrap_err();

        assert!(error.is_conflict());
    }

    #[tokio::test]
    async fn deleting_a_user_removes_what_it_owns() {
        let db = MemoryDatabase::new();
        let john = db.create_user(new_user("john")).await.unwrap();
        let mary = db.create_user(new_user("mary")).await.unwrap();

        for (user_id, token) in [(john.id, "john-token"), (mary.id, "mary-token")] {
            db.create_session(NewSession {
                token: token.to_string(),
                user_id,
                expires_at: Utc::now() + Duration::days(1),
            })
            .await
            .unwrap();

            db.create_game(NewGame { user_id, score: 3 }).await.unwrap();
        }

        db.delete_user(john.id).await.unwrap();

        assert!(db.user_by_username("john").await.unwrap_err().is_not_found());
        assert!(db.session_by_token("john-token").await.is_err());
        assert_eq!(db.score_summary(john.id).await.unwrap().played, 0);

        assert!(db.session_by_token("mary-token").await.is_ok());
        assert_eq!(db.score_summary(mary.id).await.unwrap().played, 1);
    }

    #[tokio::test]
    async fn expired_sessions_are_cleared() {
        let db = MemoryDatabase::new();
        let user = db.create_user(new_user("john")).await.unwrap();

        db.create_session(NewSession {
            token: "old".to_string(),
            user_id: user.id,
            expires_at: Utc::now() - Duration::seconds(1),
        })
        .await
        .unwrap();

        db.clear_expired_sessions().await.unwrap();

        assert!(db.session_by_token("old").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn score_summary_tracks_best_score() {
        let db = MemoryDatabase::new();

        for score in [2, 9, 4] {
            db.create_game(NewGame { user_id: 1, score }).await.unwrap();
        }

        let summary = db.score_summary(1).await.unwrap();

        assert_eq!(summary.best, 9);
        assert_eq!(summary.played, 3);
    }
}
