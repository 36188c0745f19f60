mod auth;
mod db;
mod game;
mod scraper;

pub use auth::*;
pub use db::*;
pub use game::*;
pub use scraper::*;

/// Settings for the collab system
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a session stays valid after signing in
    pub session_duration_in_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_duration_in_days: 7,
        }
    }
}

/// The holgithub collab system, tying authentication and games to a database.
pub struct Collab {
    pub database: SharedDatabase,

    pub auth: Auth,
    pub games: GameManager,
}

impl Collab {
    pub fn new(database: SharedDatabase, config: &Config) -> std::result::Result<Self, AuthError> {
        let auth = Auth::new(&database, config)?;
        let games = GameManager::new(&database);

        Ok(Self {
            database,
            auth,
            games,
        })
    }

    /// Deletes a user along with their sessions, recorded games and any round in progress
    pub async fn delete_user(&self, user_id: PrimaryKey) -> std::result::Result<(), DatabaseError> {
        self.auth.delete_user(user_id).await?;
        self.games.forget(user_id);

        Ok(())
    }
}
